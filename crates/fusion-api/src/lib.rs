// fusion-api: async client for the FusionSolar portal's internal JSON endpoints

pub mod auth;
pub mod batch;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod session;
pub mod transport;
pub mod types;

pub use auth::{Authenticator, FormLogin};
pub use batch::{BatchFetcher, BatchOptions, BatchReport, ChunkFailure, DeviceOutcome, FetchMode};
pub use client::{LocateTreeSettings, PortalClient, PortalSettings};
pub use error::Error;
pub use session::{ProbeVerdict, SessionManager, SessionProbe};
pub use transport::{TlsMode, TransportConfig};
pub use types::{ChildDevice, SocialContribution, StationKpi};
