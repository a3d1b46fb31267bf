// ── Session token ownership ──
//
// The portal authenticates every JSON call with an ephemeral `Roarand`
// header value. `SessionManager` is the single owner of that value: the
// portal client feeds it from observed responses, the harvester probes and
// invalidates it, and every request reads it. All access goes through one
// mutex; the critical sections never span an await point.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::error::Error;

/// Upper bound on retained in-flight hints.
const MAX_HINTS: usize = 16;

/// A response captured from passive observation, kept so that data the
/// portal already served can be recovered when a direct call fails.
#[derive(Debug, Clone)]
pub struct InFlightHint {
    pub url: String,
    pub body: Bytes,
}

/// Status and leading body of a validation probe.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

/// Outcome of interpreting a probe response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Valid,
    EmptyToken,
    Rejected(u16),
    /// HTTP 200 carrying the login page instead of JSON.
    LoginPage,
    UnexpectedBody,
}

/// Issues the lightweight authenticated request used to validate a token.
pub trait SessionProbe {
    fn probe(&self, token: &str) -> impl Future<Output = Result<ProbeResponse, Error>> + Send;
}

#[derive(Debug, Default)]
struct SessionState {
    token: String,
    hints: Vec<InFlightHint>,
}

/// Owner of the portal session token.
#[derive(Debug, Default)]
pub struct SessionManager {
    state: Mutex<SessionState>,
    captured: Notify,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an observed token if none is held yet.
    ///
    /// Returns `true` when the value was accepted. A later capture never
    /// replaces a held token; only [`invalidate`](Self::invalidate) frees
    /// the slot.
    pub fn capture(&self, observed: &str) -> bool {
        let observed = observed.trim();
        if observed.is_empty() {
            return false;
        }

        let accepted = {
            let mut state = self.lock();
            if state.token.is_empty() {
                state.token = observed.to_owned();
                true
            } else {
                false
            }
        };

        if accepted {
            debug!("captured session token");
            self.captured.notify_waiters();
        } else {
            trace!("ignoring token capture, session already held");
        }
        accepted
    }

    /// Current token, or an empty string when no session is held.
    pub fn get(&self) -> String {
        self.lock().token.clone()
    }

    pub fn has_token(&self) -> bool {
        !self.lock().token.is_empty()
    }

    /// Drop the token and every captured hint.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.token.clear();
        state.hints.clear();
        debug!("session invalidated");
    }

    /// Remember a passively observed response body.
    pub fn record_hint(&self, url: impl Into<String>, body: Bytes) {
        let mut state = self.lock();
        if state.hints.len() >= MAX_HINTS {
            state.hints.remove(0);
        }
        state.hints.push(InFlightHint {
            url: url.into(),
            body,
        });
    }

    pub fn hints(&self) -> Vec<InFlightHint> {
        self.lock().hints.clone()
    }

    /// First captured hint whose body looks like a JSON object.
    pub fn recover_json(&self) -> Option<InFlightHint> {
        self.lock()
            .hints
            .iter()
            .find(|h| h.body.first() == Some(&b'{'))
            .cloned()
    }

    /// Ask the portal whether the held token still works.
    ///
    /// The token is read under the lock and the lock is released before
    /// the probe goes out. The token itself is never modified here.
    pub async fn is_valid<P>(&self, probe: &P) -> bool
    where
        P: SessionProbe + Sync,
    {
        self.validate(probe).await == ProbeVerdict::Valid
    }

    /// Like [`is_valid`](Self::is_valid) but reports why a token was refused.
    pub async fn validate<P>(&self, probe: &P) -> ProbeVerdict
    where
        P: SessionProbe + Sync,
    {
        let token = self.get();
        if token.is_empty() {
            return ProbeVerdict::EmptyToken;
        }

        match probe.probe(&token).await {
            Ok(resp) => {
                let verdict = classify_probe(resp.status, &resp.body);
                if verdict != ProbeVerdict::Valid {
                    debug!(?verdict, status = resp.status, "session probe refused token");
                }
                verdict
            }
            Err(e) => {
                warn!(error = %e, "session probe failed");
                ProbeVerdict::UnexpectedBody
            }
        }
    }

    /// Wait until a token is captured, without polling.
    pub async fn wait_for_token(&self, timeout: Duration) -> Result<String, Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so a capture in between is not lost.
            let notified = self.captured.notified();
            let token = self.get();
            if !token.is_empty() {
                return Ok(token);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(Error::Timeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
        }
    }
}

/// Interpret a probe response.
///
/// Only 401 and 403 are refusals. Any other status is judged by its body: the
/// portal answers an expired session with its HTML login page, while a JSON
/// error body still means the token was accepted.
pub fn classify_probe(status: u16, body: &str) -> ProbeVerdict {
    if matches!(status, 401 | 403) {
        return ProbeVerdict::Rejected(status);
    }

    let head = body.trim_start();
    if head.starts_with('<') {
        return ProbeVerdict::LoginPage;
    }
    if head.starts_with('{') || head.starts_with('[') {
        ProbeVerdict::Valid
    } else {
        ProbeVerdict::UnexpectedBody
    }
}
