// Portal HTTP client
//
// Wraps `reqwest::Client` with the portal's header conventions, session
// token injection and passive token capture. Endpoint methods live in
// `endpoints.rs` as inherent methods so this module stays focused on
// transport mechanics.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, preview};
use crate::session::{ProbeResponse, SessionManager, SessionProbe};
use crate::transport::TransportConfig;

/// Header carrying the session token, on requests and on observed responses.
pub const TOKEN_HEADER: &str = "Roarand";

/// Cookie the portal mirrors the token into after login.
const TOKEN_COOKIE: &str = "roarand";

/// Path fragment of responses kept as in-flight hints.
const HINT_PATH: &str = "locate-tree";

/// Static portal settings that shape every request.
#[derive(Debug, Clone)]
pub struct PortalSettings {
    /// Minutes east of UTC, sent as `X-Timezone-Offset`.
    pub timezone_offset_minutes: i32,
    /// Station dn used by the session probe. Any dn works; the portal
    /// only needs to decide whether the caller is logged in.
    pub probe_station_dn: String,
    /// Path of the form login endpoint.
    pub login_path: String,
    /// Locate-tree endpoint used for site bootstrap, when the deployment has one.
    pub locate_tree: Option<LocateTreeSettings>,
}

#[derive(Debug, Clone)]
pub struct LocateTreeSettings {
    pub path: String,
    pub sub_node_type_ids: String,
    pub type_id_include: String,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            timezone_offset_minutes: 420,
            probe_station_dn: "NE=00000000".into(),
            login_path: "/unisso/v3/validateUser.action".into(),
            locate_tree: None,
        }
    }
}

/// HTTP client for the portal's internal JSON endpoints.
///
/// Every request carries the token held by the shared [`SessionManager`].
/// Every response is inspected for a fresh token, which is offered to the
/// session with first-writer-wins semantics.
pub struct PortalClient {
    http: reqwest::Client,
    base_url: Url,
    settings: PortalSettings,
    session: Arc<SessionManager>,
    cookie_jar: Option<Arc<Jar>>,
}

impl PortalClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// A cookie jar is added when the config has none; the login flow
    /// depends on it.
    pub fn new(
        base_url: Url,
        settings: PortalSettings,
        session: Arc<SessionManager>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let config = if transport.cookie_jar.is_some() {
            transport.clone()
        } else {
            transport.clone().with_cookie_jar()
        };
        let cookie_jar = config.cookie_jar.clone();
        let http = config.build_client()?;
        Ok(Self {
            http,
            base_url,
            settings,
            session,
            cookie_jar,
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn settings(&self) -> &PortalSettings {
        &self.settings
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    // ── Token capture ────────────────────────────────────────────────

    /// Offer a token found in response headers to the session.
    pub(crate) fn observe_headers(&self, headers: &HeaderMap) {
        if let Some(token) = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
            trace!("token header observed");
            self.session.capture(token);
        }
    }

    /// Look for the token cookie in the jar and offer it to the session.
    ///
    /// Returns `true` if a value was found (whether or not it was accepted).
    pub fn capture_from_cookies(&self) -> bool {
        let Some(jar) = self.cookie_jar.as_ref() else {
            return false;
        };
        let Some(header) = jar.cookies(&self.base_url) else {
            return false;
        };
        let Ok(cookies) = header.to_str() else {
            return false;
        };
        match cookie_value(cookies, TOKEN_COOKIE) {
            Some(token) => {
                self.session.capture(token);
                true
            }
            None => false,
        }
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Resolve an absolute portal path against the base URL.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    /// Append the millisecond cache-buster the portal's own UI sends.
    pub(crate) fn bust_cache(url: &mut Url) {
        url.query_pairs_mut()
            .append_pair("_", &chrono::Utc::now().timestamp_millis().to_string());
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn token(&self) -> Result<String, Error> {
        let token = self.session.get();
        if token.is_empty() {
            Err(Error::NoToken)
        } else {
            Ok(token)
        }
    }

    fn decorate(&self, builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        builder
            .header(reqwest::header::ACCEPT, "application/json")
            .header(
                "X-Timezone-Offset",
                self.settings.timezone_offset_minutes.to_string(),
            )
            .header("X-Requested-With", "XMLHttpRequest")
            .header(TOKEN_HEADER, token)
    }

    /// Send an authenticated GET and parse the JSON body.
    pub(crate) async fn get_json(&self, mut url: Url) -> Result<Value, Error> {
        let token = self.token()?;
        Self::bust_cache(&mut url);
        debug!("GET {}", url);

        let resp = self
            .decorate(self.http.get(url.clone()), &token)
            .send()
            .await?;
        self.parse_json(&url, resp).await
    }

    /// Send an authenticated POST with a JSON body and parse the JSON reply.
    pub(crate) async fn post_json(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<Value, Error> {
        let token = self.token()?;
        debug!("POST {}", url);

        let resp = self
            .decorate(self.http.post(url.clone()).json(body), &token)
            .send()
            .await?;
        self.parse_json(&url, resp).await
    }

    /// Validate status and body shape, capturing tokens and hints on the way.
    async fn parse_json(&self, url: &Url, resp: reqwest::Response) -> Result<Value, Error> {
        let status = resp.status();
        self.observe_headers(resp.headers());

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Portal {
                status: status.as_u16(),
                message: "session rejected".into(),
            });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Portal {
                status: status.as_u16(),
                message: preview(&body, 200).to_owned(),
            });
        }

        let bytes = resp.bytes().await?;
        if url.path().contains(HINT_PATH) {
            self.session.record_hint(url.as_str(), bytes.clone());
        }
        decode_body(&bytes)
    }
}

/// Parse a portal body, treating an HTML reply as an expired session.
pub(crate) fn decode_body(bytes: &Bytes) -> Result<Value, Error> {
    let text = String::from_utf8_lossy(bytes);
    let head = text.trim_start();
    if head.starts_with('<') {
        return Err(Error::SessionExpired);
    }
    serde_json::from_str(head).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(head, 200)),
        body: text.clone().into_owned(),
    })
}

/// Extract one cookie's value from a `Cookie` header string.
fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.eq_ignore_ascii_case(name) && !value.is_empty()).then_some(value)
    })
}

// ── Session probe ────────────────────────────────────────────────────

impl SessionProbe for PortalClient {
    async fn probe(&self, token: &str) -> Result<ProbeResponse, Error> {
        let mut url = self.url(crate::endpoints::STATION_KPI)?;
        url.query_pairs_mut()
            .append_pair("stationDn", &self.settings.probe_station_dn);
        Self::bust_cache(&mut url);
        debug!("probing session via {}", url.path());

        let resp = self.decorate(self.http.get(url), token).send().await?;
        self.observe_headers(resp.headers());
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(ProbeResponse {
            status,
            body: preview(&body, 50).to_owned(),
        })
    }
}
