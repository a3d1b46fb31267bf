// Portal login
//
// The harvester only needs *a* session: the login collaborator gets the
// cookie jar into a logged-in state and the token follows through passive
// capture. `FormLogin` does that with the portal's SSO form endpoint.

use std::future::Future;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::client::PortalClient;
use crate::error::{Error, preview};

/// Keep-alive route that echoes the current token in its payload.
pub const KEEP_ALIVE: &str = "/rest/neteco/auth/v1/keep-alive";

/// Establishes a portal session for a [`PortalClient`].
///
/// Implementations report success or failure only; the token itself is
/// picked up by the client's response observer.
pub trait Authenticator: Send + Sync {
    fn login(&self, client: &PortalClient) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Username/password login against the portal SSO form.
pub struct FormLogin {
    username: String,
    password: SecretString,
}

impl FormLogin {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Ask the portal for the session token after the form succeeded.
    async fn keep_alive(&self, client: &PortalClient) -> Result<(), Error> {
        let mut url = client.url(KEEP_ALIVE)?;
        PortalClient::bust_cache(&mut url);
        debug!("GET {}", url);

        let resp = client
            .http()
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?;
        client.observe_headers(resp.headers());

        if !resp.status().is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        if let Ok(value) = serde_json::from_str::<Value>(&body) {
            if let Some(token) = value.get("payload").and_then(Value::as_str) {
                client.session().capture(token);
            }
        }
        Ok(())
    }
}

impl Authenticator for FormLogin {
    async fn login(&self, client: &PortalClient) -> Result<(), Error> {
        let url = client.url(&client.settings().login_path)?;
        debug!("POST {}", url);

        let body = json!({
            "organizationName": "",
            "username": self.username,
            "password": self.password.expose_secret(),
        });

        let resp = client
            .http()
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;
        client.observe_headers(resp.headers());

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Error::Login {
                message: format!("HTTP {status}: {}", preview(&text, 200)),
            });
        }

        if let Some(message) = login_error(&text) {
            return Err(Error::Login { message });
        }

        self.keep_alive(client).await?;
        client.capture_from_cookies();

        info!(username = %self.username, "portal login accepted");
        Ok(())
    }
}

/// The SSO form answers 200 even for bad credentials; the verdict is in
/// `errorCode`/`errorMsg`.
fn login_error(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = value
        .get("errorMsg")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty());
    let code = value
        .get("errorCode")
        .filter(|c| !c.is_null())
        .map(|c| c.as_str().map_or_else(|| c.to_string(), str::to_owned))
        .filter(|c| !c.is_empty() && c != "0");

    match (message, code) {
        (Some(msg), _) => Some(msg.to_owned()),
        (None, Some(code)) => Some(format!("error code {code}")),
        (None, None) => None,
    }
}
