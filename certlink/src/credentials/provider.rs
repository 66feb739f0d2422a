//! Identity endpoints that issue credentials.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::types::RefreshOutcome;
use crate::config::NowCertsSettings;
use crate::error::{Error, Result};
use crate::utils::http_client::transport_error;

/// Source of credentials for the lifecycle manager.
///
/// Implementations only talk to the identity endpoint; caching, expiry and
/// single-flight coordination live in
/// [`CredentialLifecycleManager`](super::CredentialLifecycleManager).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Stable identifier used in logs.
    fn provider_id(&self) -> &'static str;

    /// Authenticate from scratch with the configured username and password.
    async fn login(&self) -> Result<RefreshOutcome>;

    /// Exchange a refresh token for a new credential.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome>;
}

/// NowCerts OAuth2 password/refresh-token grants against `/api/token`.
pub struct NowCertsIdentityProvider {
    client: reqwest::Client,
    token_url: String,
    username: Option<String>,
    password: Option<String>,
    client_id: String,
    /// Client id reported by the last successful grant; refreshes must use
    /// the id the token was issued to.
    issued_client_id: RwLock<Option<String>>,
}

impl NowCertsIdentityProvider {
    pub const SERVICE: &'static str = "nowcerts";

    pub fn new(client: reqwest::Client, settings: &NowCertsSettings) -> Self {
        Self {
            client,
            token_url: format!("{}/api/token", settings.base_url),
            username: settings.username.clone(),
            password: settings.password.clone(),
            client_id: settings.client_id.clone(),
            issued_client_id: RwLock::new(None),
        }
    }

    fn effective_client_id(&self) -> String {
        self.issued_client_id
            .read()
            .clone()
            .unwrap_or_else(|| self.client_id.clone())
    }

    async fn grant(&self, form: &[(&str, &str)]) -> Result<RefreshOutcome> {
        let response = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| transport_error(Self::SERVICE, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(Self::SERVICE, e))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "NowCerts token endpoint rejected grant");
            return Err(Error::from_status(Self::SERVICE, status.as_u16(), body));
        }

        let outcome: RefreshOutcome =
            serde_json::from_str(&body).map_err(|e| Error::InvalidResponse {
                service: Self::SERVICE,
                message: format!("malformed token response: {e}"),
            })?;

        if let Some(client_id) = outcome.client_id.as_ref().filter(|c| !c.is_empty()) {
            *self.issued_client_id.write() = Some(client_id.clone());
        }

        Ok(outcome)
    }
}

#[async_trait]
impl IdentityProvider for NowCertsIdentityProvider {
    fn provider_id(&self) -> &'static str {
        Self::SERVICE
    }

    async fn login(&self) -> Result<RefreshOutcome> {
        let (Some(username), Some(password)) = (self.username.as_deref(), self.password.as_deref())
        else {
            return Err(Error::CredentialUnavailable(
                "NOWCERTS_USERNAME and NOWCERTS_PASSWORD must be set".to_string(),
            ));
        };

        debug!(token_url = %self.token_url, "Requesting NowCerts token (password grant)");
        let client_id = self.effective_client_id();
        self.grant(&[
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
            ("client_id", &client_id),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome> {
        debug!(token_url = %self.token_url, "Requesting NowCerts token (refresh grant)");
        let client_id = self.effective_client_id();
        self.grant(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &client_id),
        ])
        .await
    }
}
