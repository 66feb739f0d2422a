//! NowCerts API adapter (credential-backed).

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::{instrument, warn};

use super::transport::send_json;
use crate::config::NowCertsSettings;
use crate::credentials::CredentialLifecycleManager;
use crate::error::Result;
use crate::retry::{self, RetryPolicy};

/// Client for the NowCerts REST API.
///
/// Every request carries the current bearer token from the shared
/// [`CredentialLifecycleManager`].
pub struct NowCertsClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialLifecycleManager>,
    retry: RetryPolicy,
}

impl NowCertsClient {
    pub const SERVICE: &'static str = "nowcerts";

    pub fn new(
        http: reqwest::Client,
        settings: &NowCertsSettings,
        credentials: Arc<CredentialLifecycleManager>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url: settings.base_url.clone(),
            credentials,
            retry,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialLifecycleManager> {
        &self.credentials
    }

    /// Issue a request with retries.
    ///
    /// Each attempt sends once with the current token; if NowCerts answers
    /// 401 the credential is renewed and the request is replayed exactly
    /// once. A failing replay is classified like any other response.
    #[instrument(skip(self, body, query), fields(service = "nowcerts"))]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<Value> {
        let op_name = format!("{} {} {}", Self::SERVICE, method, path);
        retry::execute(&self.retry, &op_name, || {
            self.send_authorized(method.clone(), path, body, query)
        })
        .await
    }

    async fn send_authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<Value> {
        let token = self.credentials.get_token(false).await?;

        let response = self
            .send_once(method.clone(), path, body, query, &token)
            .await;
        match response {
            Err(e) if e.is_unauthorized() => {
                warn!(path, "NowCerts rejected the token, renewing and replaying once");
                let token = self.credentials.renew_rejected(&token).await?;
                self.send_once(method, path, body, query, &token).await
            }
            other => other,
        }
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        send_json(Self::SERVICE, request).await
    }

    pub async fn create_contact(&self, contact: &Value) -> Result<Value> {
        self.request(Method::POST, "/api/contacts", Some(contact), &[])
            .await
    }

    pub async fn update_contact(&self, contact_id: &str, contact: &Value) -> Result<Value> {
        self.request(
            Method::PUT,
            &format!("/api/contacts/{contact_id}"),
            Some(contact),
            &[],
        )
        .await
    }

    pub async fn create_policy(&self, policy: &Value) -> Result<Value> {
        self.request(Method::POST, "/api/policies", Some(policy), &[])
            .await
    }

    pub async fn update_policy(&self, policy_id: &str, policy: &Value) -> Result<Value> {
        self.request(
            Method::PUT,
            &format!("/api/policies/{policy_id}"),
            Some(policy),
            &[],
        )
        .await
    }

    pub async fn create_quote(&self, quote: &Value) -> Result<Value> {
        self.request(Method::POST, "/api/quotes", Some(quote), &[])
            .await
    }

    pub async fn update_quote(&self, quote_id: &str, quote: &Value) -> Result<Value> {
        self.request(
            Method::PUT,
            &format!("/api/quotes/{quote_id}"),
            Some(quote),
            &[],
        )
        .await
    }
}
