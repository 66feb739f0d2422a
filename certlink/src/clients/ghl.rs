//! GoHighLevel API adapter (static API key).

use reqwest::Method;
use serde_json::Value;
use tracing::instrument;

use super::transport::send_json;
use crate::config::GhlSettings;
use crate::error::{Error, Result};
use crate::retry::{self, RetryPolicy};

/// API version pinned by every request.
pub const GHL_API_VERSION: &str = "2021-07-28";

/// Client for the GoHighLevel (LeadConnector) REST API.
pub struct GhlClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    location_id: Option<String>,
    retry: RetryPolicy,
}

impl GhlClient {
    pub const SERVICE: &'static str = "ghl";

    pub fn new(http: reqwest::Client, settings: &GhlSettings, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            location_id: settings.location_id.clone(),
            retry,
        }
    }

    /// Issue a request with retries. A 401 is an ordinary client error:
    /// the key is static, so there is nothing to renew.
    #[instrument(skip(self, body, query), fields(service = "ghl"))]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::config("GHL_API_KEY must be set to call GoHighLevel"))?;
        let url = format!("{}{}", self.base_url, path);
        let op_name = format!("{} {} {}", Self::SERVICE, method, path);

        retry::execute(&self.retry, &op_name, || {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(api_key)
                .header("Version", GHL_API_VERSION);
            if let Some(location_id) = self.location_id.as_deref() {
                request = request.query(&[("locationId", location_id)]);
            }
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            send_json(Self::SERVICE, request)
        })
        .await
    }

    pub async fn create_contact(&self, contact: &Value) -> Result<Value> {
        self.request(Method::POST, "/contacts/", Some(contact), &[])
            .await
    }

    pub async fn update_contact(&self, contact_id: &str, contact: &Value) -> Result<Value> {
        self.request(
            Method::PUT,
            &format!("/contacts/{contact_id}"),
            Some(contact),
            &[],
        )
        .await
    }

    /// Create an opportunity linked to `contact_id`.
    pub async fn create_opportunity(&self, contact_id: &str, opportunity: &Value) -> Result<Value> {
        let mut body = opportunity.clone();
        match body.as_object_mut() {
            Some(fields) => {
                fields.insert("contactId".to_string(), Value::String(contact_id.to_string()));
            }
            None => {
                return Err(Error::invalid_payload(
                    "opportunity body must be a JSON object",
                ));
            }
        }
        self.request(Method::POST, "/opportunities/", Some(&body), &[])
            .await
    }

    pub async fn update_opportunity(
        &self,
        opportunity_id: &str,
        opportunity: &Value,
    ) -> Result<Value> {
        self.request(
            Method::PUT,
            &format!("/opportunities/{opportunity_id}"),
            Some(opportunity),
            &[],
        )
        .await
    }
}
