//! Shared request execution for the upstream adapters.

use reqwest::RequestBuilder;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::logging::log_response;
use crate::utils::http_client::transport_error;

/// Send `request` once and decode the JSON body.
///
/// Transport failures become [`Error::ConnectionFailure`] and non-2xx
/// statuses are classified with [`Error::from_status`]. An empty success
/// body decodes to `Value::Null`.
pub(crate) async fn send_json(service: &'static str, request: RequestBuilder) -> Result<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(service, e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(service, e))?;

    log_response(service, status.as_u16(), &body);

    if !status.is_success() {
        return Err(Error::from_status(service, status.as_u16(), body));
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| Error::InvalidResponse {
        service,
        message: format!("response body is not JSON: {e}"),
    })
}
