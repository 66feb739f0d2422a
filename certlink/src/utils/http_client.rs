use std::{sync::OnceLock, time::Duration};

use tracing::debug;

use crate::error::{Error, Result};

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the `reqwest::Client` shared by all outbound calls.
///
/// `request_timeout` bounds each call end to end; a timeout surfaces as a
/// transport error and is classified as a connection failure.
pub fn build_http_client(request_timeout: Duration) -> Result<reqwest::Client> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("certlink/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10));

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))
}

/// Map a transport error from reqwest into a connection failure for `service`.
pub fn transport_error(service: &'static str, err: reqwest::Error) -> Error {
    let message = if err.is_timeout() {
        format!("request timed out: {err}")
    } else {
        err.to_string()
    };
    Error::connection(service, message)
}
