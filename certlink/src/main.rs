use std::sync::Arc;

use certlink::api::{ApiServer, ApiServerConfig, AppState};
use certlink::clients::{GhlClient, NowCertsClient};
use certlink::config::Settings;
use certlink::credentials::{CredentialLifecycleManager, NowCertsIdentityProvider};
use certlink::dedup::DedupGuard;
use certlink::dispatcher::EventDispatcher;
use certlink::logging::init_logging;
use certlink::utils::http_client::{build_http_client, install_rustls_provider};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Arc::new(Settings::from_env()?);

    // Keep the guard alive so the file writer flushes on exit.
    let (logging_config, _log_guard) = init_logging(&settings.log)?;

    install_rustls_provider();
    let http = build_http_client(settings.request_timeout)?;

    if settings.nowcerts.username.is_none() || settings.nowcerts.password.is_none() {
        tracing::warn!("NowCerts credentials not set; NowCerts calls will fail");
    }
    if settings.ghl.api_key.is_none() {
        tracing::warn!("GHL_API_KEY not set; GoHighLevel calls will fail");
    }

    let provider = Arc::new(NowCertsIdentityProvider::new(
        http.clone(),
        &settings.nowcerts,
    ));
    let credentials = Arc::new(CredentialLifecycleManager::new(
        provider,
        settings.nowcerts.token_refresh_buffer,
    ));

    let nowcerts = Arc::new(NowCertsClient::new(
        http.clone(),
        &settings.nowcerts,
        credentials,
        settings.retry.clone(),
    ));
    let ghl = Arc::new(GhlClient::new(http, &settings.ghl, settings.retry.clone()));

    let cancel_token = CancellationToken::new();

    let dedup = Arc::new(DedupGuard::new(settings.dedup.retention));
    let sweeper = dedup.start_sweeper(settings.dedup.sweep_interval, cancel_token.child_token());

    let dispatcher = Arc::new(EventDispatcher::new(nowcerts, ghl, dedup));
    let state =
        AppState::new(Arc::clone(&settings), dispatcher).with_logging_config(logging_config);

    let server = ApiServer::new(
        ApiServerConfig::from(&settings.server),
        state,
        cancel_token.clone(),
    );

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    tracing::info!(
        version = %settings.app_version,
        "{} starting",
        settings.app_name
    );

    server.run().await?;

    cancel_token.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!("Dedup sweeper task failed: {}", e);
    }

    tracing::info!("certlink stopped");
    Ok(())
}
