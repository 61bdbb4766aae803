//! Zoho Payments Gateway
//!
//! Single-binary service that:
//! 1. Captures the Zoho refresh token through a one-time consent flow
//! 2. Keeps a valid access token cached for outbound payment API calls
//! 3. Creates and verifies payment links
//! 4. Authenticates inbound payment webhooks before reading them

mod config;
mod error;
mod metrics;
mod oauth;
mod payments;
mod webhooks;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zoho_auth::{AccessTokenProvider, AccessTokenState, CredentialStore, TokenClient};
use zoho_webhook::WebhookVerifier;

use crate::config::Config;
use crate::oauth::PendingStates;
use crate::payments::ZohoPaymentsClient;

/// Time allowed for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    tokens: Arc<AccessTokenProvider>,
    payments: Arc<ZohoPaymentsClient>,
    verifier: Arc<WebhookVerifier>,
    pending_states: PendingStates,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router with all routes and shared state.
///
/// Every route is counted by the request metrics middleware, and the whole
/// router sits behind a `max_connections` concurrency limit.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(oauth::routes())
        .merge(payments::routes())
        .merge(webhooks::routes())
        .route_layer(axum::middleware::from_fn(metrics::track_requests))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting zoho-payments-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    match &config_path {
        Some(path) => info!(path = %path.display(), "loading configuration"),
        None => info!("no config file, using defaults and environment"),
    }
    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;

    info!(
        listen_addr = %config.server.listen_addr,
        accounts_url = %config.zoho.accounts_url,
        api_root = %config.zoho.api_root,
        credentials_dir = %config.credentials.dir.display(),
        "configuration loaded"
    );

    let store: Arc<dyn CredentialStore> = Arc::new(config.credential_store());
    let token_client = TokenClient::new(config.oauth_client())
        .context("OAuth client is not configured, set CLIENT_ID and CLIENT_SECRET")?;
    let tokens = Arc::new(AccessTokenProvider::new(store, token_client));

    let status = tokens.status().await;
    if status.refresh_token_captured {
        info!(
            access_token = status.access_token.label(),
            "refresh token loaded"
        );
    } else {
        warn!("no refresh token captured yet, complete the authorization flow at /oauth/start");
    }
    if config.zoho.redirect_uri.is_none() {
        warn!("REDIRECT_URI is not set, /oauth/start and /callback will fail");
    }
    if config.zoho.account_id.is_none() {
        warn!("ACCOUNT_ID is not set, payment routes will fail");
    }

    let verifier = config.webhook_verifier();
    if verifier.mode_label() == "not_configured" {
        warn!("ZOHO_WEBHOOK_SIGNING_KEY is not set, every webhook will be rejected");
    }

    let payments = ZohoPaymentsClient::new(
        config.zoho.api_root.clone(),
        config.zoho.account_id.clone(),
        config.timeout(),
        tokens.clone(),
    )
    .context("failed to build payments API client")?;

    let app_state = AppState {
        tokens,
        payments: Arc::new(payments),
        verifier: Arc::new(verifier),
        pending_states: PendingStates::default(),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race the drain against
    // the timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Returns 200 once a refresh token has been captured, 503 (degraded) before.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.tokens.status().await;
    let expires_at = match status.access_token {
        AccessTokenState::Valid { expires_at } | AccessTokenState::Expired { expires_at } => {
            Some(expires_at)
        }
        AccessTokenState::Missing => None,
    };

    let (status_code, health) = if status.refresh_token_captured {
        (axum::http::StatusCode::OK, "healthy")
    } else {
        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = serde_json::json!({
        "status": health,
        "refresh_token": if status.refresh_token_captured { "captured" } else { "missing" },
        "access_token": status.access_token.label(),
        "access_token_expires_at": expires_at,
        "webhook_signature": state.verifier.mode_label(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
