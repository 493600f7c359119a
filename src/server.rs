use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{any, get},
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::handlers::{curriculum, health};
use crate::middleware::security_headers::security_headers_middleware;
use crate::state::AppState;

pub const RELAY_PATH: &str = "/api/generate-curriculum";
/// Serverless function path; existing front ends still post here.
pub const LEGACY_RELAY_PATH: &str = "/.netlify/functions/generateCurriculum";

fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if origin == "*" {
        return Ok(layer.allow_origin(Any));
    }

    let origin = HeaderValue::from_str(origin)
        .map_err(|e| anyhow::anyhow!("Invalid CORS origin '{origin}': {e}"))?;
    Ok(layer.allow_origin(origin))
}

pub fn create_app_router(config: &AppConfig, state: AppState) -> anyhow::Result<Router> {
    let mut app = Router::new()
        .route("/health", get(health::health_check))
        .route(RELAY_PATH, any(curriculum::generate_curriculum))
        .route(LEGACY_RELAY_PATH, any(curriculum::generate_curriculum))
        // Enforced when the relay handler buffers a POST body, so other methods still get 405.
        .layer(DefaultBodyLimit::max(config.server.max_request_size))
        .layer(middleware::from_fn(security_headers_middleware));

    if config.server.request_timeout_secs > 0 {
        app = app.layer(tower_http::timeout::TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )));
    }

    if let Some(origin) = config.server.cors_allow_origin.as_deref() {
        app = app.layer(cors_layer(origin)?);
    }

    Ok(app
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = async {
            match signal(SignalKind::terminate()) {
                Ok(mut s) => {
                    if s.recv().await.is_none() {
                        warn!("SIGTERM signal stream closed unexpectedly");
                        std::future::pending::<()>().await;
                    }
                }
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, initiating graceful shutdown");
            }
            () = sigterm => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            return;
        }
        info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

pub async fn run_server(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address {host}:{port}: {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {addr}");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        error!("Server error: {e}");
        return Err(anyhow::anyhow!("Server failed: {e}"));
    }

    info!("Server shutdown complete");
    Ok(())
}
