use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use curriculum_relay::config::AppConfig;
use curriculum_relay::server::{create_app_router, run_server};
use curriculum_relay::services::relay::PromptRelay;
use curriculum_relay::state::AppState;

fn setup_logging(config: &AppConfig) {
    let filter = EnvFilter::try_new(format!(
        "{level},tower_http=debug",
        level = config.log.level
    ))
    .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    match config.log.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(false)
                        .with_file(true)
                        .with_line_number(true)
                        .with_current_span(true)
                        .with_span_list(true),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::new().map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration: {e}. Please check your environment variables and configuration."
        )
    })?;

    setup_logging(&config);

    info!("Starting Curriculum Relay v{}", env!("CARGO_PKG_VERSION"));

    let http = reqwest::Client::builder()
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
    let relay = PromptRelay::new(&config.relay, http)?;

    info!(
        "Config loaded: Host={}, Port={}, AuthMode={}, Model={}",
        config.server.host,
        config.server.port,
        relay.auth_mode(),
        relay.model()
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        relay: Arc::new(relay),
    };

    let app = create_app_router(&config, state)?;

    run_server(app, &config.server.host, config.server.port).await
}
