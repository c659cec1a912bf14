use anyhow::Result;
use snapgate_common::AppConfig;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    // Parse command-line args for config path
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/snapgate.yaml".to_string());

    info!(config_path = %config_path, "starting snapgate gateway");

    let config = AppConfig::load(&config_path)?;
    let listen_addr = config.server.listen.clone();

    let state = snapgate_gateway::new_shared_state(config);

    // Background maintenance: idle-window cleanup and stale-connection reaping.
    state.rate_limit.start_cleanup_task();
    state.realtime.start_reaper();

    snapgate_gateway::run_server(state, &listen_addr).await
}
