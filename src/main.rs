use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tank_arena_server::config::{LogFormat, ServerConfig};
use tank_arena_server::metrics::Metrics;
use tank_arena_server::net::GameServer;
use tank_arena_server::server::ServerContext;

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = ServerConfig::load_or_default();
    init_logging(config.log_format);

    std::panic::set_hook(Box::new(|panic| {
        error!(%panic, "Task panicked");
    }));

    info!("Tank Arena Server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        bind = %config.bind_address,
        port = config.port,
        max_battles = config.max_battles,
        encryption = config.protocol_encryption,
        "Configuration loaded"
    );

    let metrics = Arc::new(Metrics::new());

    #[cfg(feature = "metrics_server")]
    {
        let metrics = metrics.clone();
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = tank_arena_server::metrics::start_metrics_server(metrics, port).await {
                error!(error = %e, "Metrics server error");
            }
        });
    }

    let server = ServerContext::from_config(config, metrics)?;
    let battle = server.create_default_battle()?;
    info!(battle = %battle.id(), title = %battle.info().title, "Default battle created");

    let game = GameServer::bind(server.clone()).await?;

    // Shutdown signal handler
    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    if let Err(e) = game.run(shutdown).await {
        error!(error = %e, "Server error");
    }

    // Cleanup
    server.battles.shutdown_all();
    info!("Server stopped");

    Ok(())
}
