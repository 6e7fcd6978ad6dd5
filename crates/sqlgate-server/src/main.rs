use anyhow::Context;
use clap::Parser;
use sqlgate_core::GatewayConfig;
use sqlgate_exec::Gateway;
use sqlgate_firewall::FirewallRegistry;
use sqlgate_server::{create_router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sqlgate", version, about = "SQL-over-HTTP gateway with a statement firewall")]
struct Cli {
    /// Path to the gateway configuration file
    #[arg(short, long, env = "SQLGATE_CONFIG", default_value = "sqlgate.yaml")]
    config: PathBuf,

    /// Listen address, overriding `server.bind`
    #[arg(long)]
    bind: Option<String>,

    /// Validate the configuration and exit
    #[arg(long, default_value_t = false)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if cli.check {
        println!(
            "Configuration OK: {} database(s) in {}",
            config.databases.len(),
            cli.config.display()
        );
        return Ok(());
    }

    let registry = FirewallRegistry::with_builtins();
    let gateway = Gateway::from_config(&config, &registry)
        .await
        .context("starting database bindings")?;

    let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(
        address = %bind,
        databases = ?gateway.database_names(),
        "sqlgate listening"
    );

    let app = create_router(AppState::new(gateway));
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("sqlgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
