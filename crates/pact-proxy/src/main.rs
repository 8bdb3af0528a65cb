use clap::Parser;
use pact_proxy::admin_api::AdminApiServer;
use pact_proxy::config::Settings;
use pact_proxy::manager::ProxyManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Intercepting proxy for Pact contract tests
#[derive(Parser, Debug)]
#[command(name = "pact-proxy", version, about)]
struct Args {
    /// Path to a YAML settings file
    #[arg(short, long)]
    config: Option<String>,

    /// Admin API host, overrides the settings file
    #[arg(long, env = "PACT_PROXY_HOST")]
    host: Option<String>,

    /// Admin API port, overrides the settings file
    #[arg(short, long, env = "PACT_PROXY_PORT")]
    port: Option<u16>,

    /// Log filter directive
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    let env_filter =
        EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(host) = args.host {
        settings.admin.host = host;
    }
    if let Some(port) = args.port {
        settings.admin.port = port;
    }
    settings.validate()?;

    let addr: SocketAddr = format!("{}:{}", settings.admin.host, settings.admin.port).parse()?;
    let manager = Arc::new(ProxyManager::new(
        &settings.connection_pool,
        settings.wait.retry_policy(),
    ));

    info!("Starting pact-proxy admin API on {}", addr);
    let server = AdminApiServer::new(addr, Arc::clone(&manager));

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("Admin API stopped: {}", e);
            }
            manager.shutdown();
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            manager.shutdown();
            Ok(())
        }
    }
}
