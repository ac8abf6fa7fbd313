use anyhow::Result;
use axum::Router;
use clap::Parser;
use qps_core::IndexConfig;
use server::{build_app, AppConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index database directory
    #[arg(long, default_value = "./qps-index")]
    db: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Segment bound for a fresh index (ignored when one is loaded)
    #[arg(long, default_value_t = qps_core::config::DEFAULT_MAX_SEGMENTS)]
    max_segments: u32,
    /// Proximity bonus for a fresh index (ignored when one is loaded)
    #[arg(long, default_value_t = qps_core::config::DEFAULT_PROXIMITY_BONUS)]
    proximity_bonus: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = AppConfig {
        db_path: args.db,
        index_config: IndexConfig::new(args.max_segments, args.proximity_bonus)?,
        admin_token: std::env::var("ADMIN_TOKEN").ok(),
    };
    let app: Router = build_app(config).await?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
