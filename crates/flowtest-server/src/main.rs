use anyhow::Result;
use clap::Parser;
use flowtest_server::config;
use flowtest_server::server::Server;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Streams workflow test runs over HTTP", long_about = None)]
struct Args {
    /// Address to listen on (overrides FLOWTEST_BIND)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// SQLite database file (overrides FLOWTEST_DB)
    #[arg(long)]
    db: Option<PathBuf>,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = config::ServerConfig::from_env();
    if let Some(bind) = args.bind {
        cfg.bind = bind;
    }
    if let Some(db) = args.db {
        cfg.db_path = db;
    }

    init_logging(&cfg.log_level);

    tracing::info!(
        event = "server_start",
        service = flowtest_core::SERVICE_NAME,
        config = ?cfg
    );

    Server::run(cfg).await
}
