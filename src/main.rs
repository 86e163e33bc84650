use clap::Parser;

use batch_fanout::{config::FanoutConfig, server};

#[derive(Debug, Parser)]
struct Args {
    #[arg(long)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::info!(config = %args.config, "starting");

    let cfg_bytes = tokio::fs::read(args.config).await?;
    let cfg = FanoutConfig::from_yaml_bytes(&cfg_bytes)?;

    // The standalone binary serves the batch endpoint plus a health check; library consumers
    // mount their own application router via `server::build_app`/`server::run`.
    let host = axum::Router::new().route("/healthz", axum::routing::get(|| async { "ok" }));

    server::run(cfg, host).await
}
