use anyhow::Context;
use clap::Parser;
use http_load_util::DEFAULT_LOAD;
use std::net::SocketAddr;
use target_server::TargetState;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Synthetic work endpoint for load runs.
#[derive(Debug, Parser)]
#[command(name = "target-server", version)]
struct ServerArgs {
    #[arg(long, env = "TARGET_BIND", default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    /// Seconds of work for requests without a `load` parameter.
    #[arg(long, env = "DEFAULT_LOAD", default_value_t = DEFAULT_LOAD)]
    default_load: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = ServerArgs::parse();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let _g = rt.enter();
    rt.block_on(run_server(args))
}

async fn run_server(args: ServerArgs) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    tracing::info!(addr = %args.bind, default_load = args.default_load, "target listening");
    let state =
        TargetState::new(args.default_load).context("Failed to register target metrics")?;
    target_server::serve(listener, state).await
}
