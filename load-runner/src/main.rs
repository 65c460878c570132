use anyhow::Context;
use clap::Parser;
use load_runner::config::RunnerArgs;
use load_runner::interrupt;
use load_runner::scheduler;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = RunnerArgs::parse();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let _guard = rt.enter();
    rt.block_on(run_load(args))
}

async fn run_load(args: RunnerArgs) -> anyhow::Result<()> {
    let scenario = args.scenario()?;
    tracing::info!(
        target_uri = %scenario.iteration.target(),
        think_time = ?args.think_time,
        "scenario loaded"
    );
    let handle = scheduler::start(scenario)?;
    let cancel = handle.cancel_handle();
    tokio::spawn(async move {
        if interrupt::watch_interrupts(cancel, tokio::signal::ctrl_c).await {
            tracing::warn!("second interrupt, exiting without draining");
            std::process::exit(130);
        }
    });
    let summary = handle.await_completion().await?;
    println!("{summary}");
    if let Some(path) = &args.summary_json {
        let raw = serde_json::to_vec_pretty(&summary).context("Failed to serialize summary")?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        tracing::info!(path = %path.display(), "summary written");
    }
    Ok(())
}
