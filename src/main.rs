mod cli;

use anyhow::Context;
use clap::Parser;
use cli::Args;
use contend::{Backend, BenchConfig, BenchMetrics, Coordinator, MetricsServer, backend};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("command failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.into_config().context("invalid flags")?;
    info!(
        conn = %config.connection.to_url(),
        unique_ids = config.unique_ids,
        workers_per_id = config.workers_per_id,
        think_time = ?config.think_time,
        "starting contention run"
    );

    let shutdown = CancellationToken::new();
    spawn_interrupt_handler(shutdown.clone());

    let backend = backend::connect(config.connection.clone()).context("could not connect")?;
    let metrics = Arc::new(BenchMetrics::new().with_flag_info(&config));

    let server_token = shutdown.child_token();
    let server = {
        let server = MetricsServer::new(Arc::clone(&metrics), Arc::clone(&backend));
        let addr = config.metrics_addr.clone();
        let token = server_token.clone();
        tokio::spawn(async move { server.serve(&addr, token).await })
    };

    let result = drive(&config, backend, metrics, &shutdown).await;

    server_token.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "metrics server failed"),
        Err(err) => warn!(error = %err, "metrics server task failed"),
    }

    result
}

async fn drive(
    config: &BenchConfig,
    backend: Arc<dyn Backend>,
    metrics: Arc<BenchMetrics>,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    backend.bootstrap().await.context("could not create table")?;

    let coordinator = Coordinator::new(backend, config.clone(), metrics);
    coordinator.run(shutdown).await?;

    info!("contention run finished");
    Ok(())
}

fn spawn_interrupt_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping workers");
                shutdown.cancel();
            }
            Err(err) => warn!(error = %err, "could not listen for interrupt"),
        }
    });
}
