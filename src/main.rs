use dotenvy::dotenv;
use media_worker::app;
use media_worker::config::settings::AppConfig;
use media_worker::workers::pool::WorkerEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("media_worker=info")),
        )
        .init();

    info!("Starting media worker...");

    let config = AppConfig::new()?;
    let state = app::create_state(config).await?;
    let pool = app::create_pool(&state);

    let mut events = pool.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::Completed { job_id }) => info!(job_id, "✅ Job completed"),
                Ok(WorkerEvent::Failed {
                    job_id,
                    error,
                    attempts_made,
                    will_retry,
                }) => error!(job_id, attempts_made, will_retry, %error, "❌ Job failed"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped worker events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let shutdown = CancellationToken::new();
    let running = pool.start(shutdown.clone());
    info!(
        queue = %state.config.queue.name,
        concurrency = state.config.queue.concurrency,
        "Media worker listening"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, waiting for running jobs...");
    shutdown.cancel();
    running.wait_for_shutdown().await;

    info!("Media worker stopped");
    Ok(())
}
