use async_bounded::{map_with_concurrency, run_with_concurrency, CancellationController, Config, SpawnError};
use futures::StreamExt;
use std::time::Instant;
use tokio::{runtime::Builder, time::Duration};
use tracing_subscriber::EnvFilter;


fn main() -> Result<(), SpawnError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| SpawnError::OperationFailure(e.into()))?;

    rt.block_on(async {
        let limit = Config::io_bound().concurrency;

        let now = Instant::now();
        let items: Vec<u64> = (0..10_000).collect();
        let squares = map_with_concurrency(items, |i| async move {
            tokio::time::sleep(Duration::from_micros(50)).await;
            Ok::<_, SpawnError>(i * i)
        }, limit).await?;
        tracing::info!(count = squares.len(), elapsed = ?now.elapsed(), "batch finished");

        let controller = CancellationController::new();
        let signal = controller.signal();
        let items: Vec<u64> = (0..1_000).collect();
        let mut stream = run_with_concurrency(items, limit, |i| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok::<_, SpawnError>(i)
        }, Some(&signal))?;

        let mut received = 0usize;
        while let Some(result) = stream.next().await {
            result?;
            received += 1;
            if received == 100 {
                controller.cancel();
            }
        }
        controller.dispose();
        tracing::info!(received, started = stream.started(), "stream finished after cancellation");

        Ok::<(), SpawnError>(())
    })
}
