use anyhow::{Context, Result};
use fnpool::{Pool, PoolConfig};
use futures::future::join_all;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Iterative Fibonacci; self-contained so every worker can run its own copy
fn fibonacci(n: u64) -> Result<u64, String> {
    let (value, _) = (0..n)
        .try_fold((0u128, 1u128), |(a, b), _| a.checked_add(b).map(|next| (b, next)))
        .ok_or_else(|| format!("fibonacci({n}) overflows u128"))?;
    u64::try_from(value).map_err(|_| format!("fibonacci({n}) overflows u64"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fnpool=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        tracing::info!("Loaded .env from {:?}", path);
    }

    let config = PoolConfig::from_env().context("Invalid pool configuration")?;
    let jobs: u64 = std::env::var("FNPOOL_DEMO_JOBS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(32);

    let pool = Pool::with_config(fibonacci, config)?;
    tracing::info!(size = pool.size(), jobs, "Dispatching demo workload");

    let handles: Vec<_> = (0..jobs).map(|n| pool.dispatch(&(n * 3))).collect();
    tracing::info!(
        running = pool.running_worker_count(),
        waiting = pool.waiting_event_count(),
        "Workload queued"
    );

    for (n, result) in (0..jobs).zip(join_all(handles).await) {
        match result {
            Ok(value) => tracing::info!(n = n * 3, value, "fibonacci"),
            Err(e) => tracing::warn!(n = n * 3, "fibonacci failed: {}", e),
        }
    }

    let stats = pool.stats();
    tracing::info!(stats = %serde_json::to_string(&stats)?, "Workload finished");

    pool.dispose();
    tracing::info!("Pool disposed");
    Ok(())
}
