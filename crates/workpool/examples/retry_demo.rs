//! Runs a handful of jobs, one of them flaky, and prints their reports.
//!
//! ```text
//! RUST_LOG=workpool=debug cargo run -p workpool --example retry_demo
//! ```
//!
//! Pool settings come from `WORKPOOL_*` variables (a `.env` file is honored);
//! without them the demo uses three workers and a bounded queue of eight.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use workpool::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match PoolConfig::from_env() {
        Ok(config) => config,
        Err(ConfigError::MissingEnv(_)) => {
            let retry =
                RetryPolicy::exponential(3, Duration::from_millis(50), Duration::from_secs(1))?
                    .with_jitter(0.1);
            PoolConfig::new(3, retry, QueueConfig::bounded(8)).with_name("demo")
        }
        Err(err) => return Err(err.into()),
    };
    let pool = WorkerPool::new(config)?;

    let flaky_calls = Arc::new(AtomicU32::new(0));
    let mut handles = Vec::new();

    for n in 0..5u32 {
        let calls = Arc::clone(&flaky_calls);
        let mut job = Job::new(n)
            .with_handler(move |n| {
                let calls = Arc::clone(&calls);
                async move {
                    if n == 2 && calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        anyhow::bail!("job {n} hit a transient error");
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                }
            })
            .with_cleanup(move || tracing::info!(job = n, "cleanup"));
        handles.push(job.subscribe());
        pool.submit(job).await?;
    }

    for handle in handles {
        let report = handle.wait().await?;
        println!(
            "{} -> {} after {} attempt(s)",
            report.job_id,
            report.outcome.kind(),
            report.attempts
        );
    }

    pool.stop().await;
    println!("{}", serde_json::to_string_pretty(&pool.stats())?);
    Ok(())
}
