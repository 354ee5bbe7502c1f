//! # Runner Contract
//!
//! A runner is one independently running pipeline stage. Runners never call
//! each other; they only read from and write to message stores.

use async_trait::async_trait;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::Result;
use crate::observability::metrics::RUNNER_STARTS;

#[async_trait]
pub trait Runner: Send + Sync {
    /// Stable identifier used in logs and metrics.
    fn name(&self) -> &str;

    /// Perform setup and start background work.
    ///
    /// Setup errors are returned and abort startup. Ongoing work must be
    /// spawned on the shared task tracker so this returns promptly; that work
    /// ends when `ctx` is cancelled or its input stores close.
    async fn start(&self, ctx: CancellationToken) -> Result<()>;
}

/// Start one runner, logging the outcome with its name.
pub async fn start_runner(ctx: &CancellationToken, runner: &dyn Runner) -> Result<()> {
    let name = runner.name().to_string();
    info!(runner = %name, "Starting runner");

    match runner.start(ctx.clone()).await {
        Ok(()) => {
            counter!(RUNNER_STARTS, "runner" => name).increment(1);
            Ok(())
        }
        Err(e) => {
            error!(runner = %name, error = %e, "Failed to start runner");
            Err(e)
        }
    }
}

/// Start runners in order, stopping at the first failure.
///
/// `runners` is consumed lazily: runners after a failing one are never
/// constructed, let alone started.
pub async fn start_runners<I>(ctx: &CancellationToken, runners: I) -> Result<usize>
where
    I: IntoIterator<Item = Box<dyn Runner>>,
{
    let mut started = 0;
    for runner in runners {
        start_runner(ctx, runner.as_ref()).await?;
        started += 1;
    }
    Ok(started)
}
