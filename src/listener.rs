//! The listener capability set and the executor abstraction callbacks are dispatched
//! through (spec §4.7, §4.9, §5).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::NtpError;
use crate::offset::TimeSample;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs a sync task, or a single listener callback, to completion. The sync executor
/// and the (optional) listener executor are both expressed through this trait so a
/// caller can inject a custom runtime, or a synchronous stand-in for tests.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, job: BoxFuture);

    /// Spawns `job` as an independent background task and returns immediately.
    /// Implementations that have no notion of detached tasks (e.g. a test executor
    /// that runs inline) may simply run the job before returning.
    fn spawn_detached(&self, job: BoxFuture);
}

/// The default executor: dispatches onto the ambient `tokio` runtime.
#[derive(Clone, Default)]
pub struct TokioExecutor;

#[async_trait::async_trait]
impl Executor for TokioExecutor {
    async fn run(&self, job: BoxFuture) {
        job.await
    }

    fn spawn_detached(&self, job: BoxFuture) {
        tokio::spawn(job);
    }
}

pub fn default_executor() -> Arc<dyn Executor> {
    Arc::new(TokioExecutor)
}

/// Runs `job` through `executor` when one is configured, or awaits it inline
/// otherwise. Every listener callback is dispatched through this so a configured
/// listener executor (e.g. a synchronous test stand-in) actually receives them.
pub async fn dispatch(executor: Option<&dyn Executor>, job: BoxFuture) {
    match executor {
        Some(executor) => executor.run(job).await,
        None => job.await,
    }
}

/// The capability set a caller can observe during a sync. Every method has a no-op
/// default, so implementors override only the events they care about.
#[async_trait::async_trait]
pub trait Listener: Send + Sync {
    /// The terminal success event: exactly one per completed sync task, or delivered
    /// synchronously by `now_or_sync` when the cache was already valid.
    async fn on_successful(&self, _sample: TimeSample) {}

    /// The terminal failure event: delivered exactly once when the retry budget is
    /// exhausted. Never delivered for a cancelled task.
    async fn on_failed(&self, _error: NtpError) {}

    /// One per successful attempt against a single host, just before `on_successful`.
    async fn on_ntp_response_successful(
        &self,
        _sample: &TimeSample,
        _host: &str,
        _retry: u32,
        _cycle: u32,
    ) {
    }

    /// One per failed attempt against a single host.
    async fn on_ntp_response_failed(&self, _host: &str, _retry: u32, _cycle: u32, _error: &NtpError) {}

    /// Fired immediately before the controller sleeps between cycles.
    async fn next_retry_loop_in(&self, _cycle: u32, _delay: Duration) {}
}

/// A listener with every callback a no-op; used as a harmless default.
#[derive(Default)]
pub struct NoopListener;

impl Listener for NoopListener {}
