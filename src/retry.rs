//! Host-rotation and cycle state machine (spec §4.6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cache::CacheRepository;
use crate::codec;
use crate::error::NtpError;
use crate::listener::{dispatch, BoxFuture, Executor, Listener};
use crate::offset::compute_sample;
use crate::tick::TickSource;
use crate::transport::NtpTransport;
use crate::validator::{self, LocalTiming, ValidationThresholds};

/// Everything the controller needs to drive one sync, independent of `Options` so it
/// can be unit-tested with a fake transport and an in-process listener.
pub struct RetryPlan {
    pub hosts: Vec<(String, u16)>,
    pub max_retry_per_host: u32,
    pub max_retry_loop: u32,
    pub delay_between_retry_loop: Duration,
    pub connection_timeout: Duration,
    pub thresholds: ValidationThresholds,
}

/// Cooperative cancellation flag shared between a `TaskHandle` and its running task.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives the host-rotation/retry-cycle state machine to completion, dispatching
/// listener events — each routed through `listener_executor` when one is configured,
/// or run inline otherwise — in the order described in §5. Returns without emitting
/// anything further once `cancel` has been observed.
pub async fn run(
    plan: &RetryPlan,
    transport: &dyn NtpTransport,
    tick_source: &dyn TickSource,
    cache: &CacheRepository,
    listener: Arc<dyn Listener>,
    listener_executor: Option<&dyn Executor>,
    cancel: &CancelFlag,
) {
    if plan.hosts.is_empty() {
        dispatch_failed(
            &listener,
            listener_executor,
            NtpError::SyncFailure("no hosts configured".to_string()),
        )
        .await;
        return;
    }

    let mut host_index = 0usize;
    let mut per_host_retries = 0u32;
    let mut cycle = 0u32;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let (host, port) = plan.hosts[host_index].clone();

        match attempt(plan, transport, tick_source, &host, port).await {
            Ok(sample) => {
                if cancel.is_cancelled() {
                    return;
                }
                cache.set(&sample);

                {
                    let listener = listener.clone();
                    let sample_for_event = sample.clone();
                    let host = host.clone();
                    let job: BoxFuture = Box::pin(async move {
                        listener
                            .on_ntp_response_successful(&sample_for_event, &host, per_host_retries, cycle)
                            .await;
                    });
                    dispatch(listener_executor, job).await;
                }

                {
                    let listener = listener.clone();
                    let job: BoxFuture = Box::pin(async move {
                        listener.on_successful(sample).await;
                    });
                    dispatch(listener_executor, job).await;
                }
                return;
            }
            Err(error) => {
                {
                    let listener = listener.clone();
                    let host = host.clone();
                    let job: BoxFuture = Box::pin(async move {
                        listener
                            .on_ntp_response_failed(&host, per_host_retries, cycle, &error)
                            .await;
                    });
                    dispatch(listener_executor, job).await;
                }

                if cancel.is_cancelled() {
                    return;
                }

                if per_host_retries < plan.max_retry_per_host {
                    per_host_retries += 1;
                    continue;
                }

                per_host_retries = 0;
                if host_index < plan.hosts.len() - 1 {
                    host_index += 1;
                    continue;
                }

                if cycle == plan.max_retry_loop {
                    if cancel.is_cancelled() {
                        return;
                    }
                    dispatch_failed(
                        &listener,
                        listener_executor,
                        NtpError::SyncFailure("Failed to sync time.".to_string()),
                    )
                    .await;
                    return;
                }

                cycle += 1;
                host_index = 0;

                if !plan.delay_between_retry_loop.is_zero() {
                    {
                        let listener = listener.clone();
                        let delay = plan.delay_between_retry_loop;
                        let job: BoxFuture = Box::pin(async move {
                            listener.next_retry_loop_in(cycle, delay).await;
                        });
                        dispatch(listener_executor, job).await;
                    }
                    tokio::time::sleep(plan.delay_between_retry_loop).await;
                }
            }
        }
    }
}

/// One request/validate/compute attempt against a single host.
pub async fn attempt(
    plan: &RetryPlan,
    transport: &dyn NtpTransport,
    tick_source: &dyn TickSource,
    host: &str,
    port: u16,
) -> Result<crate::offset::TimeSample, NtpError> {
    let exchange = transport.fetch(host, port, plan.connection_timeout).await?;
    let parsed = codec::parse_response(&exchange.response_bytes)?;

    let timing = LocalTiming {
        request_wall_ms: exchange.request_wall_ms,
        request_ticks: exchange.request_ticks,
        response_ticks: exchange.response_ticks,
    };
    let now_wall_ms = exchange.request_wall_ms + (tick_source.now() - exchange.request_ticks);

    let validated = validator::validate(&parsed, timing, now_wall_ms, &plan.thresholds)?;
    Ok(compute_sample(&validated, parsed))
}

async fn dispatch_failed(
    listener: &Arc<dyn Listener>,
    listener_executor: Option<&dyn Executor>,
    error: NtpError,
) {
    warn!(error = %error, "sync retry budget exhausted");
    let listener = listener.clone();
    let job: BoxFuture = Box::pin(async move {
        listener.on_failed(error).await;
    });
    dispatch(listener_executor, job).await;
}
