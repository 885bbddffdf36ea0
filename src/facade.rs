//! The public surface: `SafeTime` and the cooperative `TaskHandle` it hands back (spec §4.7).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::debug;

use crate::cache::CacheRepository;
use crate::error::NtpError;
use crate::listener::{dispatch, BoxFuture, Executor, Listener, NoopListener};
use crate::offset::TimeSample;
use crate::options::Options;
use crate::retry::{self, CancelFlag, RetryPlan};
use crate::transport::{NtpTransport, UdpNtpTransport};
use crate::validator::ValidationThresholds;

/// A handle to a running (or finished) sync task. The only operations exposed are
/// `cancel` and `is_done`; scheduling details stay internal. Cloning the cancel flag
/// and completion marker (rather than the completion channel itself, which the facade
/// keeps privately to serialize the next `sync` against this one) lets this handle be
/// handed to the caller while the facade still tracks the task internally.
pub struct TaskHandle {
    cancel: CancelFlag,
    done: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Requests cancellation. Idempotent; safe to call from any task.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// The facade's private record of the task it most recently started, used to serialize
/// a new `sync` against a still-running one. `completion` resolves once the task's job
/// has run to completion, regardless of which `Executor` actually ran it — a detached
/// `tokio::spawn` or an inline synchronous test executor both signal it the same way.
struct RunningSync {
    cancel: CancelFlag,
    done: Arc<AtomicBool>,
    completion: oneshot::Receiver<()>,
}

impl RunningSync {
    fn handle(&self) -> TaskHandle {
        TaskHandle {
            cancel: self.cancel.clone(),
            done: self.done.clone(),
        }
    }

    async fn cancel_and_join(self) {
        self.cancel.cancel();
        let _ = self.completion.await;
    }
}

/// A trustworthy wall-clock facade: an NTP-backed offset cache with a host-rotating
/// retry controller behind it.
pub struct SafeTime {
    options: Arc<Options>,
    cache: CacheRepository,
    transport: Arc<dyn NtpTransport>,
    current_task: AsyncMutex<Option<RunningSync>>,
}

impl SafeTime {
    pub fn new(options: Options) -> Self {
        let options = Arc::new(options);
        let cache = CacheRepository::new(options.cache_store.clone());
        let transport: Arc<dyn NtpTransport> =
            Arc::new(UdpNtpTransport::new(options.tick_source.clone()));
        Self {
            options,
            cache,
            transport,
            current_task: AsyncMutex::new(None),
        }
    }

    /// Triggers a sync unconditionally, using the default listener from `Options`. If a
    /// previous sync task is still running it is cancelled and awaited first. Never
    /// fails synchronously — an empty host list or any transport/validation fault is
    /// reported to the listener's `on_failed` instead.
    pub async fn sync(&self) -> TaskHandle {
        self.sync_with(None).await
    }

    /// Same as [`Self::sync`] but with an explicit listener; `None` falls back to the
    /// default listener configured in `Options`. Cancelling a still-running previous
    /// task, awaiting its termination, and registering the new one all happen under a
    /// single `current_task` lock acquisition so no second concurrent caller can ever
    /// observe the slot empty and start a task of its own alongside this one.
    pub async fn sync_with(&self, listener: Option<Arc<dyn Listener>>) -> TaskHandle {
        let mut guard = self.current_task.lock().await;
        if let Some(previous) = guard.take() {
            debug!("cancelling prior sync task before starting a new one");
            previous.cancel_and_join().await;
        }

        let listener = listener
            .or_else(|| self.options.default_listener.clone())
            .unwrap_or_else(|| Arc::new(NoopListener));

        let plan = self.build_plan();
        let transport = self.transport.clone();
        let tick_source = self.options.tick_source.clone();
        let cache_store = self.options.cache_store.clone();
        let listener_executor = self.options.listener_executor.clone();
        let cancel = CancelFlag::new();
        let cancel_for_task = cancel.clone();
        let done = Arc::new(AtomicBool::new(false));
        let done_for_task = done.clone();
        let (completion_tx, completion_rx) = oneshot::channel();

        let job: BoxFuture = Box::pin(async move {
            let cache = CacheRepository::new(cache_store);
            retry::run(
                &plan,
                transport.as_ref(),
                tick_source.as_ref(),
                &cache,
                listener,
                listener_executor.as_deref(),
                &cancel_for_task,
            )
            .await;
            done_for_task.store(true, Ordering::SeqCst);
            let _ = completion_tx.send(());
        });
        self.options.sync_executor.spawn_detached(job);

        let running = RunningSync {
            cancel,
            done,
            completion: completion_rx,
        };
        let handle = running.handle();
        *guard = Some(running);
        handle
    }

    /// If the cache is valid, synchronously reports `on_successful` on `listener` (routed
    /// through the configured listener executor, if any) with the extrapolated sample —
    /// real stored offset included — and returns `None` (no task spawned, no network
    /// I/O). Otherwise starts a sync exactly like [`Self::sync_with`].
    pub async fn now_or_sync(&self, listener: Option<Arc<dyn Listener>>) -> Option<TaskHandle> {
        let current_ticks = self.options.tick_source.now();
        if let Some(sample) = self.cache.extrapolated_sample(current_ticks) {
            let listener = listener
                .or_else(|| self.options.default_listener.clone())
                .unwrap_or_else(|| Arc::new(NoopListener));
            let job: BoxFuture = Box::pin(async move {
                listener.on_successful(sample).await;
            });
            dispatch(self.options.listener_executor.as_deref(), job).await;
            return None;
        }
        Some(self.sync_with(listener).await)
    }

    /// Returns the extrapolated cached time, or `NoValidCache` if no sample is cached.
    pub fn now(&self) -> Result<i64, NtpError> {
        let current_ticks = self.options.tick_source.now();
        if !self.cache.has_valid_cache(current_ticks) {
            return Err(NtpError::NoValidCache);
        }
        self.cache.now(current_ticks).ok_or(NtpError::NoValidCache)
    }

    /// Returns the extrapolated cached time, or the value from `default_supplier` if
    /// there is none.
    pub fn now_or_else(&self, default_supplier: impl FnOnce() -> i64) -> i64 {
        self.now().unwrap_or_else(|_| default_supplier())
    }

    /// Returns the extrapolated cached time, or the raw system wall clock if there is
    /// no valid cache.
    pub fn now_or_default(&self) -> i64 {
        self.now_or_else(wall_now_ms)
    }

    /// Cancels the most recently started sync task, if any. Idempotent.
    pub async fn cancel(&self) {
        self.cancel_current().await;
    }

    /// A single-shot, uncached request/validate/compute round trip against `host`.
    pub async fn get_time(&self, host: &str, port: u16) -> Result<TimeSample, NtpError> {
        let plan = self.build_plan();
        retry::attempt(
            &plan,
            self.transport.as_ref(),
            self.options.tick_source.as_ref(),
            host,
            port,
        )
        .await
    }

    async fn cancel_current(&self) {
        let mut guard = self.current_task.lock().await;
        if let Some(previous) = guard.take() {
            debug!("cancelling prior sync task before starting a new one");
            previous.cancel_and_join().await;
        }
    }

    fn build_plan(&self) -> RetryPlan {
        RetryPlan {
            hosts: self.options.hosts.clone(),
            max_retry_per_host: self.options.max_retry_per_host,
            max_retry_loop: self.options.max_retry_loop,
            delay_between_retry_loop: self.options.delay_between_retry_loop,
            connection_timeout: self.options.connection_timeout,
            thresholds: ValidationThresholds {
                root_delay_max: self.options.root_delay_max,
                root_dispersion_max: self.options.root_dispersion_max,
                server_response_delay_max_ms: self.options.server_response_delay_max.as_millis()
                    as i64,
            },
        }
    }
}

fn wall_now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
