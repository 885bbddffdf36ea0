//! The immutable `Options` record and its builder (spec §3, §4.7).

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStore, InMemoryCacheStore};
use crate::listener::{default_executor, Executor, Listener};
use crate::tick::{default_tick_source, TickSource};

/// Default NTP port.
pub const DEFAULT_NTP_PORT: u16 = 123;

/// Immutable configuration shared by every sync the facade performs.
pub struct Options {
    pub sync_executor: Arc<dyn Executor>,
    pub listener_executor: Option<Arc<dyn Executor>>,
    pub default_listener: Option<Arc<dyn Listener>>,
    pub cache_store: Arc<dyn CacheStore>,
    pub tick_source: Arc<dyn TickSource>,
    pub connection_timeout: Duration,
    pub hosts: Vec<(String, u16)>,
    pub max_retry_per_host: u32,
    pub max_retry_loop: u32,
    pub delay_between_retry_loop: Duration,
    pub root_delay_max: i64,
    pub root_dispersion_max: i64,
    pub server_response_delay_max: Duration,
}

impl Options {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }
}

/// An error raised at `build()` for the handful of invariants that can be checked
/// without a host list (the host list is checked at `sync`/`get_time` time instead, so
/// a builder can be shared before the embedding application finishes discovering hosts).
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("root_delay_max must be >= 1, got {0}")]
    RootDelayMaxTooLow(i64),
    #[error("root_dispersion_max must be >= 1, got {0}")]
    RootDispersionMaxTooLow(i64),
}

pub struct OptionsBuilder {
    sync_executor: Option<Arc<dyn Executor>>,
    listener_executor: Option<Arc<dyn Executor>>,
    default_listener: Option<Arc<dyn Listener>>,
    cache_store: Option<Arc<dyn CacheStore>>,
    tick_source: Option<Arc<dyn TickSource>>,
    connection_timeout: Duration,
    hosts: Vec<(String, u16)>,
    max_retry_per_host: u32,
    max_retry_loop: u32,
    delay_between_retry_loop: Duration,
    root_delay_max: i64,
    root_dispersion_max: i64,
    server_response_delay_max: Duration,
}

impl Default for OptionsBuilder {
    fn default() -> Self {
        Self {
            sync_executor: None,
            listener_executor: None,
            default_listener: None,
            cache_store: None,
            tick_source: None,
            connection_timeout: Duration::from_secs(5),
            hosts: Vec::new(),
            max_retry_per_host: 0,
            max_retry_loop: 0,
            delay_between_retry_loop: Duration::ZERO,
            root_delay_max: 100,
            root_dispersion_max: 100,
            server_response_delay_max: Duration::from_millis(1_500),
        }
    }
}

impl OptionsBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.hosts.push((host.into(), DEFAULT_NTP_PORT));
        self
    }

    pub fn host_with_port(mut self, host: impl Into<String>, port: u16) -> Self {
        self.hosts.push((host.into(), port));
        self
    }

    pub fn hosts(mut self, hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for host in hosts {
            self = self.host(host);
        }
        self
    }

    pub fn sync_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.sync_executor = Some(executor);
        self
    }

    pub fn listener_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.listener_executor = Some(executor);
        self
    }

    pub fn default_listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.default_listener = Some(listener);
        self
    }

    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn tick_source(mut self, source: Arc<dyn TickSource>) -> Self {
        self.tick_source = Some(source);
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn max_retry_per_host(mut self, max: u32) -> Self {
        self.max_retry_per_host = max;
        self
    }

    pub fn max_retry_loop(mut self, max: u32) -> Self {
        self.max_retry_loop = max;
        self
    }

    pub fn delay_between_retry_loop(mut self, delay: Duration) -> Self {
        self.delay_between_retry_loop = delay;
        self
    }

    pub fn root_delay_max(mut self, max: i64) -> Self {
        self.root_delay_max = max;
        self
    }

    pub fn root_dispersion_max(mut self, max: i64) -> Self {
        self.root_dispersion_max = max;
        self
    }

    pub fn server_response_delay_max(mut self, max: Duration) -> Self {
        self.server_response_delay_max = max;
        self
    }

    pub fn build(self) -> Result<Options, BuilderError> {
        if self.root_delay_max < 1 {
            return Err(BuilderError::RootDelayMaxTooLow(self.root_delay_max));
        }
        if self.root_dispersion_max < 1 {
            return Err(BuilderError::RootDispersionMaxTooLow(self.root_dispersion_max));
        }

        Ok(Options {
            sync_executor: self.sync_executor.unwrap_or_else(default_executor),
            listener_executor: self.listener_executor,
            default_listener: self.default_listener,
            cache_store: self
                .cache_store
                .unwrap_or_else(|| Arc::new(InMemoryCacheStore::new())),
            tick_source: self.tick_source.unwrap_or_else(default_tick_source),
            connection_timeout: self.connection_timeout,
            hosts: self.hosts,
            max_retry_per_host: self.max_retry_per_host,
            max_retry_loop: self.max_retry_loop,
            delay_between_retry_loop: self.delay_between_retry_loop,
            root_delay_max: self.root_delay_max,
            root_dispersion_max: self.root_dispersion_max,
            server_response_delay_max: self.server_response_delay_max,
        })
    }
}
