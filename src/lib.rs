//! A trustworthy wall-clock facade backed by NTP.
//!
//! [`SafeTime`] queries one or more NTP servers, validates each response against a set
//! of defensive sanity rules, and caches the resulting clock offset so that repeated
//! calls to [`SafeTime::now`] are O(1) and need no network access. The [`retry`]
//! module's controller rotates across the configured host list with bounded per-host
//! and per-cycle retries.

pub mod cache;
pub mod codec;
pub mod error;
pub mod facade;
pub mod listener;
pub mod offset;
pub mod options;
pub mod retry;
pub mod tick;
pub mod transport;
pub mod validator;

pub use cache::{CacheRecord, CacheRepository, CacheStore, InMemoryCacheStore, JsonFileCacheStore};
pub use codec::{ParsedNtp, MESSAGE_LENGTH};
pub use error::{NtpError, RejectedField, Result};
pub use facade::{SafeTime, TaskHandle};
pub use listener::{Executor, Listener, NoopListener, TokioExecutor};
pub use offset::{TimeSample, ValidatedExchange};
pub use options::{BuilderError, Options, OptionsBuilder, DEFAULT_NTP_PORT};
pub use tick::{MonotonicTickSource, TickSource};
pub use transport::{NtpTransport, RawExchange, UdpNtpTransport};
pub use validator::ValidationThresholds;
