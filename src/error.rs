//! Error types shared across the crate.

use thiserror::Error;

/// Names which defensive rule in [`crate::validator`] rejected a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectedField {
    RootDelay,
    RootDispersion,
    Mode,
    Stratum,
    LeapIndicator,
    ServerResponseDelay,
    RequestAge,
}

impl std::fmt::Display for RejectedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RootDelay => "root_delay",
            Self::RootDispersion => "root_dispersion",
            Self::Mode => "mode",
            Self::Stratum => "stratum",
            Self::LeapIndicator => "leap_indicator",
            Self::ServerResponseDelay => "server_response_delay",
            Self::RequestAge => "request_age",
        };
        f.write_str(name)
    }
}

/// Error taxonomy for the NTP client and the `SafeTime` facade.
#[derive(Debug, Error)]
pub enum NtpError {
    /// DNS resolution of a configured host failed.
    #[error("could not resolve host: {0}")]
    UnresolvedHost(String),

    /// Socket send/receive failure.
    #[error("I/O error talking to NTP server: {0}")]
    Io(#[from] std::io::Error),

    /// The transport timed out waiting for a response.
    #[error("timed out waiting for NTP response")]
    Timeout,

    /// The runtime denied network access.
    #[error("network access denied: {0}")]
    Security(String),

    /// The response was shorter than 48 bytes or otherwise unparsable.
    #[error("malformed NTP response: {0}")]
    MalformedResponse(String),

    /// A parsed response failed one of the defensive validation rules.
    #[error("untrusted NTP response: {field} was {actual}, expected {expected}")]
    UntrustedResponse {
        field: RejectedField,
        actual: i64,
        expected: i64,
    },

    /// `now()` was called with no valid cached sample.
    #[error("no valid cached time sample")]
    NoValidCache,

    /// The retry budget was exhausted without a usable response.
    #[error("{0}")]
    SyncFailure(String),

    /// The sync task was cancelled. Never surfaced to listeners.
    #[error("sync cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, NtpError>;
