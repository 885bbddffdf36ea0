//! Sends one request to one resolved host/port over UDP with a bounded timeout (spec §4.2).
//!
//! No retries, no validation: a single attempt, and the raw bytes plus the local tick
//! pair the validator needs to reconstruct the round trip.

use std::time::Duration;

use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

use crate::codec::{self, MESSAGE_LENGTH};
use crate::error::NtpError;
use crate::tick::TickSource;

/// What one request/response round trip produced, before parsing or validation.
#[derive(Debug, Clone)]
pub struct RawExchange {
    pub response_bytes: [u8; MESSAGE_LENGTH],
    pub request_wall_ms: i64,
    pub request_ticks: i64,
    pub response_ticks: i64,
}

/// Abstracts the network exchange so the retry controller can be driven by a fake
/// transport in tests.
#[async_trait::async_trait]
pub trait NtpTransport: Send + Sync {
    async fn fetch(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<RawExchange, NtpError>;
}

/// The production transport: real DNS resolution and a real UDP socket.
pub struct UdpNtpTransport {
    tick_source: std::sync::Arc<dyn TickSource>,
}

impl UdpNtpTransport {
    pub fn new(tick_source: std::sync::Arc<dyn TickSource>) -> Self {
        Self { tick_source }
    }
}

fn wall_now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait::async_trait]
impl NtpTransport for UdpNtpTransport {
    async fn fetch(
        &self,
        host: &str,
        port: u16,
        request_timeout: Duration,
    ) -> Result<RawExchange, NtpError> {
        let addr = lookup_host((host, port))
            .await
            .map_err(|_| NtpError::UnresolvedHost(host.to_string()))?
            .next()
            .ok_or_else(|| NtpError::UnresolvedHost(host.to_string()))?;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;

        let request_wall_ms = wall_now_ms();
        let request_ticks = self.tick_source.now();

        let request = codec::build_request(request_wall_ms);

        timeout(request_timeout, socket.send(&request))
            .await
            .map_err(|_| NtpError::Timeout)??;

        let mut buf = [0u8; MESSAGE_LENGTH];
        let received = timeout(request_timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| NtpError::Timeout)??;

        let response_ticks = self.tick_source.now();

        if received < MESSAGE_LENGTH {
            return Err(NtpError::MalformedResponse(format!(
                "received {received} bytes, need {MESSAGE_LENGTH}"
            )));
        }

        Ok(RawExchange {
            response_bytes: buf,
            request_wall_ms,
            request_ticks,
            response_ticks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick::MonotonicTickSource;

    /// Exercises DNS-resolution failure only; a live UDP round trip would require
    /// network access this test suite deliberately avoids. In a sandbox with no DNS
    /// resolver at all, the lookup itself may surface as an I/O error rather than a
    /// clean "not found" - either is an acceptable failure mode here.
    #[tokio::test]
    async fn unresolvable_host_yields_an_error() {
        let transport = UdpNtpTransport::new(std::sync::Arc::new(MonotonicTickSource::new()));
        let err = transport
            .fetch(
                "this-host-name-does-not-resolve.invalid",
                123,
                Duration::from_millis(200),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NtpError::UnresolvedHost(_) | NtpError::Io(_)));
    }
}
