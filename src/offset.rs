//! NTP four-timestamp clock-offset arithmetic.

use crate::codec::ParsedNtp;

/// A validated (offset, corrected-wall-ms-at-reception, tick-reading-at-reception)
/// triple produced by a successful sync.
#[derive(Debug, Clone)]
pub struct TimeSample {
    /// Signed offset in milliseconds; positive means the local clock is behind the
    /// server.
    pub offset_ms: i64,
    /// Wall-clock reading at the moment of reception, corrected by `offset_ms`.
    pub corrected_ms_at_response: i64,
    /// `TickSource` reading captured at the moment of reception.
    pub response_ticks: i64,
    /// The parsed response this sample was derived from. Absent when a sample is
    /// reconstructed from a persisted [`crate::cache::CacheRecord`].
    pub raw: Option<ParsedNtp>,
}

/// The four NTP exchange timestamps, already converted to milliseconds since the Unix
/// epoch, plus the local tick pair needed to reconstruct `t3` without trusting the
/// wall clock to hold still mid-exchange.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedExchange {
    pub t0_originate_ms: i64,
    pub t1_receive_ms: i64,
    pub t2_transmit_ms: i64,
    pub t3_destination_ms: i64,
    pub response_ticks: i64,
}

/// Applies the standard NTP offset formula: `offset = ((t1-t0)+(t2-t3))/2`,
/// `corrected = t3 + offset`.
pub fn compute_sample(exchange: &ValidatedExchange, raw: ParsedNtp) -> TimeSample {
    let offset_ms =
        ((exchange.t1_receive_ms - exchange.t0_originate_ms) + (exchange.t2_transmit_ms - exchange.t3_destination_ms)) / 2;
    let corrected_ms_at_response = exchange.t3_destination_ms + offset_ms;

    TimeSample {
        offset_ms,
        corrected_ms_at_response,
        response_ticks: exchange.response_ticks,
        raw: Some(raw),
    }
}
