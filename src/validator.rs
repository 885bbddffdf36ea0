//! Defensive validation of a parsed NTP response (spec §4.3).

use tracing::debug;

use crate::codec::ParsedNtp;
use crate::error::{NtpError, RejectedField};
use crate::offset::ValidatedExchange;

/// The subset of [`crate::options::Options`] the validator needs. Kept separate from
/// `Options` so the validator can be unit-tested without constructing a full facade.
#[derive(Debug, Clone, Copy)]
pub struct ValidationThresholds {
    pub root_delay_max: i64,
    pub root_dispersion_max: i64,
    pub server_response_delay_max_ms: i64,
}

/// How long a request may sit unanswered before its echoed originate timestamp is
/// considered stale (spec §4.3 rule 7).
const MAX_REQUEST_AGE_MS: i64 = 10_000;

/// Local timing context captured by the transport around one request/response pair.
#[derive(Debug, Clone, Copy)]
pub struct LocalTiming {
    pub request_wall_ms: i64,
    pub request_ticks: i64,
    pub response_ticks: i64,
}

/// Validates a parsed response against the seven defensive rules, returning the
/// extracted exchange timestamps on success.
pub fn validate(
    parsed: &ParsedNtp,
    timing: LocalTiming,
    now_wall_ms: i64,
    thresholds: &ValidationThresholds,
) -> Result<ValidatedExchange, NtpError> {
    let root_delay = parsed.root_delay_raw as i64;
    if root_delay > thresholds.root_delay_max {
        return reject(
            RejectedField::RootDelay,
            root_delay,
            thresholds.root_delay_max,
        );
    }

    let root_dispersion = parsed.root_dispersion_raw as i64;
    if root_dispersion > thresholds.root_dispersion_max {
        return reject(
            RejectedField::RootDispersion,
            root_dispersion,
            thresholds.root_dispersion_max,
        );
    }

    if !(parsed.mode == 4 || parsed.mode == 5) {
        return reject(RejectedField::Mode, parsed.mode as i64, 4);
    }

    if !(1..=15).contains(&parsed.stratum) {
        return reject(RejectedField::Stratum, parsed.stratum as i64, 1);
    }

    if parsed.leap == 3 {
        return reject(RejectedField::LeapIndicator, 3, 2);
    }

    let t0 = parsed.originate_ms();
    let t1 = parsed.receive_ms();
    let t2 = parsed.transmit_ms();
    let t3 = timing.request_wall_ms + (timing.response_ticks - timing.request_ticks);

    let round_trip_skew = ((t3 - t0) - (t2 - t1)).abs();
    if round_trip_skew >= thresholds.server_response_delay_max_ms {
        return reject(
            RejectedField::ServerResponseDelay,
            round_trip_skew,
            thresholds.server_response_delay_max_ms,
        );
    }

    let request_age = (t0 - now_wall_ms).abs();
    if request_age >= MAX_REQUEST_AGE_MS {
        return reject(RejectedField::RequestAge, request_age, MAX_REQUEST_AGE_MS);
    }

    Ok(ValidatedExchange {
        t0_originate_ms: t0,
        t1_receive_ms: t1,
        t2_transmit_ms: t2,
        t3_destination_ms: t3,
        response_ticks: timing.response_ticks,
    })
}

fn reject(field: RejectedField, actual: i64, expected: i64) -> Result<ValidatedExchange, NtpError> {
    debug!(%field, actual, expected, "rejecting NTP response");
    Err(NtpError::UntrustedResponse {
        field,
        actual,
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Ntp64;

    fn base_thresholds() -> ValidationThresholds {
        ValidationThresholds {
            root_delay_max: 100,
            root_dispersion_max: 100,
            server_response_delay_max_ms: 1_000,
        }
    }

    fn base_timing(now_wall_ms: i64) -> LocalTiming {
        LocalTiming {
            request_wall_ms: now_wall_ms,
            request_ticks: 0,
            response_ticks: 10,
        }
    }

    fn valid_parsed(now_wall_ms: i64) -> ParsedNtp {
        ParsedNtp {
            leap: 0,
            version: 4,
            mode: 4,
            stratum: 2,
            poll: 6,
            precision: -20,
            root_delay_raw: 50,
            root_dispersion_raw: 50,
            ref_id: [0; 4],
            reference_ts: Ntp64::default(),
            originate_ts: Ntp64::from_unix_ms(now_wall_ms),
            receive_ts: Ntp64::from_unix_ms(now_wall_ms + 5),
            transmit_ts: Ntp64::from_unix_ms(now_wall_ms + 10),
        }
    }

    #[test]
    fn accepts_a_well_formed_response() {
        let now = 1_700_000_000_000;
        let parsed = valid_parsed(now);
        let result = validate(&parsed, base_timing(now), now, &base_thresholds());
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_root_delay_one_unit_over() {
        let now = 1_700_000_000_000;
        let mut parsed = valid_parsed(now);
        parsed.root_delay_raw = 101;
        let thresholds = base_thresholds();
        let err = validate(&parsed, base_timing(now), now, &thresholds).unwrap_err();
        assert!(matches!(
            err,
            NtpError::UntrustedResponse {
                field: RejectedField::RootDelay,
                ..
            }
        ));
    }

    #[test]
    fn root_delay_exactly_at_max_is_accepted() {
        let now = 1_700_000_000_000;
        let mut parsed = valid_parsed(now);
        parsed.root_delay_raw = 100;
        assert!(validate(&parsed, base_timing(now), now, &base_thresholds()).is_ok());
    }

    #[test]
    fn rejects_root_dispersion_one_unit_over() {
        let now = 1_700_000_000_000;
        let mut parsed = valid_parsed(now);
        parsed.root_dispersion_raw = 101;
        let err = validate(&parsed, base_timing(now), now, &base_thresholds()).unwrap_err();
        assert!(matches!(
            err,
            NtpError::UntrustedResponse {
                field: RejectedField::RootDispersion,
                ..
            }
        ));
    }

    #[test]
    fn rejects_bad_mode() {
        let now = 1_700_000_000_000;
        let mut parsed = valid_parsed(now);
        parsed.mode = 3;
        let err = validate(&parsed, base_timing(now), now, &base_thresholds()).unwrap_err();
        assert!(matches!(
            err,
            NtpError::UntrustedResponse {
                field: RejectedField::Mode,
                ..
            }
        ));
    }

    #[test]
    fn rejects_stratum_zero() {
        let now = 1_700_000_000_000;
        let mut parsed = valid_parsed(now);
        parsed.stratum = 0;
        let err = validate(&parsed, base_timing(now), now, &base_thresholds()).unwrap_err();
        assert!(matches!(
            err,
            NtpError::UntrustedResponse {
                field: RejectedField::Stratum,
                actual: 0,
                ..
            }
        ));
    }

    #[test]
    fn rejects_stratum_sixteen() {
        let now = 1_700_000_000_000;
        let mut parsed = valid_parsed(now);
        parsed.stratum = 16;
        let err = validate(&parsed, base_timing(now), now, &base_thresholds()).unwrap_err();
        assert!(matches!(
            err,
            NtpError::UntrustedResponse {
                field: RejectedField::Stratum,
                ..
            }
        ));
    }

    #[test]
    fn rejects_leap_indicator_alarm() {
        let now = 1_700_000_000_000;
        let mut parsed = valid_parsed(now);
        parsed.leap = 3;
        let err = validate(&parsed, base_timing(now), now, &base_thresholds()).unwrap_err();
        assert!(matches!(
            err,
            NtpError::UntrustedResponse {
                field: RejectedField::LeapIndicator,
                ..
            }
        ));
    }

    #[test]
    fn rejects_excessive_round_trip_skew() {
        let now = 1_700_000_000_000;
        let mut parsed = valid_parsed(now);
        // t2 - t1 should be close to t3 - t0; blow it up.
        parsed.transmit_ts = Ntp64::from_unix_ms(now + 10_000);
        let err = validate(&parsed, base_timing(now), now, &base_thresholds()).unwrap_err();
        assert!(matches!(
            err,
            NtpError::UntrustedResponse {
                field: RejectedField::ServerResponseDelay,
                ..
            }
        ));
    }

    #[test]
    fn rejects_stale_request() {
        let now = 1_700_000_000_000;
        // Response claims to answer a request sent 10s before "now".
        let parsed = valid_parsed(now - 10_000);
        let timing = LocalTiming {
            request_wall_ms: now - 10_000,
            request_ticks: 0,
            response_ticks: 10,
        };
        let err = validate(&parsed, timing, now, &base_thresholds()).unwrap_err();
        assert!(matches!(
            err,
            NtpError::UntrustedResponse {
                field: RejectedField::RequestAge,
                ..
            }
        ));
    }
}
