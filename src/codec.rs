//! Wire format for the NTP client-mode (mode 3 request / mode 4 response) exchange.
//!
//! Pure byte <-> struct conversion, no I/O. Layout follows RFC 5905 / RFC 1305.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

use crate::error::NtpError;

/// Size of an NTP packet on the wire.
pub const MESSAGE_LENGTH: usize = 48;

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
const NTP_UNIX_EPOCH_DELTA: i64 = 2_208_988_800;

/// A raw 64-bit NTP timestamp: seconds since 1900-01-01 UTC, plus a fractional part in
/// units of 2^-32 seconds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Ntp64 {
    pub seconds: u32,
    pub fraction: u32,
}

impl Ntp64 {
    /// Build an `Ntp64` representing the given Unix-epoch milliseconds.
    pub fn from_unix_ms(unix_ms: i64) -> Self {
        let total_seconds = unix_ms.div_euclid(1000);
        let remainder_ms = unix_ms.rem_euclid(1000);
        let seconds = (total_seconds + NTP_UNIX_EPOCH_DELTA) as u32;
        let fraction = (((remainder_ms as u64) << 32) / 1000) as u32;
        Self { seconds, fraction }
    }

    /// Convert to milliseconds since the Unix epoch. An all-zero timestamp ("unset")
    /// yields `0`, matching the wire convention used by NTP servers for unfilled fields.
    pub fn to_unix_ms(self) -> i64 {
        if self.seconds == 0 && self.fraction == 0 {
            return 0;
        }
        let seconds = self.seconds as i64 - NTP_UNIX_EPOCH_DELTA;
        let frac_ms = ((self.fraction as i64) * 1000) >> 32;
        seconds * 1000 + frac_ms
    }

    fn read(input: &mut &[u8]) -> std::io::Result<Self> {
        let seconds = input.read_u32::<BigEndian>()?;
        let fraction = input.read_u32::<BigEndian>()?;
        Ok(Self { seconds, fraction })
    }

    fn write(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.seconds.to_be_bytes());
        out.extend_from_slice(&self.fraction.to_be_bytes());
    }
}

/// A parsed mode-4 (server) response.
#[derive(Debug, Clone, Copy)]
pub struct ParsedNtp {
    pub leap: u8,
    pub version: u8,
    pub mode: u8,
    pub stratum: u8,
    pub poll: i8,
    pub precision: i8,
    /// Raw RFC-1305 s15.16 fixed-point integer, as it appears on the wire.
    pub root_delay_raw: i32,
    /// Raw RFC-1305 u16.16 fixed-point integer, as it appears on the wire.
    pub root_dispersion_raw: u32,
    pub ref_id: [u8; 4],
    pub reference_ts: Ntp64,
    pub originate_ts: Ntp64,
    pub receive_ts: Ntp64,
    pub transmit_ts: Ntp64,
}

impl ParsedNtp {
    pub fn root_delay_seconds(&self) -> f64 {
        self.root_delay_raw as f64 / 65536.0
    }

    pub fn root_dispersion_seconds(&self) -> f64 {
        self.root_dispersion_raw as f64 / 65536.0
    }

    pub fn reference_ms(&self) -> i64 {
        self.reference_ts.to_unix_ms()
    }

    pub fn originate_ms(&self) -> i64 {
        self.originate_ts.to_unix_ms()
    }

    pub fn receive_ms(&self) -> i64 {
        self.receive_ts.to_unix_ms()
    }

    pub fn transmit_ms(&self) -> i64 {
        self.transmit_ts.to_unix_ms()
    }
}

/// Builds a client-mode (mode 3) request, stamping the transmit timestamp with the
/// given wall-clock reading so the validator can later check response freshness
/// against the echoed originate timestamp.
pub fn build_request(request_wall_ms: i64) -> [u8; MESSAGE_LENGTH] {
    const LI_UNKNOWN: u8 = 0;
    const VERSION: u8 = 3;
    const MODE_CLIENT: u8 = 3;

    let mut data = Vec::with_capacity(MESSAGE_LENGTH);
    data.push((LI_UNKNOWN << 6) | (VERSION << 3) | MODE_CLIENT);
    data.push(0); // stratum
    data.push(0); // poll
    data.push(0); // precision
    data.extend_from_slice(&0i32.to_be_bytes()); // root delay
    data.extend_from_slice(&0u32.to_be_bytes()); // root dispersion
    data.extend_from_slice(&0u32.to_be_bytes()); // reference id
    Ntp64::default().write(&mut data); // reference timestamp
    Ntp64::default().write(&mut data); // originate timestamp
    Ntp64::default().write(&mut data); // receive timestamp
    Ntp64::from_unix_ms(request_wall_ms).write(&mut data); // transmit timestamp

    debug_assert_eq!(data.len(), MESSAGE_LENGTH);
    let mut buf = [0u8; MESSAGE_LENGTH];
    buf.copy_from_slice(&data);
    buf
}

/// Parses a response buffer into a [`ParsedNtp`]. Fails with [`NtpError::MalformedResponse`]
/// if shorter than 48 bytes.
pub fn parse_response(input: &[u8]) -> Result<ParsedNtp, NtpError> {
    if input.len() < MESSAGE_LENGTH {
        return Err(NtpError::MalformedResponse(format!(
            "response too short: {} bytes (need {})",
            input.len(),
            MESSAGE_LENGTH
        )));
    }

    let mut cursor = input;
    let parse = || -> std::io::Result<ParsedNtp> {
        let li_vn_mode = cursor.read_u8()?;
        let leap = (li_vn_mode >> 6) & 0b11;
        let version = (li_vn_mode >> 3) & 0b111;
        let mode = li_vn_mode & 0b111;
        let stratum = cursor.read_u8()?;
        let poll = cursor.read_i8()?;
        let precision = cursor.read_i8()?;
        let root_delay_raw = cursor.read_i32::<BigEndian>()?;
        let root_dispersion_raw = cursor.read_u32::<BigEndian>()?;
        let mut ref_id = [0u8; 4];
        cursor.read_exact(&mut ref_id)?;
        let reference_ts = Ntp64::read(&mut cursor)?;
        let originate_ts = Ntp64::read(&mut cursor)?;
        let receive_ts = Ntp64::read(&mut cursor)?;
        let transmit_ts = Ntp64::read(&mut cursor)?;

        Ok(ParsedNtp {
            leap,
            version,
            mode,
            stratum,
            poll,
            precision,
            root_delay_raw,
            root_dispersion_raw,
            ref_id,
            reference_ts,
            originate_ts,
            receive_ts,
            transmit_ts,
        })
    };

    parse().map_err(|e| NtpError::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntp64_unix_ms_roundtrip() {
        let ts = Ntp64::from_unix_ms(1_700_000_123);
        assert_eq!(ts.to_unix_ms(), 1_700_000_123);
    }

    #[test]
    fn ntp64_zero_is_unset() {
        assert_eq!(Ntp64::default().to_unix_ms(), 0);
    }

    #[test]
    fn build_request_has_mode_3_and_version_3() {
        let req = build_request(1_700_000_000_000);
        assert_eq!(req.len(), MESSAGE_LENGTH);
        assert_eq!(req[0] & 0b111, 3, "mode must be client (3)");
        assert_eq!((req[0] >> 3) & 0b111, 3, "version must be 3");
        assert_eq!((req[0] >> 6) & 0b11, 0, "leap indicator must be unknown (0)");
    }

    #[test]
    fn build_request_stamps_transmit_timestamp() {
        let req = build_request(1_700_000_000_123);
        let transmit = &req[40..48];
        let mut cursor = transmit;
        let parsed = Ntp64::read(&mut cursor).unwrap();
        assert_eq!(parsed.to_unix_ms(), 1_700_000_000_123);
    }

    #[test]
    fn parse_response_rejects_short_buffer() {
        let err = parse_response(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, NtpError::MalformedResponse(_)));
    }

    fn server_response_fixture() -> [u8; MESSAGE_LENGTH] {
        let mut data = Vec::with_capacity(MESSAGE_LENGTH);
        data.push((0 << 6) | (4 << 3) | 4); // LI=0 VN=4 mode=4 (server)
        data.push(2); // stratum
        data.push(6); // poll
        data.push((-20i8) as u8); // precision
        data.extend_from_slice(&0i32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(b"GOOG");
        Ntp64::default().write(&mut data); // reference
        Ntp64::from_unix_ms(1_000_000).write(&mut data); // originate (t0)
        Ntp64::from_unix_ms(1_000_050).write(&mut data); // receive (t1)
        Ntp64::from_unix_ms(1_000_060).write(&mut data); // transmit (t2)
        let mut buf = [0u8; MESSAGE_LENGTH];
        buf.copy_from_slice(&data);
        buf
    }

    #[test]
    fn parse_response_extracts_fields() {
        let parsed = parse_response(&server_response_fixture()).unwrap();
        assert_eq!(parsed.mode, 4);
        assert_eq!(parsed.stratum, 2);
        assert_eq!(parsed.originate_ms(), 1_000_000);
        assert_eq!(parsed.receive_ms(), 1_000_050);
        assert_eq!(parsed.transmit_ms(), 1_000_060);
        assert_eq!(&parsed.ref_id, b"GOOG");
    }
}
