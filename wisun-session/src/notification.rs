//! Asynchronous notifications printed by the module
//!
//! Two kinds matter here: `EVENT` lines (numbered status events) and
//! `ERXUDP` lines (an inbound UDP datagram).

use crate::{WisunError, WisunResult};
use bytes::Bytes;
use wisun_transport::Line;

/// Which variant of the SK command set the module speaks
///
/// The dual-stack edition adds a "side" field (B-route or HAN) to datagram
/// commands and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    #[default]
    Standard,
    DualStack,
}

impl SendMode {
    /// Side argument for `SKSENDTO` (0 = B-route)
    pub fn side(&self) -> Option<u8> {
        match self {
            SendMode::Standard => None,
            SendMode::DualStack => Some(0),
        }
    }

    /// Token count of an `ERXUDP` line without the optional RSSI field
    fn datagram_tokens(&self) -> usize {
        match self {
            SendMode::Standard => 9,
            SendMode::DualStack => 10,
        }
    }
}

/// Event numbers reported in `EVENT` lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NeighborSolicitation,
    NeighborAdvertisement,
    EchoRequest,
    EnergyScanDone,
    BeaconReceived,
    /// Result of a `SKSENDTO`; the parameter carries the status
    UdpSendDone,
    ActiveScanDone,
    /// PANA authentication failed at the link layer; the module may retry
    PanaFailed,
    PanaCompleted,
    SessionEndRequested,
    SessionEnded,
    SessionEndTimeout,
    SessionExpired,
    TransmitLimited,
    TransmitLimitReleased,
    Other(u8),
}

impl EventKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => EventKind::NeighborSolicitation,
            0x02 => EventKind::NeighborAdvertisement,
            0x05 => EventKind::EchoRequest,
            0x1F => EventKind::EnergyScanDone,
            0x20 => EventKind::BeaconReceived,
            0x21 => EventKind::UdpSendDone,
            0x22 => EventKind::ActiveScanDone,
            0x24 => EventKind::PanaFailed,
            0x25 => EventKind::PanaCompleted,
            0x26 => EventKind::SessionEndRequested,
            0x27 => EventKind::SessionEnded,
            0x28 => EventKind::SessionEndTimeout,
            0x29 => EventKind::SessionExpired,
            0x32 => EventKind::TransmitLimited,
            0x33 => EventKind::TransmitLimitReleased,
            other => EventKind::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            EventKind::NeighborSolicitation => 0x01,
            EventKind::NeighborAdvertisement => 0x02,
            EventKind::EchoRequest => 0x05,
            EventKind::EnergyScanDone => 0x1F,
            EventKind::BeaconReceived => 0x20,
            EventKind::UdpSendDone => 0x21,
            EventKind::ActiveScanDone => 0x22,
            EventKind::PanaFailed => 0x24,
            EventKind::PanaCompleted => 0x25,
            EventKind::SessionEndRequested => 0x26,
            EventKind::SessionEnded => 0x27,
            EventKind::SessionEndTimeout => 0x28,
            EventKind::SessionExpired => 0x29,
            EventKind::TransmitLimited => 0x32,
            EventKind::TransmitLimitReleased => 0x33,
            EventKind::Other(code) => *code,
        }
    }
}

/// A parsed `EVENT <num> <sender> [...] [<param>]` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: EventKind,
    sender: String,
    param: Option<u8>,
}

impl Event {
    /// Parse `line`; returns `None` for anything that is not a well-formed event
    pub fn parse(line: &Line) -> Option<Self> {
        if !line.starts_with("EVENT ") {
            return None;
        }
        let text = line.to_text();
        let tokens: Vec<&str> = text.split(' ').collect();
        if tokens.len() < 3 {
            return None;
        }
        let code = u8::from_str_radix(tokens[1], 16).ok()?;
        let param = if tokens.len() >= 4 {
            u8::from_str_radix(tokens[tokens.len() - 1], 16).ok()
        } else {
            None
        };
        Some(Self {
            kind: EventKind::from_code(code),
            sender: tokens[2].to_string(),
            param,
        })
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Trailing parameter, e.g. the send status of `EVENT 21`
    pub fn param(&self) -> Option<u8> {
        self.param
    }
}

/// How the payload of an `ERXUDP` line was encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// Raw bytes (WOPT 0)
    Binary,
    /// Hex ASCII (WOPT 1)
    Hex,
}

/// An inbound UDP datagram reported by an `ERXUDP` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub sender: String,
    pub destination: String,
    pub remote_port: u16,
    pub local_port: u16,
    pub sender_lla: String,
    pub payload: Bytes,
    pub encoding: PayloadEncoding,
}

impl Datagram {
    /// Parse an `ERXUDP` line
    ///
    /// Returns `Ok(None)` for lines of any other kind. The layout is
    ///
    /// ```text
    /// ERXUDP SENDER DEST RPORT LPORT SENDERLLA [RSSI] SECURED [SIDE] DATALEN DATA
    /// ```
    ///
    /// where SIDE exists only in the dual-stack edition and RSSI only when the
    /// module is configured to report it. DATA is raw when its length equals
    /// DATALEN and hex ASCII when it is twice DATALEN.
    pub fn parse(line: &Line, mode: SendMode) -> WisunResult<Option<Self>> {
        if !line.starts_with("ERXUDP ") {
            return Ok(None);
        }

        let n = mode.datagram_tokens();
        let tokens: Vec<&[u8]> = line.as_bytes().splitn(n, |&b| b == b' ').collect();
        if tokens.len() < n {
            return Err(malformed("unknown ERXUDP format", line));
        }

        let mut declared = hex_number(tokens[n - 2], line)?;
        let mut data = tokens[n - 1];
        if !length_matches(data, declared) {
            // RSSI shifted the fields by one: DATA still holds "DATALEN DATA"
            let mut rest = data.splitn(2, |&b| b == b' ');
            let (Some(length), Some(remainder)) = (rest.next(), rest.next()) else {
                return Err(malformed("ERXUDP data length mismatch", line));
            };
            declared = hex_number(length, line)?;
            data = remainder;
            if !length_matches(data, declared) {
                return Err(malformed("ERXUDP data length mismatch", line));
            }
        }

        let (payload, encoding) = if data.len() == declared {
            (Bytes::copy_from_slice(data), PayloadEncoding::Binary)
        } else {
            let decoded = hex::decode(data)
                .map_err(|_| malformed("ERXUDP payload is not hexadecimal", line))?;
            (Bytes::from(decoded), PayloadEncoding::Hex)
        };

        Ok(Some(Self {
            sender: String::from_utf8_lossy(tokens[1]).into_owned(),
            destination: String::from_utf8_lossy(tokens[2]).into_owned(),
            remote_port: port(tokens[3], line)?,
            local_port: port(tokens[4], line)?,
            sender_lla: String::from_utf8_lossy(tokens[5]).into_owned(),
            payload,
            encoding,
        }))
    }
}

fn length_matches(data: &[u8], declared: usize) -> bool {
    data.len() == declared || declared.checked_mul(2) == Some(data.len())
}

fn hex_number(token: &[u8], line: &Line) -> WisunResult<usize> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| usize::from_str_radix(s, 16).ok())
        .ok_or_else(|| malformed("ERXUDP field is not a number", line))
}

fn port(token: &[u8], line: &Line) -> WisunResult<u16> {
    u16::try_from(hex_number(token, line)?).map_err(|_| malformed("ERXUDP port out of range", line))
}

fn malformed(reason: &str, line: &Line) -> WisunError {
    WisunError::InvalidData(format!("{}: {}", reason, line))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENDER: &str = "FE80:0000:0000:0000:021D:1290:1234:5678";
    const DEST: &str = "FE80:0000:0000:0000:021D:1290:0003:C890";

    fn erxudp(middle: &str, data: &[u8]) -> Line {
        let mut raw = format!("ERXUDP {} {} 0E1A 0E1A 001D129012345678 {}", SENDER, DEST, middle)
            .into_bytes();
        raw.extend_from_slice(data);
        Line::new(raw)
    }

    #[test]
    fn test_event_parse() {
        let event = Event::parse(&Line::from(format!("EVENT 25 {}", SENDER).as_str())).unwrap();
        assert_eq!(event.kind(), EventKind::PanaCompleted);
        assert_eq!(event.sender(), SENDER);
        assert_eq!(event.param(), None);

        let event = Event::parse(&Line::from(format!("EVENT 21 {} 02", SENDER).as_str())).unwrap();
        assert_eq!(event.kind(), EventKind::UdpSendDone);
        assert_eq!(event.param(), Some(0x02));

        let event = Event::parse(&Line::from(format!("EVENT 21 {} 0 00", SENDER).as_str())).unwrap();
        assert_eq!(event.param(), Some(0x00));
    }

    #[test]
    fn test_event_parse_rejects_other_lines() {
        assert_eq!(Event::parse(&Line::from("OK")), None);
        assert_eq!(Event::parse(&Line::from("EVENT")), None);
        assert_eq!(Event::parse(&Line::from("EVENT XY FE80")), None);
        assert_eq!(
            Event::parse(&Line::from("EVENT 7A FE80")).map(|e| e.kind()),
            Some(EventKind::Other(0x7A))
        );
    }

    #[test]
    fn test_event_kind_codes_round_trip() {
        for code in [0x01, 0x02, 0x21, 0x24, 0x25, 0x29, 0x33, 0x40] {
            assert_eq!(EventKind::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_datagram_hex_payload() {
        let line = erxudp("1 0012 ", b"1081000102880105FF017201E80400140064");
        let datagram = Datagram::parse(&line, SendMode::Standard).unwrap().unwrap();
        assert_eq!(datagram.encoding, PayloadEncoding::Hex);
        assert_eq!(datagram.sender, SENDER);
        assert_eq!(datagram.destination, DEST);
        assert_eq!(datagram.remote_port, 3610);
        assert_eq!(datagram.local_port, 3610);
        assert_eq!(datagram.sender_lla, "001D129012345678");
        assert_eq!(
            hex::encode_upper(&datagram.payload),
            "1081000102880105FF017201E80400140064"
        );
    }

    #[test]
    fn test_datagram_binary_payload_with_spaces() {
        let data = [0x10, 0x81, b' ', 0x01, 0x02, 0x88];
        let line = erxudp("1 0006 ", &data);
        let datagram = Datagram::parse(&line, SendMode::Standard).unwrap().unwrap();
        assert_eq!(datagram.encoding, PayloadEncoding::Binary);
        assert_eq!(datagram.payload.as_ref(), &data);
    }

    #[test]
    fn test_datagram_with_rssi_field() {
        let line = erxudp("FFB4 1 0004 ", b"10810001");
        let datagram = Datagram::parse(&line, SendMode::Standard).unwrap().unwrap();
        assert_eq!(datagram.payload.as_ref(), &[0x10, 0x81, 0x00, 0x01]);
    }

    #[test]
    fn test_datagram_dual_stack() {
        let line = erxudp("1 0 0004 ", b"10810001");
        let datagram = Datagram::parse(&line, SendMode::DualStack).unwrap().unwrap();
        assert_eq!(datagram.payload.as_ref(), &[0x10, 0x81, 0x00, 0x01]);

        let line = erxudp("FFB4 1 0 0004 ", b"10810001");
        let datagram = Datagram::parse(&line, SendMode::DualStack).unwrap().unwrap();
        assert_eq!(datagram.encoding, PayloadEncoding::Hex);
    }

    #[test]
    fn test_datagram_malformed() {
        // Too few tokens
        let line = Line::from("ERXUDP FE80 FE80 0E1A");
        assert!(Datagram::parse(&line, SendMode::Standard).is_err());
        // Length that matches neither encoding
        let line = erxudp("1 0010 ", b"1081");
        assert!(Datagram::parse(&line, SendMode::Standard).is_err());
        // Hex-sized but not hex
        let line = erxudp("1 0002 ", b"ZZZZ");
        assert!(Datagram::parse(&line, SendMode::Standard).is_err());
    }

    #[test]
    fn test_datagram_oversized_length_is_malformed() {
        let line = Line::from("ERXUDP FE80 FE80 0E1A 0E1A 001D129012345678 1 8000000000000000 1081");
        assert!(matches!(
            Datagram::parse(&line, SendMode::Standard),
            Err(WisunError::InvalidData(_))
        ));
        let line = erxudp("FFB4 1 FFFFFFFFFFFFFFFF ", b"10810001");
        assert!(Datagram::parse(&line, SendMode::Standard).is_err());
        let line = erxudp("1 10000000000000000 ", b"1081");
        assert!(Datagram::parse(&line, SendMode::Standard).is_err());
    }

    #[test]
    fn test_datagram_ignores_other_lines() {
        let line = Line::from("EVENT 21 FE80 00");
        assert_eq!(Datagram::parse(&line, SendMode::Standard).unwrap(), None);
    }
}
