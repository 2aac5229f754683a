//! SK command builders
//!
//! Only the commands needed to authenticate and to exchange ECHONET Lite
//! datagrams are provided.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::Ipv6Addr;

/// UDP port of ECHONET Lite
pub const ECHONET_LITE_PORT: u16 = 3610;

/// UDP handle used for datagrams to the meter
pub const UDP_HANDLE: u8 = 1;

/// How the module signals the end of a command's reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Lines until `OK` (or a `FAIL` line)
    Terminated,
    /// The first line is the whole reply; the module prints no `OK`
    FirstLine,
}

/// One SK command line
///
/// The text part is always printable. Datagram commands additionally carry a
/// raw payload that is written after the text, separated by one space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkCommand {
    text: String,
    payload: Option<Bytes>,
    reply: ReplyKind,
}

impl SkCommand {
    /// A command whose reply ends with `OK`
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            payload: None,
            reply: ReplyKind::Terminated,
        }
    }

    /// `SKSETPWD <len> <password>`
    pub fn set_password(password: &str) -> Self {
        Self::new(format!("SKSETPWD {:X} {}", password.len(), password))
    }

    /// `SKSETRBID <id>`
    pub fn set_route_b_id(id: &str) -> Self {
        Self::new(format!("SKSETRBID {}", id))
    }

    /// `SKSREG <register> <value>`
    pub fn set_register(register: &str, value: &str) -> Self {
        Self::new(format!("SKSREG {} {}", register, value))
    }

    /// `SKSREG S2 <channel>`
    pub fn set_channel(channel: u8) -> Self {
        Self::set_register("S2", &format!("{:02X}", channel))
    }

    /// `SKSREG S3 <pan id>`
    pub fn set_pan_id(pan_id: u16) -> Self {
        Self::set_register("S3", &format!("{:04X}", pan_id))
    }

    /// `SKJOIN <address>`, starting PANA authentication
    pub fn join(peer: Ipv6Addr) -> Self {
        Self::new(format!("SKJOIN {}", sk_address(peer)))
    }

    /// `SKLL64 <mac>`, resolving a MAC address to its link-local IPv6 address
    pub fn link_local_address(mac: u64) -> Self {
        Self {
            text: format!("SKLL64 {:016X}", mac),
            payload: None,
            reply: ReplyKind::FirstLine,
        }
    }

    /// `SKSENDTO` carrying `payload` to the ECHONET Lite port of `peer`
    ///
    /// With `side` set the dual-stack form is produced
    /// (`... <sec> <side> <len> <data>`); otherwise the single-stack form
    /// (`... <sec> <len> <data>`).
    pub fn send_to(peer: Ipv6Addr, side: Option<u8>, payload: Bytes) -> Self {
        let secured = 1;
        let side = side.map(|s| format!(" {}", s)).unwrap_or_default();
        let text = format!(
            "SKSENDTO {} {} {:04X} {}{} {:04X}",
            UDP_HANDLE,
            sk_address(peer),
            ECHONET_LITE_PORT,
            secured,
            side,
            payload.len()
        );
        Self {
            text,
            payload: Some(payload),
            reply: ReplyKind::Terminated,
        }
    }

    /// Command keyword, e.g. `SKJOIN`
    pub fn name(&self) -> &str {
        self.text.split(' ').next().unwrap_or_default()
    }

    pub fn reply_kind(&self) -> ReplyKind {
        self.reply
    }

    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Bytes to write to the module, without the line terminator
    pub fn to_bytes(&self) -> Bytes {
        let payload_len = self.payload.as_ref().map_or(0, |p| p.len() + 1);
        let mut buf = BytesMut::with_capacity(self.text.len() + payload_len);
        buf.put_slice(self.text.as_bytes());
        if let Some(payload) = &self.payload {
            buf.put_u8(b' ');
            buf.put_slice(payload);
        }
        buf.freeze()
    }
}

/// Printable form: the raw payload, if any, is shown hex-encoded
impl fmt::Display for SkCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        if let Some(payload) = &self.payload {
            write!(f, " {}", hex::encode_upper(payload))?;
        }
        Ok(())
    }
}

/// Full upper-case form of an IPv6 address as the module expects it,
/// e.g. `FE80:0000:0000:0000:021D:1290:1234:5678`
pub fn sk_address(addr: Ipv6Addr) -> String {
    addr.segments()
        .iter()
        .map(|s| format!("{:04X}", s))
        .collect::<Vec<_>>()
        .join(":")
}
