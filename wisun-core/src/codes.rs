//! ECHONET Lite object, service and property codes

use crate::error::{WisunError, WisunResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ECHONET Lite object identifier (EOJ)
///
/// A 24-bit code made of a class group code, a class code and an instance
/// code. On the wire it is the 1-byte class group followed by the 2-byte
/// class/instance pair, big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassCode {
    bytes: [u8; 3],
}

impl ClassCode {
    /// Controller (class group 0x05, class 0xFF, instance 0x01)
    pub const CONTROLLER: ClassCode = ClassCode::new(0x05, 0xFF, 0x01);

    /// Low-voltage smart electric energy meter (0x0288, instance 0x01)
    pub const SMART_ELECTRIC_METER: ClassCode = ClassCode::new(0x02, 0x88, 0x01);

    /// Create a class code from its group, class and instance bytes
    pub const fn new(group: u8, class: u8, instance: u8) -> Self {
        Self {
            bytes: [group, class, instance],
        }
    }

    /// Create a class code from the low 24 bits of `value`
    ///
    /// # Errors
    ///
    /// Returns `WisunError::InvalidData` if any of the upper 8 bits are set.
    pub fn from_u32(value: u32) -> WisunResult<Self> {
        if value > 0x00FF_FFFF {
            return Err(WisunError::InvalidData(format!(
                "Class code out of 24-bit range: 0x{:X}",
                value
            )));
        }
        let [_, group, class, instance] = value.to_be_bytes();
        Ok(Self::new(group, class, instance))
    }

    /// Parse a class code from 6 hex digits, e.g. "028801"
    pub fn from_string(s: &str) -> WisunResult<Self> {
        if s.len() != 6 {
            return Err(WisunError::InvalidData(format!(
                "Invalid class code format: {}",
                s
            )));
        }
        let value = u32::from_str_radix(s, 16)
            .map_err(|_| WisunError::InvalidData(format!("Invalid class code format: {}", s)))?;
        Self::from_u32(value)
    }

    /// Get the 24-bit value
    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes([0, self.bytes[0], self.bytes[1], self.bytes[2]])
    }

    /// Get the wire bytes (group, class, instance)
    pub fn to_bytes(&self) -> [u8; 3] {
        self.bytes
    }

    /// Class group code
    pub fn group(&self) -> u8 {
        self.bytes[0]
    }

    /// Class code within the group
    pub fn class(&self) -> u8 {
        self.bytes[1]
    }

    /// Instance code
    pub fn instance(&self) -> u8 {
        self.bytes[2]
    }
}

impl fmt::Display for ClassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}{:02X}{:02X}",
            self.bytes[0], self.bytes[1], self.bytes[2]
        )
    }
}

/// ECHONET Lite service code (ESV)
///
/// Responses sit 0x10 above their request (Get 0x62 -> Get_Res 0x72) and
/// "service not available" responses sit 0x10 below it (Get -> Get_SNA 0x52).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceCode(pub u8);

impl ServiceCode {
    pub const SET_I_SNA: ServiceCode = ServiceCode(0x50);
    pub const SET_C_SNA: ServiceCode = ServiceCode(0x51);
    pub const GET_SNA: ServiceCode = ServiceCode(0x52);
    pub const INF_SNA: ServiceCode = ServiceCode(0x53);
    pub const SET_I: ServiceCode = ServiceCode(0x60);
    pub const SET_C: ServiceCode = ServiceCode(0x61);
    pub const GET: ServiceCode = ServiceCode(0x62);
    pub const INF_REQ: ServiceCode = ServiceCode(0x63);
    pub const SET_RES: ServiceCode = ServiceCode(0x71);
    pub const GET_RES: ServiceCode = ServiceCode(0x72);
    pub const INF: ServiceCode = ServiceCode(0x73);
    pub const INFC: ServiceCode = ServiceCode(0x74);

    /// Offset between a request and its response
    pub const RESPONSE_OFFSET: u8 = 0x10;

    /// Whether this is one of the "service not available" responses
    pub fn is_not_available(&self) -> bool {
        (0x50..=0x5F).contains(&self.0)
    }
}

impl fmt::Display for ServiceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// ECHONET property code (EPC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyCode(pub u8);

impl PropertyCode {
    /// Cumulative energy, normal direction
    pub const CUMULATIVE_ENERGY_NORMAL: PropertyCode = PropertyCode(0xE0);
    /// Unit coefficient for cumulative energy
    pub const CUMULATIVE_ENERGY_UNIT: PropertyCode = PropertyCode(0xE1);
    /// Cumulative energy, reverse direction
    pub const CUMULATIVE_ENERGY_REVERSE: PropertyCode = PropertyCode(0xE3);
    /// Instantaneous electric power (W)
    pub const INSTANTANEOUS_POWER: PropertyCode = PropertyCode(0xE7);
    /// Instantaneous current, R and T phase (0.1 A)
    pub const INSTANTANEOUS_CURRENT: PropertyCode = PropertyCode(0xE8);
}

impl fmt::Display for PropertyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}
