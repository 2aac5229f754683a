//! ECHONET Lite frame structure and encoding/decoding
//!
//! Only the fixed "format 1" layout is supported:
//!
//! ```text
//! EHD (2)  0x1081
//! TID (2)  transaction id
//! SEOJ (3) source object
//! DEOJ (3) destination object
//! ESV (1)  service code
//! OPC (1)  property count
//! then OPC times: EPC (1) | PDC (1) | EDT (PDC bytes)
//! ```

use crate::codes::{ClassCode, PropertyCode, ServiceCode};
use crate::error::{DecodeError, WisunError, WisunResult};
use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use rand::distributions::{Distribution, Standard};
use std::collections::BTreeMap;
use std::fmt;

/// ECHONET Lite header (EHD1 = 0x10, EHD2 = 0x81 for format 1)
pub const ECHONET_LITE_HEADER: u16 = 0x1081;

/// Length of the fixed header up to and including OPC
pub const HEADER_LENGTH: usize = 12;

/// Upper bound for both the property count and a single value length
pub const MAX_PROPERTIES: usize = 255;
pub const MAX_VALUE_LENGTH: usize = 255;

/// Property values keyed by code, as handed to the metrics side
pub type PropertyMap = BTreeMap<PropertyCode, Bytes>;

/// A single (EPC, EDT) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    code: PropertyCode,
    value: Bytes,
}

impl Property {
    /// Create a property with a value
    ///
    /// # Errors
    ///
    /// Returns `WisunError::InvalidData` if the value is longer than 255 bytes.
    pub fn new(code: PropertyCode, value: impl Into<Bytes>) -> WisunResult<Self> {
        let value = value.into();
        if value.len() > MAX_VALUE_LENGTH {
            return Err(WisunError::InvalidData(format!(
                "Property {} value too long: {} bytes (max: {})",
                code,
                value.len(),
                MAX_VALUE_LENGTH
            )));
        }
        Ok(Self { code, value })
    }

    /// Create a property with an empty value, as used in Get requests
    pub fn empty(code: PropertyCode) -> Self {
        Self {
            code,
            value: Bytes::new(),
        }
    }

    pub fn code(&self) -> PropertyCode {
        self.code
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }
}

/// ECHONET Lite frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    transaction_id: u16,
    source: ClassCode,
    destination: ClassCode,
    service: ServiceCode,
    properties: Vec<Property>,
}

impl Frame {
    /// Create a new frame
    ///
    /// # Errors
    ///
    /// Returns `WisunError::InvalidData` if more than 255 properties are given.
    pub fn new(
        transaction_id: u16,
        source: ClassCode,
        destination: ClassCode,
        service: ServiceCode,
        properties: Vec<Property>,
    ) -> WisunResult<Self> {
        if properties.len() > MAX_PROPERTIES {
            return Err(WisunError::InvalidData(format!(
                "Too many properties: {} (max: {})",
                properties.len(),
                MAX_PROPERTIES
            )));
        }
        Ok(Self {
            transaction_id,
            source,
            destination,
            service,
            properties,
        })
    }

    /// Create a controller request for `codes`, each with an empty value
    ///
    /// The transaction id starts at 0; senders regenerate it before every
    /// transmission.
    pub fn request(
        destination: ClassCode,
        service: ServiceCode,
        codes: &[PropertyCode],
    ) -> WisunResult<Self> {
        let properties = codes.iter().copied().map(Property::empty).collect();
        Self::new(0, ClassCode::CONTROLLER, destination, service, properties)
    }

    /// Decode a frame from bytes
    ///
    /// Unknown property codes are kept as they are; only structural problems
    /// fail. Bytes after the last declared property are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < HEADER_LENGTH {
            return Err(DecodeError::TooShort {
                needed: HEADER_LENGTH,
                available: data.len(),
            });
        }

        let header = u16::from_be_bytes([data[0], data[1]]);
        if header != ECHONET_LITE_HEADER {
            return Err(DecodeError::UnknownHeader(header));
        }

        let transaction_id = u16::from_be_bytes([data[2], data[3]]);
        let source = ClassCode::new(data[4], data[5], data[6]);
        let destination = ClassCode::new(data[7], data[8], data[9]);
        let service = ServiceCode(data[10]);
        let count = data[11] as usize;

        let mut properties = Vec::with_capacity(count);
        let mut pos = HEADER_LENGTH;
        for _ in 0..count {
            if data.len() < pos + 2 {
                return Err(DecodeError::TooShort {
                    needed: pos + 2,
                    available: data.len(),
                });
            }
            let code = PropertyCode(data[pos]);
            let length = data[pos + 1] as usize;
            pos += 2;
            if data.len() < pos + length {
                return Err(DecodeError::TooShort {
                    needed: pos + length,
                    available: data.len(),
                });
            }
            properties.push(Property {
                code,
                value: Bytes::copy_from_slice(&data[pos..pos + length]),
            });
            pos += length;
        }

        Ok(Self {
            transaction_id,
            source,
            destination,
            service,
            properties,
        })
    }

    /// Encode the frame to bytes (big-endian)
    pub fn encode(&self) -> Bytes {
        let body: usize = self.properties.iter().map(|p| 2 + p.value.len()).sum();
        let mut buf = BytesMut::with_capacity(HEADER_LENGTH + body);

        buf.put_u16(ECHONET_LITE_HEADER);
        buf.put_u16(self.transaction_id);
        buf.put_slice(&self.source.to_bytes());
        buf.put_slice(&self.destination.to_bytes());
        buf.put_u8(self.service.0);
        // Bounded by the constructors
        buf.put_u8(self.properties.len() as u8);
        for property in &self.properties {
            buf.put_u8(property.code.0);
            buf.put_u8(property.value.len() as u8);
            buf.put_slice(&property.value);
        }

        buf.freeze()
    }

    /// Check whether `candidate` answers `self` (or the other way round)
    ///
    /// Transaction ids must match, the endpoints must be swapped, the service
    /// codes must be exactly 0x10 apart in either direction and the property
    /// codes must match one for one. Frames without properties never match.
    pub fn correlates(&self, candidate: &Frame) -> bool {
        if self.transaction_id != candidate.transaction_id {
            return false;
        }
        if self.source != candidate.destination || self.destination != candidate.source {
            return false;
        }
        let delta = i16::from(self.service.0) - i16::from(candidate.service.0);
        if delta.unsigned_abs() != u16::from(ServiceCode::RESPONSE_OFFSET) {
            return false;
        }
        if self.properties.is_empty() || self.properties.len() != candidate.properties.len() {
            return false;
        }
        self.properties
            .iter()
            .zip(&candidate.properties)
            .all(|(a, b)| a.code == b.code)
    }

    /// Draw a fresh transaction id from `rng`
    pub fn regenerate_transaction_id<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.transaction_id = Standard.sample(rng);
    }

    pub fn set_transaction_id(&mut self, transaction_id: u16) {
        self.transaction_id = transaction_id;
    }

    pub fn transaction_id(&self) -> u16 {
        self.transaction_id
    }

    pub fn source(&self) -> ClassCode {
        self.source
    }

    pub fn destination(&self) -> ClassCode {
        self.destination
    }

    pub fn service(&self) -> ServiceCode {
        self.service
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Value of the first property with `code`
    pub fn property(&self, code: PropertyCode) -> Option<&Bytes> {
        self.properties
            .iter()
            .find(|p| p.code == code)
            .map(|p| &p.value)
    }

    /// Collect the properties into a map; later duplicates win
    pub fn into_property_map(self) -> PropertyMap {
        self.properties
            .into_iter()
            .map(|p| (p.code, p.value))
            .collect()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ECHONET Lite Frame: tid=0x{:04X}, seoj={}, deoj={}, esv={}, opc={}",
            self.transaction_id,
            self.source,
            self.destination,
            self.service,
            self.properties.len()
        )
    }
}
