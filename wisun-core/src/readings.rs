//! Conversion of smart-meter property values into numeric readings

use crate::codes::PropertyCode;
use crate::error::{WisunError, WisunResult};
use crate::frame::PropertyMap;

/// Phase current value meaning "not measured" (single-phase two-wire meters)
pub const CURRENT_NOT_MEASURED: i16 = 0x7FFE;

/// Numeric readings extracted from a smart-meter response
///
/// Each field is `None` when the response did not carry the property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterReading {
    /// Instantaneous power in watts
    pub power: Option<i32>,
    /// R-phase current in amperes
    pub current_r: Option<f64>,
    /// T-phase current in amperes
    pub current_t: Option<f64>,
    /// Cumulative energy, normal direction, in kWh
    pub energy_normal: Option<f64>,
    /// Cumulative energy, reverse direction, in kWh
    pub energy_reverse: Option<f64>,
}

impl MeterReading {
    /// Convert the known codes of `properties`; others are ignored
    ///
    /// Cumulative energy is scaled by the unit coefficient (0xE1) when it is
    /// present in the same response, otherwise by 1.
    ///
    /// # Errors
    ///
    /// Returns `WisunError::InvalidData` if a known property has the wrong
    /// value length.
    pub fn from_properties(properties: &PropertyMap) -> WisunResult<Self> {
        let mut reading = MeterReading::default();

        if let Some(value) = properties.get(&PropertyCode::INSTANTANEOUS_POWER) {
            reading.power = Some(instantaneous_power(value)?);
        }
        if let Some(value) = properties.get(&PropertyCode::INSTANTANEOUS_CURRENT) {
            let (r, t) = instantaneous_current(value)?;
            reading.current_r = r;
            reading.current_t = t;
        }

        let unit = match properties.get(&PropertyCode::CUMULATIVE_ENERGY_UNIT) {
            Some(value) => energy_unit(value)?,
            None => 1.0,
        };
        if let Some(value) = properties.get(&PropertyCode::CUMULATIVE_ENERGY_NORMAL) {
            reading.energy_normal = Some(f64::from(cumulative_energy(value)?) * unit);
        }
        if let Some(value) = properties.get(&PropertyCode::CUMULATIVE_ENERGY_REVERSE) {
            reading.energy_reverse = Some(f64::from(cumulative_energy(value)?) * unit);
        }

        Ok(reading)
    }
}

/// Instantaneous power (0xE7): signed 32-bit big-endian watts
pub fn instantaneous_power(value: &[u8]) -> WisunResult<i32> {
    let bytes: [u8; 4] = fixed(value, PropertyCode::INSTANTANEOUS_POWER)?;
    Ok(i32::from_be_bytes(bytes))
}

/// Instantaneous current (0xE8): R and T phase, signed 16-bit in 0.1 A
pub fn instantaneous_current(value: &[u8]) -> WisunResult<(Option<f64>, Option<f64>)> {
    let bytes: [u8; 4] = fixed(value, PropertyCode::INSTANTANEOUS_CURRENT)?;
    let phase = |raw: i16| (raw != CURRENT_NOT_MEASURED).then(|| f64::from(raw) / 10.0);
    Ok((
        phase(i16::from_be_bytes([bytes[0], bytes[1]])),
        phase(i16::from_be_bytes([bytes[2], bytes[3]])),
    ))
}

/// Cumulative energy (0xE0 / 0xE3): unsigned 32-bit count
pub fn cumulative_energy(value: &[u8]) -> WisunResult<u32> {
    let bytes: [u8; 4] = fixed(value, PropertyCode::CUMULATIVE_ENERGY_NORMAL)?;
    Ok(u32::from_be_bytes(bytes))
}

/// Unit coefficient (0xE1) in kWh per count
pub fn energy_unit(value: &[u8]) -> WisunResult<f64> {
    let [code]: [u8; 1] = fixed(value, PropertyCode::CUMULATIVE_ENERGY_UNIT)?;
    match code {
        0x00 => Ok(1.0),
        0x01 => Ok(0.1),
        0x02 => Ok(0.01),
        0x03 => Ok(0.001),
        0x04 => Ok(0.0001),
        0x0A => Ok(10.0),
        0x0B => Ok(100.0),
        0x0C => Ok(1000.0),
        0x0D => Ok(10000.0),
        other => Err(WisunError::InvalidData(format!(
            "Unknown energy unit code: 0x{:02X}",
            other
        ))),
    }
}

fn fixed<const N: usize>(value: &[u8], code: PropertyCode) -> WisunResult<[u8; N]> {
    value.try_into().map_err(|_| {
        WisunError::InvalidData(format!(
            "Property {} expects {} bytes, got {}",
            code,
            N,
            value.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn map(entries: &[(u8, &[u8])]) -> PropertyMap {
        entries
            .iter()
            .map(|(code, value)| (PropertyCode(*code), Bytes::copy_from_slice(value)))
            .collect()
    }

    #[test]
    fn test_power_is_signed() {
        assert_eq!(instantaneous_power(&[0x00, 0x00, 0x01, 0x2C]).unwrap(), 300);
        assert_eq!(instantaneous_power(&[0xFF, 0xFF, 0xFF, 0x9C]).unwrap(), -100);
        assert!(instantaneous_power(&[0x01, 0x2C]).is_err());
    }

    #[test]
    fn test_current_scaled_to_amperes() {
        let (r, t) = instantaneous_current(&[0x00, 0x14, 0x00, 0x64]).unwrap();
        assert_eq!(r, Some(2.0));
        assert_eq!(t, Some(10.0));

        let (r, t) = instantaneous_current(&[0xFF, 0xF6, 0x7F, 0xFE]).unwrap();
        assert_eq!(r, Some(-1.0));
        assert_eq!(t, None);
    }

    #[test]
    fn test_reading_from_properties() {
        let properties = map(&[
            (0xE7, &[0x00, 0x00, 0x02, 0x58]),
            (0xE8, &[0x00, 0x1E, 0x00, 0x0A]),
            (0xE1, &[0x01]),
            (0xE0, &[0x00, 0x00, 0x30, 0x39]),
            (0x80, &[0x30]),
        ]);
        let reading = MeterReading::from_properties(&properties).unwrap();
        assert_eq!(reading.power, Some(600));
        assert_eq!(reading.current_r, Some(3.0));
        assert_eq!(reading.current_t, Some(1.0));
        let energy = reading.energy_normal.unwrap();
        assert!((energy - 1234.5).abs() < 1e-9);
        assert_eq!(reading.energy_reverse, None);
    }

    #[test]
    fn test_reading_rejects_bad_length() {
        let properties = map(&[(0xE8, &[0x00, 0x1E])]);
        assert!(matches!(
            MeterReading::from_properties(&properties),
            Err(WisunError::InvalidData(_))
        ));
    }

    #[test]
    fn test_unknown_energy_unit() {
        assert!(energy_unit(&[0x05]).is_err());
        assert_eq!(energy_unit(&[0x0D]).unwrap(), 10000.0);
    }
}
