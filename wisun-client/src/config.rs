//! Client configuration
//!
//! `MeterConfig` can be deserialized (e.g. from JSON) or assembled with
//! `MeterConfigBuilder`. Either way `validate()` must pass before a client is
//! created from it.

use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::time::Duration;
use wisun_core::{WisunError, WisunResult};
use wisun_session::{PanaCredentials, SendMode};
use wisun_transport::{DEFAULT_BAUD_RATE, SerialSettings};

/// Default number of read attempts after authenticating
pub const DEFAULT_MAX_READ_ATTEMPTS: u32 = 3;

/// Timeouts of every layer, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Idle bound between two reply lines of a command
    pub command_idle_ms: u64,
    pub join_attempt_ms: u64,
    pub join_total_ms: u64,
    /// Idle bound while waiting for a response datagram
    pub response_idle_ms: u64,
    /// First retry delay after a failed transmission
    pub initial_backoff_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_idle_ms: 10_000,
            join_attempt_ms: 10_000,
            join_total_ms: 20_000,
            response_idle_ms: 3_000,
            initial_backoff_ms: 500,
        }
    }
}

impl Timeouts {
    pub fn command_idle(&self) -> Duration {
        Duration::from_millis(self.command_idle_ms)
    }

    pub fn join_attempt(&self) -> Duration {
        Duration::from_millis(self.join_attempt_ms)
    }

    pub fn join_total(&self) -> Duration {
        Duration::from_millis(self.join_total_ms)
    }

    pub fn response_idle(&self) -> Duration {
        Duration::from_millis(self.response_idle_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

/// Everything needed to poll one smart meter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Serial device of the Wi-SUN module, e.g. `/dev/ttyUSB0`
    pub serial_port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Route-B authentication id (32 characters)
    pub route_b_id: String,
    /// Route-B password
    pub password: String,
    pub channel: u8,
    pub pan_id: u16,
    /// Link-local address of the meter
    pub peer_address: Ipv6Addr,
    /// Module speaks the dual-stack (B-route + HAN) edition of the SK commands
    #[serde(default)]
    pub dual_stack: bool,
    /// Echo all serial traffic through the log
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Cap on transmission attempts per request; unbounded when absent
    #[serde(default)]
    pub max_send_attempts: Option<u32>,
    #[serde(default = "default_max_read_attempts")]
    pub max_read_attempts: u32,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_max_read_attempts() -> u32 {
    DEFAULT_MAX_READ_ATTEMPTS
}

impl MeterConfig {
    pub fn builder() -> MeterConfigBuilder {
        MeterConfigBuilder::new()
    }

    /// Check the values a deserialized configuration cannot enforce by type
    ///
    /// # Errors
    ///
    /// Returns `WisunError::InvalidData` if the serial port is empty, if the
    /// route-B id or password is empty or contains anything but printable
    /// ASCII without spaces, or if `max_read_attempts` is zero.
    pub fn validate(&self) -> WisunResult<()> {
        if self.serial_port.trim().is_empty() {
            return Err(WisunError::InvalidData(
                "Serial port must be configured".to_string(),
            ));
        }
        check_token("route-B id", &self.route_b_id)?;
        check_token("route-B password", &self.password)?;
        if self.max_read_attempts == 0 {
            return Err(WisunError::InvalidData(
                "max_read_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn send_mode(&self) -> SendMode {
        if self.dual_stack {
            SendMode::DualStack
        } else {
            SendMode::Standard
        }
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings::with_baud_rate(self.serial_port.clone(), self.baud_rate)
    }

    pub fn credentials(&self) -> PanaCredentials {
        PanaCredentials {
            route_b_id: self.route_b_id.clone(),
            password: self.password.clone(),
            channel: self.channel,
            pan_id: self.pan_id,
            peer_address: self.peer_address,
        }
    }
}

/// The id and password are sent as bare command arguments
fn check_token(name: &str, value: &str) -> WisunResult<()> {
    if value.is_empty() {
        return Err(WisunError::InvalidData(format!("{} must be configured", name)));
    }
    if !value.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(WisunError::InvalidData(format!(
            "{} must be printable ASCII without spaces",
            name
        )));
    }
    Ok(())
}

/// Fluent builder for `MeterConfig`
#[derive(Debug, Clone, Default)]
pub struct MeterConfigBuilder {
    serial_port: Option<String>,
    baud_rate: Option<u32>,
    route_b_id: Option<String>,
    password: Option<String>,
    channel: Option<u8>,
    pan_id: Option<u16>,
    peer_address: Option<Ipv6Addr>,
    dual_stack: bool,
    debug: bool,
    timeouts: Timeouts,
    max_send_attempts: Option<u32>,
    max_read_attempts: Option<u32>,
}

impl MeterConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the serial device of the module
    ///
    /// # Arguments
    /// * `port_name` - Serial port name (e.g., "/dev/ttyUSB0" or "COM1")
    pub fn serial(mut self, port_name: &str) -> Self {
        self.serial_port = Some(port_name.to_string());
        self
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// Configure the route-B id and password issued by the utility
    pub fn route_b(mut self, id: &str, password: &str) -> Self {
        self.route_b_id = Some(id.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Configure the meter's PAN as found by an active scan
    ///
    /// # Arguments
    /// * `channel` - Radio channel number
    /// * `pan_id` - PAN identifier
    /// * `peer_address` - Link-local IPv6 address of the meter
    pub fn pan(mut self, channel: u8, pan_id: u16, peer_address: Ipv6Addr) -> Self {
        self.channel = Some(channel);
        self.pan_id = Some(pan_id);
        self.peer_address = Some(peer_address);
        self
    }

    pub fn dual_stack(mut self, dual_stack: bool) -> Self {
        self.dual_stack = dual_stack;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn max_send_attempts(mut self, max: u32) -> Self {
        self.max_send_attempts = Some(max);
        self
    }

    pub fn max_read_attempts(mut self, max: u32) -> Self {
        self.max_read_attempts = Some(max);
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `WisunError::InvalidData` if a required value is missing or
    /// `MeterConfig::validate` rejects the result
    pub fn build(self) -> WisunResult<MeterConfig> {
        let config = MeterConfig {
            serial_port: required(self.serial_port, "Serial port")?,
            baud_rate: self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
            route_b_id: required(self.route_b_id, "Route-B id")?,
            password: required(self.password, "Route-B password")?,
            channel: required(self.channel, "Channel")?,
            pan_id: required(self.pan_id, "PAN id")?,
            peer_address: required(self.peer_address, "Peer address")?,
            dual_stack: self.dual_stack,
            debug: self.debug,
            timeouts: self.timeouts,
            max_send_attempts: self.max_send_attempts,
            max_read_attempts: self.max_read_attempts.unwrap_or(DEFAULT_MAX_READ_ATTEMPTS),
        };
        config.validate()?;
        Ok(config)
    }
}

fn required<T>(value: Option<T>, name: &str) -> WisunResult<T> {
    value.ok_or_else(|| WisunError::InvalidData(format!("{} must be configured", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Ipv6Addr {
        "fe80::21d:1290:1234:5678".parse().unwrap()
    }

    fn builder() -> MeterConfigBuilder {
        MeterConfig::builder()
            .serial("/dev/ttyUSB0")
            .route_b("00112233445566778899AABBCCDDEEFF", "0123456789AB")
            .pan(0x21, 0x8888, peer())
    }

    #[test]
    fn test_builder_defaults() {
        let config = builder().build().unwrap();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.max_read_attempts, 3);
        assert_eq!(config.max_send_attempts, None);
        assert_eq!(config.send_mode(), SendMode::Standard);
        assert_eq!(config.timeouts.join_total(), Duration::from_secs(20));
        assert_eq!(config.timeouts.initial_backoff(), Duration::from_millis(500));
        assert_eq!(config.credentials().pan_id, 0x8888);
    }

    #[test]
    fn test_builder_requires_values() {
        let err = MeterConfig::builder()
            .serial("/dev/ttyUSB0")
            .pan(0x21, 0x8888, peer())
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid data: Route-B id must be configured");

        assert!(
            MeterConfig::builder()
                .route_b("ID", "PWD")
                .pan(0x21, 0x8888, peer())
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_credentials_must_be_printable() {
        assert!(builder().route_b("0011 2233", "pwd").build().is_err());
        assert!(builder().route_b("00112233", "pässword").build().is_err());
        assert!(builder().route_b("00112233", "").build().is_err());
        assert!(builder().max_read_attempts(0).build().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "serial_port": "/dev/ttyUSB0",
            "route_b_id": "00112233445566778899AABBCCDDEEFF",
            "password": "0123456789AB",
            "channel": 33,
            "pan_id": 34952,
            "peer_address": "fe80::21d:1290:1234:5678",
            "dual_stack": true,
            "timeouts": { "response_idle_ms": 5000 }
        }"#;
        let config: MeterConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.send_mode(), SendMode::DualStack);
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.timeouts.response_idle(), Duration::from_secs(5));
        assert_eq!(config.timeouts.command_idle(), Duration::from_secs(10));
        assert_eq!(config.max_read_attempts, 3);
        assert!(!config.debug);
        assert_eq!(config.peer_address, peer());
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = builder().max_send_attempts(5).build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: MeterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
