//! Smart-meter client over a Wi-SUN B-route module
//!
//! This crate ties the session layer together: it sends ECHONET Lite requests
//! as UDP datagrams, retries failed transmissions with exponential backoff,
//! matches responses to requests and authenticates on demand.

pub mod client;
pub mod config;
pub mod request;

pub use client::SmartMeterClient;
pub use config::{MeterConfig, MeterConfigBuilder, Timeouts};
pub use request::{DEFAULT_INITIAL_BACKOFF, DEFAULT_RESPONSE_TIMEOUT, RequestEngine};
