//! wisun - read a low-voltage smart electric meter over Wi-SUN route B
//!
//! The module speaks the SK command set over a serial line; the meter speaks
//! ECHONET Lite inside UDP datagrams relayed by the module.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `wisun-core`: ECHONET Lite frame codec, codes, readings and errors
//! - `wisun-transport`: Serial port, line multiplexer and line writer
//! - `wisun-session`: SK command driver, notifications and PANA authentication
//! - `wisun-client`: Request/retry engine, configuration and polling client
//!
//! # Usage
//!
//! ```no_run
//! use wisun::client::{MeterConfig, SmartMeterClient};
//!
//! # async fn poll() -> wisun::WisunResult<()> {
//! let config = MeterConfig::builder()
//!     .serial("/dev/ttyUSB0")
//!     .route_b("00112233445566778899AABBCCDDEEFF", "0123456789AB")
//!     .pan(0x21, 0x8888, "fe80::21d:1290:1234:5678".parse().unwrap())
//!     .build()?;
//! let mut client = SmartMeterClient::connect(config)?;
//! let reading = client.read_instantaneous().await?;
//! println!("{:?} W", reading.power);
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use wisun_core::{
    ClassCode, Frame, MeterReading, PropertyCode, PropertyMap, ServiceCode, WisunError,
    WisunResult,
};

// Re-export layers
pub mod protocol {
    pub use wisun_core::*;
}

pub mod transport {
    pub use wisun_transport::*;
}

pub mod session {
    pub use wisun_session::*;
}

pub mod client {
    pub use wisun_client::*;
}
