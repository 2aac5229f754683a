//! Core types and utilities for the Wi-SUN B-route bridge
//!
//! This crate provides the ECHONET Lite frame codec, the protocol codes used
//! to address a smart electric meter, property value conversion and the error
//! type shared by every layer of the workspace.

pub mod codes;
pub mod error;
pub mod frame;
pub mod readings;

pub use codes::{ClassCode, PropertyCode, ServiceCode};
pub use error::{DecodeError, JoinTimeout, WisunError, WisunResult};
pub use frame::{Frame, Property, PropertyMap};
pub use readings::MeterReading;
