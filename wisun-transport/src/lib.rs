//! Transport layer for the Wi-SUN module
//!
//! This crate turns the module's serial byte stream into a queue of lines and
//! provides the line-write capability used to issue SK commands.

pub mod serial;
pub mod stream;

pub use serial::{DEFAULT_BAUD_RATE, SerialLink, SerialSettings, SerialWriter};
pub use stream::{
    LINE_QUEUE_CAPACITY, Line, LineMultiplexer, LineReceiver, LineSink, LineWriter,
    MAX_LINE_LENGTH, Received,
};
pub use wisun_core::{WisunError, WisunResult};
