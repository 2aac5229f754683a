//! Session layer for the Wi-SUN module's SK command set
//!
//! This crate issues SK commands one at a time, interprets the module's
//! asynchronous notifications and runs the PANA authentication handshake.

pub mod auth;
pub mod command;
pub mod driver;
pub mod echo;
pub mod notification;
pub mod state;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use auth::{PanaAuthenticator, PanaCredentials};
pub use command::{ReplyKind, SkCommand, sk_address};
pub use driver::{CommandDriver, CommandReply, DEFAULT_IDLE_TIMEOUT};
pub use echo::{EchoSink, LogEcho, WriterEcho};
pub use notification::{Datagram, Event, EventKind, PayloadEncoding, SendMode};
pub use state::JoinState;
pub use wisun_core::{WisunError, WisunResult};
