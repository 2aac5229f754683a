use crate::codes::PropertyCode;
use thiserror::Error;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum WisunError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// No reply line arrived within the idle bound of a command
    #[error("Command timeout")]
    Timeout,

    /// The module answered with an explicit `FAIL` line
    #[error("Command rejected: {0}")]
    CommandRejected(String),

    /// The serial line queue has closed; no further commands are possible
    #[error("Serial link closed")]
    LinkClosed,

    #[error("Frame decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The module refused to send a datagram because no PANA session exists
    #[error("Datagram rejected: not authenticated")]
    Unauthenticated,

    #[error("Join failed: {0}")]
    JoinFailed(JoinTimeout),

    /// No correlated response arrived before the response scan went idle
    #[error("Response read timeout")]
    ReadTimeout,

    #[error("Datagram send failed after {0} attempts")]
    RetriesExhausted(u32),

    /// The meter answered with a "service not available" response
    #[error("Properties not available: {0:?}")]
    NotAvailable(Vec<PropertyCode>),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl WisunError {
    /// Whether the next polling cycle may reasonably succeed after this error
    ///
    /// Link closure and I/O errors leave the serial device unusable; every
    /// other kind only spoils the current exchange.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, WisunError::LinkClosed | WisunError::Connection(_))
    }
}

/// Structural errors while decoding an ECHONET Lite frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short: needed {needed} bytes, got {available}")]
    TooShort { needed: usize, available: usize },

    #[error("unknown ECHONET Lite header: 0x{0:04X}")]
    UnknownHeader(u16),
}

/// Which join deadline expired
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTimeout {
    /// A single join attempt saw no outcome in time
    #[error("join attempt timed out")]
    Attempt,
    /// The whole handshake exceeded its ceiling
    #[error("join handshake timed out")]
    Total,
}

/// Result type alias for bridge operations
pub type WisunResult<T> = Result<T, WisunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(WisunError::Timeout.is_recoverable());
        assert!(WisunError::ReadTimeout.is_recoverable());
        assert!(WisunError::Unauthenticated.is_recoverable());
        assert!(WisunError::JoinFailed(JoinTimeout::Total).is_recoverable());
        assert!(!WisunError::LinkClosed.is_recoverable());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(!WisunError::from(io).is_recoverable());
    }

    #[test]
    fn test_decode_error_display() {
        let err = WisunError::from(DecodeError::UnknownHeader(0x0000));
        assert_eq!(
            err.to_string(),
            "Frame decode error: unknown ECHONET Lite header: 0x0000"
        );
        assert_eq!(
            WisunError::JoinFailed(JoinTimeout::Attempt).to_string(),
            "Join failed: join attempt timed out"
        );
        assert_eq!(
            WisunError::JoinFailed(JoinTimeout::Total).to_string(),
            "Join failed: join handshake timed out"
        );
    }
}
