//! Serial port link to the Wi-SUN module

use crate::stream::{LineMultiplexer, LineReceiver, LineWriter};
use crate::{WisunError, WisunResult};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_serial::SerialStream;

/// Default baud rate of the module's UART
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial port settings
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
}

impl SerialSettings {
    /// Create settings for `port_name` with the module defaults (115200 8N1)
    pub fn new(port_name: impl Into<String>) -> Self {
        Self::with_baud_rate(port_name, DEFAULT_BAUD_RATE)
    }

    pub fn with_baud_rate(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
            flow_control: tokio_serial::FlowControl::None,
        }
    }
}

/// Line writer over the write half of an open serial port
pub type SerialWriter = LineWriter<WriteHalf<SerialStream>>;

/// An open serial link: the line queue plus the write half
pub struct SerialLink {
    pub lines: LineReceiver,
    pub writer: SerialWriter,
    pub reader_task: JoinHandle<()>,
}

impl SerialLink {
    /// Open the port and start the line reader on its read half
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(settings: &SerialSettings) -> WisunResult<Self> {
        let builder = tokio_serial::new(&settings.port_name, settings.baud_rate)
            .data_bits(settings.data_bits)
            .stop_bits(settings.stop_bits)
            .parity(settings.parity)
            .flow_control(settings.flow_control);

        let stream = SerialStream::open(&builder).map_err(|e| {
            WisunError::Connection(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open serial port {}: {}", settings.port_name, e),
            ))
        })?;
        log::debug!(
            "Opened serial port {} at {} baud",
            settings.port_name,
            settings.baud_rate
        );

        let (read_half, write_half): (ReadHalf<SerialStream>, WriteHalf<SerialStream>) =
            tokio::io::split(stream);
        let (lines, reader_task) = LineMultiplexer::spawn(read_half);

        Ok(Self {
            lines,
            writer: LineWriter::new(write_half),
            reader_task,
        })
    }
}
