//! Debug echo of the serial traffic
//!
//! Every command written and every line read can be mirrored to a sink for
//! troubleshooting. Raw datagram payloads are shown hex-encoded.

use std::io;

/// Receiver of the echoed traffic
pub trait EchoSink: Send {
    fn echo(&mut self, text: &str);
}

/// Echo through `log::debug!` on target `wisun::trace`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEcho;

impl EchoSink for LogEcho {
    fn echo(&mut self, text: &str) {
        log::debug!(target: "wisun::trace", "{}", text);
    }
}

/// Echo into any writer, one line per item
#[derive(Debug)]
pub struct WriterEcho<W> {
    inner: W,
}

impl<W: io::Write + Send> WriterEcho<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write + Send> EchoSink for WriterEcho<W> {
    fn echo(&mut self, text: &str) {
        // Echo is best effort
        if let Err(e) = writeln!(self.inner, "{}", text) {
            log::warn!("Failed to write echo: {}", e);
        }
    }
}

impl<F> EchoSink for F
where
    F: FnMut(&str) + Send,
{
    fn echo(&mut self, text: &str) {
        self(text)
    }
}
