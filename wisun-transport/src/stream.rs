//! Line multiplexing over the module's byte stream
//!
//! One task owns the read half of the serial stream and publishes every
//! `\n`-terminated line onto a small bounded queue. A single consumer waits on
//! that queue with a deadline; closure of the queue is the only signal that
//! the serial link is gone.

use crate::WisunResult;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Capacity of the line queue between the reader task and its consumer
pub const LINE_QUEUE_CAPACITY: usize = 4;

/// Line terminator expected by the module
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Longest line kept whole; longer runs without a terminator are cut here
pub const MAX_LINE_LENGTH: usize = 4096;

const READ_CHUNK: usize = 256;

/// One line received from the module, without its line terminator
///
/// Lines are kept as bytes because datagram notifications may carry raw
/// binary payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line(Bytes);

impl Line {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Lossy text form of the line
    pub fn to_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix.as_bytes())
    }

    /// Whether the whole line equals `literal`
    pub fn is(&self, literal: &str) -> bool {
        self.0.as_ref() == literal.as_bytes()
    }
}

impl From<&str> for Line {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Outcome of waiting on the line queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Line(Line),
    /// The reader task has finished; no more lines will arrive
    Closed,
    /// The deadline passed first
    Elapsed,
}

/// Consumer end of the line queue
#[derive(Debug)]
pub struct LineReceiver {
    rx: mpsc::Receiver<Line>,
}

impl LineReceiver {
    pub fn new(rx: mpsc::Receiver<Line>) -> Self {
        Self { rx }
    }

    /// Create a detached queue, e.g. to feed lines from something other than
    /// a byte stream
    pub fn channel(capacity: usize) -> (mpsc::Sender<Line>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }

    /// Wait for the next line without a deadline
    pub async fn recv(&mut self) -> Option<Line> {
        self.rx.recv().await
    }

    /// Wait for the next line until `deadline`
    ///
    /// Every timeout in the bridge is built on this primitive: callers that
    /// juggle several deadlines pass the earliest one and inspect the clock
    /// when `Received::Elapsed` comes back.
    pub async fn recv_until(&mut self, deadline: Instant) -> Received {
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(line)) => Received::Line(line),
            Ok(None) => Received::Closed,
            Err(_) => Received::Elapsed,
        }
    }

    /// Wait for the next line for at most `timeout`
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Received {
        self.recv_until(Instant::now() + timeout).await
    }
}

/// Reader task splitting a byte stream into lines
pub struct LineMultiplexer;

impl LineMultiplexer {
    /// Spawn the reader task on `reader` with the default queue capacity
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<R>(reader: R) -> (LineReceiver, JoinHandle<()>)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::spawn_with_capacity(reader, LINE_QUEUE_CAPACITY)
    }

    pub fn spawn_with_capacity<R>(reader: R, capacity: usize) -> (LineReceiver, JoinHandle<()>)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (tx, rx) = LineReceiver::channel(capacity);
        let handle = tokio::spawn(read_lines(reader, tx));
        (rx, handle)
    }
}

async fn read_lines<R>(mut reader: R, tx: mpsc::Sender<Line>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let raw = buf.split_to(pos + 1);
            if tx.send(trim_line(raw)).await.is_err() {
                // Consumer is gone
                return;
            }
        }
        if buf.len() >= MAX_LINE_LENGTH {
            log::warn!("No line terminator in {} bytes, cutting the line", buf.len());
            let raw = buf.split_to(MAX_LINE_LENGTH);
            if tx.send(Line(raw.freeze())).await.is_err() {
                return;
            }
            continue;
        }

        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                log::error!("Serial read error: {}", e);
                break;
            }
        }
    }

    if !buf.is_empty() {
        let _ = tx.send(trim_line(buf)).await;
    }
    log::debug!("Serial reader finished, closing line queue");
}

fn trim_line(mut raw: BytesMut) -> Line {
    if raw.last() == Some(&b'\n') {
        raw.truncate(raw.len() - 1);
    }
    if raw.last() == Some(&b'\r') {
        raw.truncate(raw.len() - 1);
    }
    Line(raw.freeze())
}

/// Line-write capability towards the module
#[async_trait]
pub trait LineSink: Send {
    /// Write `line` followed by CR LF and flush
    async fn write_line(&mut self, line: &[u8]) -> WisunResult<()>;
}

/// `LineSink` over any async writer (normally the serial write half)
#[derive(Debug)]
pub struct LineWriter<W> {
    inner: W,
}

impl<W> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W> LineSink for LineWriter<W>
where
    W: AsyncWrite + Send + Unpin,
{
    async fn write_line(&mut self, line: &[u8]) -> WisunResult<()> {
        let mut data = BytesMut::with_capacity(line.len() + LINE_TERMINATOR.len());
        data.put_slice(line);
        data.put_slice(LINE_TERMINATOR);
        self.inner.write_all(&data).await?;
        self.inner.flush().await?;
        Ok(())
    }
}
