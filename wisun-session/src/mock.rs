//! Scripted stand-in for the Wi-SUN module
//!
//! `ScriptedSink` answers each written command with the next scripted reply:
//! a list of lines, each published after its own delay (relative to the
//! previous line). Combined with a paused tokio clock this makes every
//! timeout in the session layer testable without real waiting.

use crate::WisunResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use wisun_transport::{Line, LineReceiver, LineSink};

/// Queue capacity used by the scripted device
pub const SCRIPT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug)]
enum Reply {
    Lines(Vec<(Duration, Line)>),
    LinesThenHangUp(Vec<(Duration, Line)>),
    HangUp,
}

/// Commands written to a `ScriptedSink`, with the time of each write
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<(Instant, Bytes)>>>);

impl SentLog {
    fn push(&self, at: Instant, command: Bytes) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((at, command));
    }

    pub fn entries(&self) -> Vec<(Instant, Bytes)> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Written commands in order, without line terminators
    pub fn commands(&self) -> Vec<Bytes> {
        self.entries().into_iter().map(|(_, c)| c).collect()
    }

    /// Commands starting with `prefix`, with their write times
    pub fn matching(&self, prefix: &str) -> Vec<(Instant, Bytes)> {
        self.entries()
            .into_iter()
            .filter(|(_, c)| c.starts_with(prefix.as_bytes()))
            .collect()
    }
}

/// Line sink that plays back a reply script
#[derive(Debug)]
pub struct ScriptedSink {
    script: Arc<Mutex<VecDeque<Reply>>>,
    tx: Option<mpsc::Sender<Line>>,
    sent: SentLog,
}

impl ScriptedSink {
    /// Create the device together with the line queue it feeds and the log
    /// of written commands
    pub fn new() -> (Self, LineReceiver, SentLog) {
        let (tx, lines) = LineReceiver::channel(SCRIPT_QUEUE_CAPACITY);
        let sent = SentLog::default();
        let sink = Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            tx: Some(tx),
            sent: sent.clone(),
        };
        (sink, lines, sent)
    }

    /// Answer the next command with `lines`, all published immediately
    pub fn reply(&self, lines: &[&str]) {
        self.reply_timed(&lines.iter().map(|l| (Duration::ZERO, *l)).collect::<Vec<_>>());
    }

    /// Answer the next command with `lines`, each after its delay
    pub fn reply_timed(&self, lines: &[(Duration, &str)]) {
        self.reply_lines(
            lines
                .iter()
                .map(|(delay, text)| (*delay, Line::from(*text)))
                .collect(),
        );
    }

    /// Answer the next command with raw lines
    pub fn reply_lines(&self, lines: Vec<(Duration, Line)>) {
        self.enqueue(Reply::Lines(lines));
    }

    /// Answer the next command with `lines`, then close the line queue
    pub fn reply_then_hang_up(&self, lines: &[&str]) {
        self.enqueue(Reply::LinesThenHangUp(
            lines.iter().map(|l| (Duration::ZERO, Line::from(*l))).collect(),
        ));
    }

    /// Close the line queue when the next command is written
    pub fn hang_up(&self) {
        self.enqueue(Reply::HangUp);
    }

    fn enqueue(&self, reply: Reply) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }
}

#[async_trait]
impl LineSink for ScriptedSink {
    async fn write_line(&mut self, line: &[u8]) -> WisunResult<()> {
        self.sent.push(Instant::now(), Bytes::copy_from_slice(line));

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Reply::Lines(lines)) => {
                if let Some(tx) = self.tx.clone() {
                    tokio::spawn(play(tx, lines));
                }
            }
            Some(Reply::LinesThenHangUp(lines)) => {
                // The task owns the last sender; the queue closes once it ends
                if let Some(tx) = self.tx.take() {
                    tokio::spawn(play(tx, lines));
                }
            }
            Some(Reply::HangUp) => {
                self.tx = None;
            }
            None => {
                log::debug!(
                    "No scripted reply for {}",
                    String::from_utf8_lossy(line)
                );
            }
        }
        Ok(())
    }
}

async fn play(tx: mpsc::Sender<Line>, lines: Vec<(Duration, Line)>) {
    for (delay, line) in lines {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if tx.send(line).await.is_err() {
            return;
        }
    }
}
