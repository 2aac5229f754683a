//! Command/response driver
//!
//! Writes one SK command at a time and collects the module's reply lines
//! until a terminal marker, an idle timeout or the end of the line queue.

use crate::command::{ReplyKind, SkCommand};
use crate::echo::EchoSink;
use crate::notification::Event;
use crate::{WisunError, WisunResult};
use std::time::Duration;
use tokio::time::Instant;
use wisun_transport::{Line, LineReceiver, LineSink, Received};

/// Default idle bound between two reply lines
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Lines received in reply to a command, terminal marker excluded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReply {
    lines: Vec<Line>,
}

impl CommandReply {
    pub fn new(lines: Vec<Line>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Concatenation of all reply lines
    pub fn text(&self) -> String {
        self.lines.iter().map(|line| line.to_text()).collect()
    }

    /// `EVENT` notifications that arrived inside the reply
    pub fn events(&self) -> impl Iterator<Item = Event> + '_ {
        self.lines.iter().filter_map(Event::parse)
    }
}

/// Issues SK commands over a line sink and reads replies from the line queue
///
/// The driver is the only writer to the module and the only consumer of the
/// line queue.
pub struct CommandDriver<S> {
    sink: S,
    lines: LineReceiver,
    echo: Option<Box<dyn EchoSink>>,
    idle_timeout: Duration,
}

impl<S: LineSink> CommandDriver<S> {
    pub fn new(sink: S, lines: LineReceiver) -> Self {
        Self {
            sink,
            lines,
            echo: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Mirror all traffic to `echo`
    pub fn with_echo(mut self, echo: impl EchoSink + 'static) -> Self {
        self.echo = Some(Box::new(echo));
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Send `command` and wait for its reply
    ///
    /// # Errors
    ///
    /// * `WisunError::CommandRejected` if the module printed a `FAIL` line
    /// * `WisunError::Timeout` if no line arrived within the idle timeout
    /// * `WisunError::LinkClosed` if the line queue closed
    /// * `WisunError::Connection` if the command could not be written
    pub async fn send(&mut self, command: &SkCommand) -> WisunResult<CommandReply> {
        self.write(command).await?;

        let mut lines = Vec::new();
        loop {
            let deadline = Instant::now() + self.idle_timeout;
            match self.next_line(deadline).await {
                Received::Line(line) => {
                    if line.starts_with("FAIL ") {
                        return Err(WisunError::CommandRejected(line.to_string()));
                    }
                    if line.is("OK") {
                        return Ok(CommandReply::new(lines));
                    }
                    lines.push(line);
                    if command.reply_kind() == ReplyKind::FirstLine {
                        return Ok(CommandReply::new(lines));
                    }
                }
                Received::Elapsed => {
                    log::debug!(
                        "{} timed out after {:?} without a reply line",
                        command.name(),
                        self.idle_timeout
                    );
                    return Err(WisunError::Timeout);
                }
                Received::Closed => return Err(WisunError::LinkClosed),
            }
        }
    }

    /// Write `command` without waiting for a reply
    pub async fn write(&mut self, command: &SkCommand) -> WisunResult<()> {
        if let Some(echo) = self.echo.as_mut() {
            echo.echo(&command.to_string());
        }
        self.sink.write_line(&command.to_bytes()).await
    }

    /// Wait for the next line from the module until `deadline`
    pub async fn next_line(&mut self, deadline: Instant) -> Received {
        let received = self.lines.recv_until(deadline).await;
        if let (Received::Line(line), Some(echo)) = (&received, self.echo.as_mut()) {
            echo.echo(&line.to_text());
        }
        received
    }
}
