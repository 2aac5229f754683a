//! PANA authentication (join) handshake

use crate::command::SkCommand;
use crate::driver::CommandDriver;
use crate::notification::{Event, EventKind};
use crate::state::JoinState;
use crate::{WisunError, WisunResult};
use std::net::Ipv6Addr;
use std::time::Duration;
use tokio::time::Instant;
use wisun_core::JoinTimeout;
use wisun_transport::{LineSink, Received};

/// Default bound for one join attempt
pub const DEFAULT_JOIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound for the whole join, retries included
pub const DEFAULT_JOIN_TOTAL_TIMEOUT: Duration = Duration::from_secs(20);

/// Route-B credentials and the meter's network coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanaCredentials {
    pub route_b_id: String,
    pub password: String,
    pub channel: u8,
    pub pan_id: u16,
    pub peer_address: Ipv6Addr,
}

/// Runs the join handshake and tracks its `JoinState`
#[derive(Debug)]
pub struct PanaAuthenticator {
    credentials: PanaCredentials,
    attempt_timeout: Duration,
    total_timeout: Duration,
    state: JoinState,
}

impl PanaAuthenticator {
    pub fn new(credentials: PanaCredentials) -> Self {
        Self {
            credentials,
            attempt_timeout: DEFAULT_JOIN_ATTEMPT_TIMEOUT,
            total_timeout: DEFAULT_JOIN_TOTAL_TIMEOUT,
            state: JoinState::default(),
        }
    }

    pub fn with_timeouts(mut self, attempt: Duration, total: Duration) -> Self {
        self.attempt_timeout = attempt;
        self.total_timeout = total;
        self
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    pub fn credentials(&self) -> &PanaCredentials {
        &self.credentials
    }

    /// Configure the credentials, issue `SKJOIN` and wait for the outcome
    ///
    /// A PANA failure event (`EVENT 24`) re-issues the join and restarts the
    /// attempt deadline; the total deadline keeps running. Calling this again
    /// after success or failure starts over from `Idle`.
    ///
    /// # Errors
    ///
    /// * Errors of the setup and join commands, unchanged
    /// * `WisunError::JoinFailed` when the attempt or total deadline expires,
    ///   including while the join command itself is unanswered
    /// * `WisunError::LinkClosed` if the line queue closed
    pub async fn authenticate<S: LineSink>(
        &mut self,
        driver: &mut CommandDriver<S>,
    ) -> WisunResult<()> {
        if self.state.is_terminal() {
            self.transition(JoinState::Idle)?;
        }

        let result = self.run(driver).await;
        if let Err(e) = &result {
            log::error!("PANA authentication failed: {}", e);
            self.transition(JoinState::Failed)?;
        }
        result
    }

    async fn run<S: LineSink>(&mut self, driver: &mut CommandDriver<S>) -> WisunResult<()> {
        let setup = [
            SkCommand::set_password(&self.credentials.password),
            SkCommand::set_route_b_id(&self.credentials.route_b_id),
            SkCommand::set_channel(self.credentials.channel),
            SkCommand::set_pan_id(self.credentials.pan_id),
        ];
        for command in &setup {
            driver.send(command).await?;
        }
        self.transition(JoinState::CredentialsSet)?;

        let peer = self.credentials.peer_address;
        let join = SkCommand::join(peer);
        self.transition(JoinState::Joining)?;
        log::info!("Starting PANA authentication with {}", peer);

        let start = Instant::now();
        let total_deadline = start + self.total_timeout;
        let mut attempt_deadline = start + self.attempt_timeout;

        // The join reply is read under the join deadlines, not the driver's
        // idle timeout; events may arrive before or after its OK
        driver.write(&join).await?;
        loop {
            let line = match driver.next_line(attempt_deadline.min(total_deadline)).await {
                Received::Line(line) => line,
                Received::Closed => return Err(WisunError::LinkClosed),
                Received::Elapsed => {
                    let which = if Instant::now() >= total_deadline {
                        JoinTimeout::Total
                    } else {
                        JoinTimeout::Attempt
                    };
                    return Err(WisunError::JoinFailed(which));
                }
            };
            if line.starts_with("FAIL ") {
                return Err(WisunError::CommandRejected(line.to_string()));
            }

            match Event::parse(&line).map(|event| event.kind()) {
                Some(EventKind::PanaCompleted) => {
                    self.transition(JoinState::Authenticated)?;
                    log::info!("PANA authentication completed");
                    return Ok(());
                }
                Some(EventKind::PanaFailed) => {
                    log::warn!("PANA connection error, retrying join");
                    driver.write(&join).await?;
                    attempt_deadline = Instant::now() + self.attempt_timeout;
                }
                _ => {}
            }
        }
    }

    fn transition(&mut self, next: JoinState) -> WisunResult<()> {
        self.state.validate_transition(next)?;
        log::debug!("Join state {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
        Ok(())
    }
}
