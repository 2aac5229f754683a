//! Request/retry engine for ECHONET Lite over `SKSENDTO`

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::net::Ipv6Addr;
use std::time::Duration;
use tokio::time::Instant;
use wisun_core::{Frame, WisunError, WisunResult};
use wisun_session::{CommandDriver, CommandReply, Datagram, EventKind, SendMode, SkCommand};
use wisun_transport::{Line, LineSink, Received};

/// First wait after a failed transmission; doubled after each further failure
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Longest gap between lines while waiting for the response datagram
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// `EVENT 21` parameter: datagram sent
const SEND_OK: u8 = 0x00;
/// `EVENT 21` parameter: no PANA session
const SEND_NO_SESSION: u8 = 0x02;

/// A request in flight together with its retry state
#[derive(Debug)]
struct PendingRequest {
    frame: Frame,
    backoff: Duration,
    attempts: u32,
}

impl PendingRequest {
    fn new(frame: Frame, initial_backoff: Duration) -> Self {
        Self {
            frame,
            backoff: initial_backoff,
            attempts: 0,
        }
    }

    /// Assign a fresh transaction id and return the bytes to transmit
    fn next_attempt(&mut self, rng: &mut (dyn RngCore + Send)) -> Bytes {
        self.frame.regenerate_transaction_id(rng);
        self.attempts += 1;
        self.frame.encode()
    }

    async fn back_off(&mut self) {
        tokio::time::sleep(self.backoff).await;
        self.backoff *= 2;
    }
}

/// Sends request frames to the meter and waits for the matching response
pub struct RequestEngine {
    peer: Ipv6Addr,
    mode: SendMode,
    rng: Box<dyn RngCore + Send>,
    initial_backoff: Duration,
    response_timeout: Duration,
    max_attempts: Option<u32>,
}

impl RequestEngine {
    /// Create an engine for `peer` with an entropy-seeded random source
    pub fn new(peer: Ipv6Addr, mode: SendMode) -> Self {
        Self {
            peer,
            mode,
            rng: Box::new(StdRng::from_entropy()),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_attempts: None,
        }
    }

    /// Replace the source of transaction ids
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Limit transmission attempts; `None` retries until the datagram is sent
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn mode(&self) -> SendMode {
        self.mode
    }

    /// Send `request` and return the correlated response
    ///
    /// Every attempt carries a fresh transaction id. A transmission the
    /// module reports as failed is retried after a doubling backoff.
    ///
    /// # Errors
    ///
    /// * `WisunError::Unauthenticated` if the module has no PANA session
    /// * `WisunError::ReadTimeout` if no matching response arrived in time
    /// * `WisunError::RetriesExhausted` if the attempt limit was reached
    /// * Errors of the `SKSENDTO` command itself
    pub async fn execute<S: LineSink>(
        &mut self,
        driver: &mut CommandDriver<S>,
        request: Frame,
    ) -> WisunResult<Frame> {
        let mut pending = PendingRequest::new(request, self.initial_backoff);
        loop {
            let payload = pending.next_attempt(&mut *self.rng);
            let command = SkCommand::send_to(self.peer, self.mode.side(), payload);
            let reply = driver.send(&command).await?;

            match send_status(&reply) {
                Some(SEND_OK) => {
                    log::debug!("Datagram sent, waiting for response");
                    return self.await_response(driver, &pending.frame, &reply).await;
                }
                Some(SEND_NO_SESSION) => return Err(WisunError::Unauthenticated),
                status => {
                    if self.max_attempts.is_some_and(|max| pending.attempts >= max) {
                        return Err(WisunError::RetriesExhausted(pending.attempts));
                    }
                    log::warn!(
                        "Failed sending UDP (status {:?}), retrying in {:?}",
                        status,
                        pending.backoff
                    );
                    pending.back_off().await;
                }
            }
        }
    }

    async fn await_response<S: LineSink>(
        &self,
        driver: &mut CommandDriver<S>,
        request: &Frame,
        reply: &CommandReply,
    ) -> WisunResult<Frame> {
        // A quick meter may answer before the module prints OK
        for line in reply.lines() {
            if let Some(response) = self.match_response(line, request) {
                return Ok(response);
            }
        }

        loop {
            let deadline = Instant::now() + self.response_timeout;
            let line = match driver.next_line(deadline).await {
                Received::Line(line) => line,
                Received::Elapsed => return Err(WisunError::ReadTimeout),
                Received::Closed => return Err(WisunError::LinkClosed),
            };
            if let Some(response) = self.match_response(&line, request) {
                return Ok(response);
            }
        }
    }

    fn match_response(&self, line: &Line, request: &Frame) -> Option<Frame> {
        let datagram = match Datagram::parse(line, self.mode) {
            Ok(Some(datagram)) => datagram,
            Ok(None) => return None,
            Err(e) => {
                log::debug!("Skipping malformed notification: {}", e);
                return None;
            }
        };
        let frame = match Frame::decode(&datagram.payload) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Skipping undecodable datagram from {}: {}", datagram.sender, e);
                return None;
            }
        };
        if request.correlates(&frame) {
            Some(frame)
        } else {
            log::debug!("Skipping unrelated frame {}", frame);
            None
        }
    }
}

/// Status of the last `EVENT 21` in a `SKSENDTO` reply
fn send_status(reply: &CommandReply) -> Option<u8> {
    reply
        .events()
        .filter(|event| event.kind() == EventKind::UdpSendDone)
        .last()
        .and_then(|event| event.param())
}
