//! Smart-meter polling client
//!
//! The client first tries a read directly, since the module may still hold
//! a PANA session from an earlier run. If that fails it authenticates once
//! and retries a bounded number of times.

use crate::config::MeterConfig;
use crate::request::RequestEngine;
use rand::RngCore;
use wisun_core::{
    ClassCode, Frame, MeterReading, PropertyCode, PropertyMap, ServiceCode, WisunError,
    WisunResult,
};
use wisun_session::{CommandDriver, JoinState, LogEcho, PanaAuthenticator};
use wisun_transport::{LineSink, SerialLink, SerialWriter};

/// Reads properties of a low-voltage smart electric meter
pub struct SmartMeterClient<S> {
    config: MeterConfig,
    driver: CommandDriver<S>,
    auth: PanaAuthenticator,
    engine: RequestEngine,
}

impl SmartMeterClient<SerialWriter> {
    /// Open the configured serial port and create a client on it
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the port cannot
    /// be opened
    pub fn connect(config: MeterConfig) -> WisunResult<Self> {
        config.validate()?;
        let link = SerialLink::open(&config.serial_settings())?;
        log::info!("Connected to Wi-SUN module on {}", config.serial_port);
        Self::new(config, CommandDriver::new(link.writer, link.lines))
    }
}

impl<S: LineSink> SmartMeterClient<S> {
    /// Create a client on an existing driver
    ///
    /// The driver's idle timeout is taken from the configuration, and in
    /// debug mode all traffic is echoed through the log.
    pub fn new(config: MeterConfig, driver: CommandDriver<S>) -> WisunResult<Self> {
        config.validate()?;

        let mut driver = driver.with_idle_timeout(config.timeouts.command_idle());
        if config.debug {
            driver = driver.with_echo(LogEcho);
        }
        let auth = PanaAuthenticator::new(config.credentials())
            .with_timeouts(config.timeouts.join_attempt(), config.timeouts.join_total());
        let engine = RequestEngine::new(config.peer_address, config.send_mode())
            .with_initial_backoff(config.timeouts.initial_backoff())
            .with_response_timeout(config.timeouts.response_idle())
            .with_max_attempts(config.max_send_attempts);

        Ok(Self {
            config,
            driver,
            auth,
            engine,
        })
    }

    /// Replace the source of transaction ids
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.engine = self.engine.with_rng(rng);
        self
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    pub fn join_state(&self) -> JoinState {
        self.auth.state()
    }

    /// Run the PANA handshake now
    pub async fn authenticate(&mut self) -> WisunResult<()> {
        self.auth.authenticate(&mut self.driver).await
    }

    /// Read `codes` from the meter with a Get request
    ///
    /// # Errors
    ///
    /// * `WisunError::NotAvailable` if the meter answered Get_SNA
    /// * `WisunError::LinkClosed` as soon as the serial link is lost
    /// * Authentication errors, unchanged
    /// * The last read error if every attempt failed
    pub async fn read_properties(&mut self, codes: &[PropertyCode]) -> WisunResult<PropertyMap> {
        let request = Frame::request(ClassCode::SMART_ELECTRIC_METER, ServiceCode::GET, codes)?;

        let first = match self.engine.execute(&mut self.driver, request.clone()).await {
            Ok(response) => return into_properties(response),
            Err(WisunError::LinkClosed) => return Err(WisunError::LinkClosed),
            Err(e) => e,
        };
        log::warn!("ECHONET Lite request error: {}", first);

        self.authenticate().await?;

        let attempts = self.config.max_read_attempts;
        let mut last = first;
        for attempt in 1..=attempts {
            match self.engine.execute(&mut self.driver, request.clone()).await {
                Ok(response) => return into_properties(response),
                Err(WisunError::LinkClosed) => return Err(WisunError::LinkClosed),
                Err(e) => {
                    log::warn!(
                        "ECHONET Lite request error (attempt {}/{}): {}",
                        attempt,
                        attempts,
                        e
                    );
                    last = e;
                }
            }
        }
        Err(last)
    }

    /// Read instantaneous power and current
    pub async fn read_instantaneous(&mut self) -> WisunResult<MeterReading> {
        let properties = self
            .read_properties(&[
                PropertyCode::INSTANTANEOUS_POWER,
                PropertyCode::INSTANTANEOUS_CURRENT,
            ])
            .await?;
        MeterReading::from_properties(&properties)
    }

    /// Read cumulative energy in both directions, scaled to kWh
    pub async fn read_cumulative_energy(&mut self) -> WisunResult<MeterReading> {
        let properties = self
            .read_properties(&[
                PropertyCode::CUMULATIVE_ENERGY_UNIT,
                PropertyCode::CUMULATIVE_ENERGY_NORMAL,
                PropertyCode::CUMULATIVE_ENERGY_REVERSE,
            ])
            .await?;
        MeterReading::from_properties(&properties)
    }
}

fn into_properties(response: Frame) -> WisunResult<PropertyMap> {
    if response.service().is_not_available() {
        let missing = response
            .properties()
            .iter()
            .filter(|p| p.value().is_empty())
            .map(|p| p.code())
            .collect();
        return Err(WisunError::NotAvailable(missing));
    }
    Ok(response.into_property_map())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use std::time::Duration;
    use wisun_session::mock::ScriptedSink;

    const EVENT_SENT: &str = "EVENT 21 FE80:0000:0000:0000:021D:1290:1234:5678 00";
    const EVENT_NO_SESSION: &str = "EVENT 21 FE80:0000:0000:0000:021D:1290:1234:5678 02";
    const EVENT_JOINED: &str = "EVENT 25 FE80:0000:0000:0000:021D:1290:1234:5678";

    fn config() -> MeterConfig {
        MeterConfig::builder()
            .serial("/dev/ttyUSB0")
            .route_b("00112233445566778899AABBCCDDEEFF", "0123456789AB")
            .pan(0x21, 0x8888, "fe80::21d:1290:1234:5678".parse().unwrap())
            .build()
            .unwrap()
    }

    fn erxudp(frame_hex: &str) -> String {
        format!(
            "ERXUDP FE80:0000:0000:0000:021D:1290:1234:5678 FE80:0000:0000:0000:021D:1290:0003:C890 \
             0E1A 0E1A 001D129012345678 1 {:04X} {}",
            frame_hex.len() / 2,
            frame_hex
        )
    }

    fn client(sink: ScriptedSink, lines: wisun_transport::LineReceiver) -> SmartMeterClient<ScriptedSink> {
        SmartMeterClient::new(config(), CommandDriver::new(sink, lines))
            .unwrap()
            .with_rng(StepRng::new(1, 1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_without_authentication() {
        let (sink, lines, sent) = ScriptedSink::new();
        let response = erxudp("1081000102880105FF017202E70400000258E80400140064");
        sink.reply(&[EVENT_SENT, "OK", response.as_str()]);
        let mut client = client(sink, lines);

        let reading = client.read_instantaneous().await.unwrap();
        assert_eq!(reading.power, Some(600));
        assert_eq!(reading.current_r, Some(2.0));
        assert_eq!(reading.current_t, Some(10.0));
        assert_eq!(sent.commands().len(), 1);
        assert_eq!(client.join_state(), JoinState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticates_after_first_failure() {
        let (sink, lines, sent) = ScriptedSink::new();
        sink.reply(&[EVENT_NO_SESSION, "OK"]);
        for _ in 0..4 {
            sink.reply(&["OK"]);
        }
        sink.reply_timed(&[(Duration::ZERO, "OK"), (Duration::from_secs(3), EVENT_JOINED)]);
        let response = erxudp("1081000202880105FF017201E70400000258");
        sink.reply(&[EVENT_SENT, "OK", response.as_str()]);
        let mut client = client(sink, lines);

        let properties = client
            .read_properties(&[PropertyCode::INSTANTANEOUS_POWER])
            .await
            .unwrap();
        assert_eq!(
            properties[&PropertyCode::INSTANTANEOUS_POWER].as_ref(),
            &[0x00, 0x00, 0x02, 0x58]
        );
        assert_eq!(client.join_state(), JoinState::Authenticated);
        assert_eq!(sent.matching("SKSENDTO ").len(), 2);
        assert_eq!(sent.matching("SKJOIN ").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_available() {
        let (sink, lines, _sent) = ScriptedSink::new();
        let response = erxudp("1081000102880105FF015201E700");
        sink.reply(&[EVENT_SENT, "OK", response.as_str()]);
        let mut client = client(sink, lines);

        match client.read_properties(&[PropertyCode::INSTANTANEOUS_POWER]).await {
            Err(WisunError::NotAvailable(codes)) => {
                assert_eq!(codes, vec![PropertyCode::INSTANTANEOUS_POWER])
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_read_attempts() {
        let (sink, lines, sent) = ScriptedSink::new();
        sink.reply(&[EVENT_SENT, "OK"]);
        for _ in 0..4 {
            sink.reply(&["OK"]);
        }
        sink.reply(&[EVENT_JOINED, "OK"]);
        for _ in 0..3 {
            sink.reply(&[EVENT_SENT, "OK"]);
        }
        let mut client = client(sink, lines);

        let err = client
            .read_properties(&[PropertyCode::INSTANTANEOUS_POWER])
            .await
            .unwrap_err();
        assert!(matches!(err, WisunError::ReadTimeout));
        assert_eq!(sent.matching("SKSENDTO ").len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_failure_propagates() {
        let (sink, lines, sent) = ScriptedSink::new();
        sink.reply(&[EVENT_NO_SESSION, "OK"]);
        sink.reply(&["FAIL ER10"]);
        let mut client = client(sink, lines);

        assert!(matches!(
            client.read_properties(&[PropertyCode::INSTANTANEOUS_POWER]).await,
            Err(WisunError::CommandRejected(_))
        ));
        assert_eq!(client.join_state(), JoinState::Failed);
        assert_eq!(sent.matching("SKSENDTO ").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_closed_is_not_retried() {
        let (sink, lines, sent) = ScriptedSink::new();
        sink.hang_up();
        let mut client = client(sink, lines);

        assert!(matches!(
            client.read_instantaneous().await,
            Err(WisunError::LinkClosed)
        ));
        assert_eq!(sent.commands().len(), 1);
    }
}
