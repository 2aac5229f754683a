//! End-to-end polling against a simulated module on an in-memory stream

use rand::rngs::mock::StepRng;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use wisun_client::{MeterConfig, SmartMeterClient};
use wisun_session::{CommandDriver, JoinState};
use wisun_transport::{LineMultiplexer, LineWriter};

const METER: &str = "FE80:0000:0000:0000:021D:1290:1234:5678";
const REQUEST_LENGTH: usize = 16;

/// Minimal module: echoes every command, refuses datagrams until joined and
/// answers Get requests with a binary `ERXUDP` notification
async fn simulated_module(device: DuplexStream) {
    let (read, mut write) = tokio::io::split(device);
    let mut reader = BufReader::new(read);
    let mut joined = false;

    loop {
        let mut raw = Vec::new();
        if reader.read_until(b'\n', &mut raw).await.unwrap() == 0 {
            return;
        }
        let command = raw.strip_suffix(b"\r\n").unwrap().to_vec();

        let mut out = command.clone();
        out.extend_from_slice(b"\r\n");
        if command.starts_with(b"SKSENDTO ") {
            if !joined {
                out.extend_from_slice(format!("EVENT 21 {} 02\r\nOK\r\n", METER).as_bytes());
            } else {
                let request = &command[command.len() - REQUEST_LENGTH..];
                let mut response = vec![0x10, 0x81, request[2], request[3]];
                response.extend_from_slice(&[0x02, 0x88, 0x01, 0x05, 0xFF, 0x01, 0x72, 0x02]);
                response.extend_from_slice(&[0xE7, 0x04, 0x00, 0x00, 0x01, 0xF4]);
                response.extend_from_slice(&[0xE8, 0x04, 0x00, 0x1E, 0x7F, 0xFE]);

                out.extend_from_slice(format!("EVENT 21 {} 00\r\nOK\r\n", METER).as_bytes());
                out.extend_from_slice(
                    format!(
                        "ERXUDP {} FE80:0000:0000:0000:021D:1290:0003:C890 0E1A 0E1A 001D129012345678 1 {:04X} ",
                        METER,
                        response.len()
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(&response);
                out.extend_from_slice(b"\r\n");
            }
        } else if command.starts_with(b"SKJOIN ") {
            out.extend_from_slice(format!("OK\r\nEVENT 25 {}\r\n", METER).as_bytes());
            joined = true;
        } else {
            out.extend_from_slice(b"OK\r\n");
        }
        write.write_all(&out).await.unwrap();
    }
}

#[tokio::test]
async fn test_poll_meter_over_stream() {
    let (host, device) = tokio::io::duplex(1024);
    tokio::spawn(simulated_module(device));

    let (read, write) = tokio::io::split(host);
    let (lines, _reader) = LineMultiplexer::spawn(read);
    let driver = CommandDriver::new(LineWriter::new(write), lines);

    let config = MeterConfig::builder()
        .serial("/dev/null")
        .route_b("00112233445566778899AABBCCDDEEFF", "0123456789AB")
        .pan(0x21, 0x8888, "fe80::21d:1290:1234:5678".parse().unwrap())
        .debug(true)
        .build()
        .unwrap();
    let mut client = SmartMeterClient::new(config, driver)
        .unwrap()
        .with_rng(StepRng::new(0x0100, 0x0101));

    let reading = client.read_instantaneous().await.unwrap();
    assert_eq!(client.join_state(), JoinState::Authenticated);
    assert_eq!(reading.power, Some(500));
    assert_eq!(reading.current_r, Some(3.0));
    assert_eq!(reading.current_t, None);

    // The session survives for the next poll
    let reading = client.read_instantaneous().await.unwrap();
    assert_eq!(reading.power, Some(500));
}
