//! `wifi/esp8266`: probe sightings reported by an external board over serial.
//!
//! The board prints one `mac,rssi,ssid` line per probe request; the SSID may be
//! empty and may itself contain commas.

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::{WifiSettings, normalize_mac};
use crate::error::WorkerError;
use crate::modules::Detection;
use crate::worker::{Emit, Module};

/// Probe sniffer fed by a serial-attached board.
pub struct WifiExternalSniffer {
    settings: WifiSettings,
}

impl WifiExternalSniffer {
    /// Creates the sniffer.
    pub fn new(settings: WifiSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Module for WifiExternalSniffer {
    fn name(&self) -> &str {
        "wifi/esp8266"
    }

    async fn run(&self, ctx: CancellationToken, out: &dyn Emit) -> Result<(), WorkerError> {
        let device = &self.settings.serial_device;
        let file = File::open(device)
            .await
            .map_err(|e| WorkerError::failed(format!("{device}: {e}")))?;
        log::info!(target: "edgevisor::wifi", "reading sightings from {device}");

        let mut lines = BufReader::new(file).lines();
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                line = lines.next_line() => match line {
                    Ok(Some(line)) => match parse_serial_line(&line) {
                        Some(d) => out.emit(&d.to_line()),
                        None => log::debug!(target: "edgevisor::wifi", "skipping serial line {line:?}"),
                    },
                    Ok(None) => return Err(WorkerError::failed(format!("{device} closed"))),
                    Err(e) => return Err(WorkerError::failed(format!("{device}: {e}"))),
                }
            }
        }
    }
}

/// Parses one `mac,rssi,ssid` line.
pub fn parse_serial_line(line: &str) -> Option<Detection> {
    let mut fields = line.trim().splitn(3, ',');
    let mac = normalize_mac(fields.next()?)?;
    let rssi = fields.next().and_then(|v| v.trim().parse::<i32>().ok());
    let ssid = fields
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some(Detection::Probe { mac, rssi, ssid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn parses_csv_lines() {
        assert_eq!(
            parse_serial_line("AA:BB:CC:DD:EE:01,-72,Cafe, Free WiFi\r"),
            Some(Detection::Probe {
                mac: "aa:bb:cc:dd:ee:01".into(),
                rssi: Some(-72),
                ssid: Some("Cafe, Free WiFi".into()),
            })
        );
        assert_eq!(
            parse_serial_line("aa:bb:cc:dd:ee:02,-40,"),
            Some(Detection::Probe {
                mac: "aa:bb:cc:dd:ee:02".into(),
                rssi: Some(-40),
                ssid: None,
            })
        );
        assert_eq!(parse_serial_line("boot: esp8266 sniffer v2"), None);
        assert_eq!(parse_serial_line(""), None);
    }

    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl Emit for Lines {
        fn emit(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    #[tokio::test]
    async fn end_of_device_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("ttyUSB0");
        std::fs::write(&device, "aa:bb:cc:dd:ee:ff,-50,Lab\nnoise\n").unwrap();

        let settings: WifiSettings =
            serde_json::from_value(serde_json::json!({ "serial_device": device })).unwrap();
        let out = Lines::default();
        let err = WifiExternalSniffer::new(settings)
            .run(CancellationToken::new(), &out)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("closed"));
        assert_eq!(
            out.0.lock().unwrap().as_slice(),
            [r#"{"kind":"probe","mac":"aa:bb:cc:dd:ee:ff","rssi":-50,"ssid":"Lab"}"#]
        );
    }
}
