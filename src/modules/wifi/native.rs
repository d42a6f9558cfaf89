//! `wifi/native`: on-board interface in monitor mode plus a packet capture.
//!
//! ```text
//! run()
//!   ├─► ip link set IF down; iw dev IF set type monitor; ip link set IF up [; iw dev IF set channel N]
//!   ├─► spawn: tcpdump -l -e -n -i IF type mgt subtype probe-req
//!   │     └─ each line ─► parse_probe_line ─► Detection::Probe ─► emit
//!   └─► always: stop capture, ip link set IF down; iw dev IF set type managed; ip link set IF up
//! ```

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{WifiSettings, normalize_mac};
use crate::error::WorkerError;
use crate::modules::Detection;
use crate::worker::{Emit, Module, terminate_child};

const CAPTURE_GRACE: Duration = Duration::from_secs(3);

/// Probe sniffer on the device's own wireless interface.
pub struct WifiNativeSniffer {
    settings: WifiSettings,
}

impl WifiNativeSniffer {
    /// Creates the sniffer.
    pub fn new(settings: WifiSettings) -> Self {
        Self { settings }
    }

    async fn set_mode(&self, mode: &str) -> Result<(), WorkerError> {
        let iface = self.settings.interface.as_str();
        run_tool("ip", &["link", "set", iface, "down"]).await?;
        run_tool("iw", &["dev", iface, "set", "type", mode]).await?;
        run_tool("ip", &["link", "set", iface, "up"]).await
    }

    async fn capture(&self, ctx: &CancellationToken, out: &dyn Emit) -> Result<(), WorkerError> {
        if let Some(channel) = self.settings.channel {
            let channel = channel.to_string();
            let iface = self.settings.interface.as_str();
            run_tool("iw", &["dev", iface, "set", "channel", channel.as_str()]).await?;
        }

        let mut child = Command::new(&self.settings.capture_program)
            .args(["-l", "-e", "-n", "-i", self.settings.interface.as_str()])
            .args(["type", "mgt", "subtype", "probe-req"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::failed(format!("{}: {e}", self.settings.capture_program)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::failed("capture stdout unavailable"))?;
        let mut lines = BufReader::new(stdout).lines();

        let result = loop {
            tokio::select! {
                _ = ctx.cancelled() => break Ok(()),
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(d) = parse_probe_line(&line) {
                            out.emit(&d.to_line());
                        }
                    }
                    Ok(None) => break Err(WorkerError::failed("capture program exited")),
                    Err(e) => break Err(WorkerError::failed(format!("capture read failed: {e}"))),
                }
            }
        };

        terminate_child(&mut child, &self.settings.capture_program, CAPTURE_GRACE).await;
        result
    }
}

#[async_trait]
impl Module for WifiNativeSniffer {
    fn name(&self) -> &str {
        "wifi/native"
    }

    async fn run(&self, ctx: CancellationToken, out: &dyn Emit) -> Result<(), WorkerError> {
        if let Err(e) = self.set_mode("monitor").await {
            let _ = self.set_mode("managed").await;
            return Err(e);
        }
        log::info!(target: "edgevisor::wifi", "{} in monitor mode", self.settings.interface);

        let result = self.capture(&ctx, out).await;

        match self.set_mode("managed").await {
            Ok(()) => log::info!(target: "edgevisor::wifi", "{} back in managed mode", self.settings.interface),
            Err(e) => log::error!(target: "edgevisor::wifi", "failed to restore managed mode: {e}"),
        }
        result
    }
}

async fn run_tool(program: &str, args: &[&str]) -> Result<(), WorkerError> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| WorkerError::failed(format!("{program}: {e}")))?;
    if status.success() {
        Ok(())
    } else {
        Err(WorkerError::failed(format!("{program} {}: {status}", args.join(" "))))
    }
}

/// Parses one line of `tcpdump -e` output for a probe request.
///
/// ```text
/// 12:00:01.5 1.0 Mb/s 2412 MHz 11b -67dBm signal antenna 1 BSSID:Broadcast DA:Broadcast SA:aa:bb:cc:dd:ee:ff (oui Unknown) Probe Request (HomeNet) [1.0 2.0 5.5 11.0 Mbit]
/// ```
pub fn parse_probe_line(line: &str) -> Option<Detection> {
    let probe_at = line.find("Probe Request")?;

    let mac = line
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("SA:"))
        .and_then(normalize_mac)?;

    let rssi = line
        .split_whitespace()
        .find_map(|tok| tok.strip_suffix("dBm"))
        .and_then(|v| v.parse::<i32>().ok());

    let ssid = line[probe_at..]
        .find('(')
        .map(|open| &line[probe_at + open + 1..])
        .and_then(|rest| {
            // SSIDs may hold parentheses; the rates block follows the closing one.
            let close = rest.find(") [").or_else(|| rest.find(')'))?;
            Some(&rest[..close])
        })
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(Detection::Probe { mac, rssi, ssid })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_probe() {
        let line = "12:00:01.512 1.0 Mb/s 2412 MHz 11b -67dBm signal antenna 1 BSSID:Broadcast \
                    DA:Broadcast SA:AA:bb:cc:dd:ee:ff (oui Unknown) Probe Request (Home Net) \
                    [1.0 2.0 5.5 11.0 Mbit]";
        assert_eq!(
            parse_probe_line(line),
            Some(Detection::Probe {
                mac: "aa:bb:cc:dd:ee:ff".into(),
                rssi: Some(-67),
                ssid: Some("Home Net".into()),
            })
        );
    }

    #[test]
    fn ssid_stops_at_rates_block() {
        let line = "12:00:04 -58dBm signal SA:00:11:22:33:44:55 Probe Request (Lab (2.4)) \
                    [1.0* 2.0* 5.5 11.0 Mbit] (0x0) IV:0";
        match parse_probe_line(line) {
            Some(Detection::Probe { ssid, .. }) => assert_eq!(ssid.as_deref(), Some("Lab (2.4)")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn wildcard_probe_has_no_ssid() {
        let line = "12:00:02 -80dBm signal SA:00:11:22:33:44:55 Probe Request () [1.0 Mbit]";
        match parse_probe_line(line) {
            Some(Detection::Probe { ssid, rssi, .. }) => {
                assert_eq!(ssid, None);
                assert_eq!(rssi, Some(-80));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ignores_other_frames() {
        assert_eq!(parse_probe_line("12:00:03 -50dBm signal SA:00:11:22:33:44:55 Beacon (x)"), None);
        assert_eq!(parse_probe_line("tcpdump: listening on wlan0mon"), None);
        assert_eq!(parse_probe_line("Probe Request (x) SA:nope"), None);
    }
}
