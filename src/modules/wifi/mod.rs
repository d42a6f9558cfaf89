//! Wi-Fi probe sniffers.
//!
//! Both submodules share the `wifi` settings subtree:
//!
//! | key               | default        | used by  |
//! |-------------------|----------------|----------|
//! | `interface`       | `wlan0`        | native   |
//! | `channel`         | none (hopping) | native   |
//! | `capture_program` | `tcpdump`      | native   |
//! | `serial_device`   | `/dev/ttyUSB0` | esp8266  |

mod external;
mod native;

use serde::Deserialize;

pub use external::{WifiExternalSniffer, parse_serial_line};
pub use native::{WifiNativeSniffer, parse_probe_line};

/// `wifi` settings subtree.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct WifiSettings {
    /// Wireless interface switched to monitor mode.
    #[serde(default = "default_interface", alias = "INTERFACE")]
    pub interface: String,
    /// Fixed channel; the driver's current channel when absent.
    #[serde(default, alias = "CHANNEL")]
    pub channel: Option<u8>,
    /// Packet capture program (tcpdump-compatible output).
    #[serde(default = "default_capture_program")]
    pub capture_program: String,
    /// Serial device of the external sniffer board.
    #[serde(default = "default_serial_device", alias = "SERIAL_DEVICE")]
    pub serial_device: String,
}

fn default_interface() -> String {
    "wlan0".to_string()
}

fn default_capture_program() -> String {
    "tcpdump".to_string()
}

fn default_serial_device() -> String {
    "/dev/ttyUSB0".to_string()
}

/// Normalizes a colon-separated MAC address to lower case, or `None` if `s`
/// is not one.
pub(crate) fn normalize_mac(s: &str) -> Option<String> {
    let s = s.trim();
    let parts: Vec<&str> = s.split(':').collect();
    let valid = parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()));
    valid.then(|| s.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_and_bad_types() {
        let s: WifiSettings = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(s.interface, "wlan0");
        assert_eq!(s.serial_device, "/dev/ttyUSB0");
        assert_eq!(s.channel, None);

        let bad = serde_json::from_value::<WifiSettings>(serde_json::json!({"channel": "six"}));
        assert!(bad.is_err());
    }

    #[test]
    fn mac_normalization() {
        assert_eq!(normalize_mac("AA:bb:CC:00:11:22").as_deref(), Some("aa:bb:cc:00:11:22"));
        assert_eq!(normalize_mac("aa:bb:cc:00:11"), None);
        assert_eq!(normalize_mac("zz:bb:cc:00:11:22"), None);
    }
}
