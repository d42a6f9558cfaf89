//! Detection records printed by workers, one JSON object per line.

use serde::{Deserialize, Serialize};

/// One sighting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detection {
    /// Object found by the camera detector.
    Object {
        /// Class label (`person`, ...).
        label: String,
        /// Detector score in `0.0..=1.0`.
        confidence: f32,
        /// `[x, y, width, height]` in frame pixels.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bbox: Option<[i32; 4]>,
    },
    /// Wi-Fi probe request.
    Probe {
        /// Source MAC address, lower-case.
        mac: String,
        /// Signal strength in dBm.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rssi: Option<i32>,
        /// Requested network, absent for wildcard probes.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ssid: Option<String>,
    },
}

impl Detection {
    /// Serializes as a single JSON line (no trailing newline).
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_line_omits_absent_fields() {
        let d = Detection::Probe {
            mac: "aa:bb:cc:dd:ee:ff".into(),
            rssi: Some(-61),
            ssid: None,
        };
        assert_eq!(d.to_line(), r#"{"kind":"probe","mac":"aa:bb:cc:dd:ee:ff","rssi":-61}"#);
    }
}
