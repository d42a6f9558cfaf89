//! Control-channel settings, read from the document's `main` subtree.
//!
//! ```text
//! "main": {
//!   "mqtt_host": "broker.local",
//!   "mqtt_port": 1883,
//!   "mqtt_username": "pi", "mqtt_password": "secret",
//!   "mqtt_keepalive": 60,
//!   "mqtt_topics": ["devices/pi-1/config", {"topic": "fleet/config", "qos": 1}],
//!   "detection_topic": "devices/pi-1/detections",
//!   "report_topic": "devices/pi-1/reports"
//! }
//! ```
//!
//! Upper-case keys (`MQTT_HOST`, ...) are accepted as aliases.

use std::time::Duration;

use rumqttc::{MqttOptions, QoS, SubscribeFilter};
use serde::Deserialize;

use crate::config::ConfigDocument;
use crate::error::{ConfigError, ControlError};

/// Name of the subtree holding these settings.
pub const SECTION: &str = "main";

const MIN_KEEPALIVE: Duration = Duration::from_secs(5);

/// Broker connection and topic settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ControlSettings {
    /// Broker host name or address.
    #[serde(alias = "MQTT_HOST")]
    pub mqtt_host: String,
    /// Broker port.
    #[serde(default = "default_port", alias = "MQTT_PORT")]
    pub mqtt_port: u16,
    /// Login user.
    #[serde(default, alias = "MQTT_USERNAME")]
    pub mqtt_username: Option<String>,
    /// Login password.
    #[serde(default, alias = "MQTT_PASSWORD")]
    pub mqtt_password: Option<String>,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive", alias = "MQTT_KEEPALIVE")]
    pub mqtt_keepalive: u64,
    /// Client identifier; `edgevisor-<pid>` when absent.
    #[serde(default, alias = "MQTT_CLIENT_ID")]
    pub mqtt_client_id: Option<String>,
    /// Control topics carrying configuration documents.
    #[serde(default, alias = "MQTT_TOPICS")]
    pub mqtt_topics: Vec<TopicSpec>,
    /// Where worker detections are published.
    #[serde(default, alias = "DETECTION_TOPIC")]
    pub detection_topic: Option<String>,
    /// Where failure reports are published.
    #[serde(default, alias = "REPORT_TOPIC")]
    pub report_topic: Option<String>,
}

fn default_port() -> u16 {
    1883
}

fn default_keepalive() -> u64 {
    60
}

/// One control topic: a bare name (QoS 0) or `{topic, qos}`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TopicSpec {
    /// Topic filter subscribed at QoS 0.
    Bare(String),
    /// Topic filter with an explicit QoS level.
    Qualified {
        /// Topic filter.
        topic: String,
        /// 0, 1 or 2.
        #[serde(default)]
        qos: u8,
    },
}

impl TopicSpec {
    /// Topic filter.
    pub fn topic(&self) -> &str {
        match self {
            TopicSpec::Bare(t) => t,
            TopicSpec::Qualified { topic, .. } => topic,
        }
    }

    /// Requested QoS level.
    pub fn level(&self) -> u8 {
        match self {
            TopicSpec::Bare(_) => 0,
            TopicSpec::Qualified { qos, .. } => *qos,
        }
    }
}

/// Maps a numeric level to [`QoS`].
pub fn qos_from_level(topic: &str, level: u8) -> Result<QoS, ControlError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        qos => Err(ControlError::InvalidQos {
            topic: topic.to_string(),
            qos,
        }),
    }
}

impl ControlSettings {
    /// Reads the `main` subtree.
    pub fn from_document(doc: &ConfigDocument) -> Result<Self, ConfigError> {
        if doc.subtree(SECTION).is_none() {
            return Err(ConfigError::MissingKey {
                key: SECTION.to_string(),
            });
        }
        doc.section(SECTION)
    }

    /// Effective client identifier.
    pub fn client_id(&self) -> String {
        self.mqtt_client_id
            .clone()
            .unwrap_or_else(|| format!("edgevisor-{}", std::process::id()))
    }

    /// Subscription requests for every control topic.
    pub fn subscriptions(&self) -> Result<Vec<SubscribeFilter>, ControlError> {
        self.mqtt_topics
            .iter()
            .map(|t| Ok(SubscribeFilter::new(t.topic().to_string(), qos_from_level(t.topic(), t.level())?)))
            .collect()
    }

    /// Client options. Keep-alive is raised to the client's 5 s minimum.
    pub fn mqtt_options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(self.client_id(), self.mqtt_host.clone(), self.mqtt_port);
        opts.set_keep_alive(Duration::from_secs(self.mqtt_keepalive).max(MIN_KEEPALIVE))
            .set_clean_session(true);
        if let Some(user) = &self.mqtt_username {
            opts.set_credentials(user.clone(), self.mqtt_password.clone().unwrap_or_default());
        }
        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(main: serde_json::Value) -> ConfigDocument {
        let mut root = serde_json::Map::new();
        root.insert("module".into(), "wifi".into());
        root.insert("main".into(), main);
        ConfigDocument::from(root)
    }

    #[test]
    fn reads_legacy_upper_case_keys() {
        let s = ControlSettings::from_document(&doc(serde_json::json!({
            "MQTT_HOST": "10.0.0.2",
            "MQTT_PORT": 8883,
            "MQTT_USERNAME": "pi",
            "MQTT_PASSWORD": "pw",
            "MQTT_TOPICS": ["devices/pi-1/config"]
        })))
        .unwrap();
        assert_eq!(s.mqtt_host, "10.0.0.2");
        assert_eq!(s.mqtt_port, 8883);
        assert_eq!(s.mqtt_keepalive, 60);
        assert_eq!(s.mqtt_topics, vec![TopicSpec::Bare("devices/pi-1/config".into())]);
    }

    #[test]
    fn subscriptions_carry_qos() {
        let s = ControlSettings::from_document(&doc(serde_json::json!({
            "mqtt_host": "broker",
            "mqtt_topics": ["a", {"topic": "b", "qos": 2}]
        })))
        .unwrap();
        let subs = s.subscriptions().unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].path, "a");
        assert_eq!(subs[0].qos, QoS::AtMostOnce);
        assert_eq!(subs[1].qos, QoS::ExactlyOnce);
    }

    #[test]
    fn invalid_qos_and_missing_section() {
        let s = ControlSettings::from_document(&doc(serde_json::json!({
            "mqtt_host": "broker",
            "mqtt_topics": [{"topic": "b", "qos": 3}]
        })))
        .unwrap();
        assert_eq!(s.subscriptions().unwrap_err().as_label(), "control_invalid_qos");

        let empty = ConfigDocument::parse(br#"{"module":"wifi"}"#).unwrap();
        assert!(matches!(
            ControlSettings::from_document(&empty),
            Err(ConfigError::MissingKey { .. })
        ));
    }

    #[test]
    fn keepalive_is_clamped() {
        let s = ControlSettings::from_document(&doc(serde_json::json!({
            "mqtt_host": "broker",
            "mqtt_keepalive": 1,
            "mqtt_client_id": "pi-1"
        })))
        .unwrap();
        let opts = s.mqtt_options();
        assert_eq!(opts.keep_alive(), Duration::from_secs(5));
        assert_eq!(opts.client_id(), "pi-1");
    }
}
