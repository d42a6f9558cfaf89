//! # Configuration document
//!
//! A [`ConfigDocument`] is the complete structured configuration of the agent:
//! the reserved `module`/`submodule` tags, one subtree per module type and the
//! control-channel settings under `main`. Documents are always replaced whole,
//! never merged.
//!
//! ```text
//! {
//!   "module": "wifi",
//!   "submodule": "native",
//!   "main":   { "mqtt_host": "broker.local", "mqtt_topics": ["devices/pi-1/config"] },
//!   "camera": { "detector": "/opt/yolo/detect", "model_path": "/opt/yolo/model.onnx" },
//!   "wifi":   { "interface": "wlan1" }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Reserved key selecting the module family.
pub const MODULE_KEY: &str = "module";
/// Reserved key selecting the implementation within the family.
pub const SUBMODULE_KEY: &str = "submodule";

/// A complete configuration document (top-level JSON object).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigDocument {
    root: Map<String, Value>,
}

impl ConfigDocument {
    /// Parses a document from raw bytes (UTF-8 JSON).
    ///
    /// The top level must be an object. Anything else is
    /// [`ConfigError::Malformed`]; the store maps it to
    /// [`ConfigError::Parse`] with the file location.
    pub fn parse(bytes: &[u8]) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| ConfigError::Malformed {
            error: e.to_string(),
        })?;
        match value {
            Value::Object(root) => Ok(Self { root }),
            other => Err(ConfigError::Malformed {
                error: format!("expected a JSON object, found {}", kind_of(&other)),
            }),
        }
    }

    /// Serializes the document as pretty-printed JSON.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = serde_json::to_vec_pretty(&self.root).unwrap_or_default();
        out.push(b'\n');
        out
    }

    /// Module tag (`module`, or `MODULE` as written by older deployments).
    pub fn module(&self) -> Result<&str, ConfigError> {
        self.tag(MODULE_KEY)
    }

    /// Submodule tag (`submodule`, or `SUBMODULE`).
    pub fn submodule(&self) -> Result<&str, ConfigError> {
        self.tag(SUBMODULE_KEY)
    }

    /// Returns the subtree stored under `key`, if any.
    pub fn subtree(&self, key: &str) -> Option<&Value> {
        self.root
            .get(key)
            .or_else(|| self.root.get(&key.to_ascii_uppercase()))
    }

    /// Deserializes the subtree under `key` into `T`.
    ///
    /// A missing subtree deserializes from an empty object, so settings types
    /// with full defaults need no entry in the document.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self
            .subtree(key)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidSettings {
            section: key.to_string(),
            error: e.to_string(),
        })
    }

    /// Borrow the raw top-level object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    fn tag(&self, key: &str) -> Result<&str, ConfigError> {
        self.subtree(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::MissingKey {
                key: key.to_string(),
            })
    }
}

impl From<Map<String, Value>> for ConfigDocument {
    fn from(root: Map<String, Value>) -> Self {
        Self { root }
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn reads_tags_in_either_case() {
        let doc = ConfigDocument::parse(br#"{"MODULE":"camera","submodule":"yolo"}"#).unwrap();
        assert_eq!(doc.module().unwrap(), "camera");
        assert_eq!(doc.submodule().unwrap(), "yolo");
    }

    #[test]
    fn rejects_non_objects_and_garbage() {
        for payload in [&b"[1,2]"[..], b"\"camera\"", b"{not json", b""] {
            let err = ConfigDocument::parse(payload).unwrap_err();
            assert_eq!(err.as_label(), "config_malformed");
        }
    }

    #[test]
    fn missing_tag_is_reported_by_name() {
        let doc = ConfigDocument::parse(br#"{"module":"wifi"}"#).unwrap();
        match doc.submodule() {
            Err(ConfigError::MissingKey { key }) => assert_eq!(key, "submodule"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct Wifi {
        #[serde(default = "wlan0")]
        interface: String,
    }

    fn wlan0() -> String {
        "wlan0".into()
    }

    #[test]
    fn absent_section_uses_defaults() {
        let doc = ConfigDocument::parse(br#"{"module":"wifi","submodule":"native"}"#).unwrap();
        let wifi: Wifi = doc.section("wifi").unwrap();
        assert_eq!(wifi.interface, "wlan0");

        let doc = ConfigDocument::parse(br#"{"wifi":{"interface":7}}"#).unwrap();
        let err = doc.section::<Wifi>("wifi").unwrap_err();
        assert_eq!(err.as_label(), "config_invalid_settings");
    }

    #[test]
    fn bytes_parse_back_to_equal_document() {
        let doc = ConfigDocument::parse(br#"{"module":"camera","camera":{"args":["-q"]}}"#).unwrap();
        assert_eq!(ConfigDocument::parse(&doc.to_bytes()).unwrap(), doc);
    }
}
