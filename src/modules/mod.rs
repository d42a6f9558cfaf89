//! Built-in detection modules.
//!
//! These run inside the worker process (see the `worker` subcommand). The
//! supervisor only sees their output lines and their exit.
//!
//! | variant        | type                    | settings subtree |
//! |----------------|-------------------------|------------------|
//! | `camera/yolo`  | [`ObjectDetector`]      | `camera`         |
//! | `wifi/native`  | [`WifiNativeSniffer`]   | `wifi`           |
//! | `wifi/esp8266` | [`WifiExternalSniffer`] | `wifi`           |

mod camera;
mod detection;
mod entry;
pub mod wifi;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use camera::{CameraSettings, ObjectDetector};
pub use detection::Detection;
pub use entry::run_worker;
pub use wifi::{WifiExternalSniffer, WifiNativeSniffer, WifiSettings};

use crate::error::{ConfigError, WorkerError};
use crate::worker::{Module, Variant};

/// Builds the module body for `variant` from its settings subtree.
pub fn build(variant: Variant, subtree: &Value) -> Result<Box<dyn Module>, WorkerError> {
    let module: Box<dyn Module> = match variant {
        Variant::ObjectDetector => Box::new(ObjectDetector::new(settings(variant, subtree)?)),
        Variant::WifiNativeSniffer => Box::new(WifiNativeSniffer::new(settings(variant, subtree)?)),
        Variant::WifiExternalSniffer => {
            Box::new(WifiExternalSniffer::new(settings(variant, subtree)?))
        }
    };
    Ok(module)
}

/// Checks that `subtree` is valid settings for `variant`.
pub fn validate(variant: Variant, subtree: &Value) -> Result<(), WorkerError> {
    build(variant, subtree).map(|_| ())
}

fn settings<T: DeserializeOwned>(variant: Variant, subtree: &Value) -> Result<T, WorkerError> {
    let value = match subtree {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| {
        WorkerError::Config(ConfigError::InvalidSettings {
            section: variant.key().module,
            error: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_each_variant() {
        let camera = build(Variant::ObjectDetector, &json!({"detector": "/bin/true"})).unwrap();
        assert_eq!(camera.name(), "camera/yolo");
        let native = build(Variant::WifiNativeSniffer, &Value::Null).unwrap();
        assert_eq!(native.name(), "wifi/native");
        let ext = build(Variant::WifiExternalSniffer, &json!({})).unwrap();
        assert_eq!(ext.name(), "wifi/esp8266");
    }

    #[test]
    fn invalid_settings_name_the_section() {
        let err = validate(Variant::ObjectDetector, &json!({"model_path": "/m"})).unwrap_err();
        assert_eq!(err.as_label(), "worker_config");
        assert!(err.to_string().contains("'camera'"));
    }
}
