//! # Module variants
//!
//! A worker is selected by its `(module, submodule)` tag pair. [`VariantKey`]
//! is that pair as read from the document; [`Variant`] enumerates the pairs
//! this agent ships an implementation for.

use std::fmt;

use crate::config::ConfigDocument;
use crate::error::ConfigError;

/// Built-in detection modules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variant {
    /// `camera/yolo`
    ObjectDetector,
    /// `wifi/native`
    WifiNativeSniffer,
    /// `wifi/esp8266`
    WifiExternalSniffer,
}

impl Variant {
    /// Every built-in variant.
    pub const ALL: [Variant; 3] = [
        Variant::ObjectDetector,
        Variant::WifiNativeSniffer,
        Variant::WifiExternalSniffer,
    ];

    /// Tag pair of this variant.
    pub fn key(self) -> VariantKey {
        let (module, submodule) = match self {
            Variant::ObjectDetector => ("camera", "yolo"),
            Variant::WifiNativeSniffer => ("wifi", "native"),
            Variant::WifiExternalSniffer => ("wifi", "esp8266"),
        };
        VariantKey::new(module, submodule)
    }

    /// Looks up the built-in variant for a tag pair.
    pub fn from_tags(module: &str, submodule: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.key().matches(module, submodule))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key(), f)
    }
}

/// `(module, submodule)` tag pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VariantKey {
    /// Module family (`camera`, `wifi`). Also names the settings subtree.
    pub module: String,
    /// Implementation within the family (`yolo`, `native`, `esp8266`).
    pub submodule: String,
}

impl VariantKey {
    /// Creates a key from its two tags.
    pub fn new(module: impl Into<String>, submodule: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            submodule: submodule.into(),
        }
    }

    /// Reads the reserved tags from a document.
    pub fn from_document(doc: &ConfigDocument) -> Result<Self, ConfigError> {
        Ok(Self::new(doc.module()?, doc.submodule()?))
    }

    fn matches(&self, module: &str, submodule: &str) -> bool {
        self.module == module && self.submodule == submodule
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module, self.submodule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_resolve_to_builtins() {
        assert_eq!(Variant::from_tags("camera", "yolo"), Some(Variant::ObjectDetector));
        assert_eq!(Variant::from_tags("wifi", "esp8266"), Some(Variant::WifiExternalSniffer));
        assert_eq!(Variant::from_tags("camera", "unknown"), None);
        assert_eq!(Variant::from_tags("yolo", "camera"), None);
    }

    #[test]
    fn key_from_document_and_display() {
        let doc = ConfigDocument::parse(br#"{"MODULE":"wifi","SUBMODULE":"native"}"#).unwrap();
        let key = VariantKey::from_document(&doc).unwrap();
        assert_eq!(key.to_string(), "wifi/native");
        assert_eq!(Variant::WifiNativeSniffer.to_string(), "wifi/native");
    }
}
