//! # Configuration store
//!
//! [`ConfigStore`] is the single-writer persistence seam used by the
//! supervisor: `load` at startup and before every (re)start, `save` before any
//! worker restart. [`FileStore`] keeps the document as a JSON file and replaces
//! it atomically (sibling temp file, `sync_all`, rename), so a reader never
//! sees a half-written document.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::document::ConfigDocument;
use crate::error::ConfigError;

/// Loads and persists the configuration document.
pub trait ConfigStore: Send + Sync + 'static {
    /// Reads the current document.
    ///
    /// Fails with [`ConfigError::NotFound`] when nothing is stored and with
    /// [`ConfigError::Parse`] when the stored bytes are not a document.
    fn load(&self) -> Result<ConfigDocument, ConfigError>;

    /// Durably replaces the stored document.
    fn save(&self, doc: &ConfigDocument) -> Result<(), ConfigError>;
}

/// JSON file on local storage.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store over `path`. Nothing is read until [`ConfigStore::load`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
        let tmp = self.temp_path();
        let result = (|| {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            sync_parent(&self.path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

impl ConfigStore for FileStore {
    fn load(&self) -> Result<ConfigDocument, ConfigError> {
        let bytes = fs::read(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound {
                path: self.path.clone(),
            },
            _ => ConfigError::Parse {
                path: self.path.clone(),
                error: e.to_string(),
            },
        })?;
        ConfigDocument::parse(&bytes).map_err(|e| ConfigError::Parse {
            path: self.path.clone(),
            error: match e {
                ConfigError::Malformed { error } => error,
                other => other.to_string(),
            },
        })
    }

    fn save(&self, doc: &ConfigDocument) -> Result<(), ConfigError> {
        self.write_atomic(&doc.to_bytes())
            .map_err(|source| ConfigError::Persist {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => File::open(dir)?.sync_all(),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("env.json"));
        assert!(matches!(store.load(), Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn garbage_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.json");
        fs::write(&path, b"module=camera").unwrap();

        let err = FileStore::new(&path).load().unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
        assert!(err.is_fatal_at_startup());
    }

    #[test]
    fn save_replaces_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.json");
        fs::write(&path, br#"{"module":"camera","submodule":"yolo","camera":{}}"#).unwrap();
        let store = FileStore::new(&path);

        let next = ConfigDocument::parse(br#"{"module":"wifi","submodule":"native"}"#).unwrap();
        store.save(&next).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, next);
        assert!(loaded.subtree("camera").is_none());
        assert!(!dir.path().join(".env.json.tmp").exists());
    }

    #[test]
    fn unwritable_location_is_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("missing-dir").join("env.json"));
        let doc = ConfigDocument::parse(br#"{"module":"wifi"}"#).unwrap();

        let err = store.save(&doc).unwrap_err();
        assert_eq!(err.as_label(), "config_persist");
        assert!(!err.is_fatal_at_startup());
    }
}
