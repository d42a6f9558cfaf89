//! Configuration document and its persistent store.
//!
//! ## Contents
//! - [`ConfigDocument`] the complete, atomically replaced agent configuration
//! - [`ConfigStore`] load/save seam used by the supervisor
//! - [`FileStore`] JSON file with atomic replace

/// Default document location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "env.json";

mod document;
mod store;

pub use document::{ConfigDocument, MODULE_KEY, SUBMODULE_KEY};
pub use store::{ConfigStore, FileStore};
