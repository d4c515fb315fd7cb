//! Crash-safe JSON mapping file with serialized, atomic whole-document commits.
//!
//! Bind a store to a path, `read` the current document (a missing or corrupt
//! file reads as empty), and `update` it with a full replacement. Each commit
//! goes temp file → fsync → rename, so the file on disk is always either the
//! old document or the new one.
//!
//! ```rust,no_run
//! use atomic_mapping::AtomicMapping;
//! use serde_json::json;
//!
//! let store: AtomicMapping = AtomicMapping::new("build/.hashes.json").unwrap();
//! let mut hashes = store.read();
//! hashes.insert("main.js".into(), json!("abc123"));
//! store.update(&hashes).commit().wait().unwrap();
//! ```
//!
//! Commits against one path are serialized within the process. Separate
//! processes writing the same file are not coordinated; the last rename wins.
//! Paths are compared lexically: `cache/x/../m.json` and `cache/m.json`, or a
//! symlink and its target, are different paths and get separate write gates.

#![deny(missing_docs)]
#![warn(clippy::all)]

mod commit;
pub mod error;
pub mod persist;
pub mod serializer;
pub mod store;

pub use commit::Pending;
pub use error::{Error, Result};
pub use persist::WriteOptions;
pub use store::{AtomicMapping, AtomicMappingBuilder, Update};

pub use serde_json::Value;

/// Default document type: a JSON object with string keys.
pub type Mapping = serde_json::Map<String, Value>;
