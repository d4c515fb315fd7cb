//! Incremental build bookkeeping: hash every file under a source directory,
//! report what changed since the last run, and persist the new hashes.
//!
//! ```text
//! RUST_LOG=atomic_mapping=debug cargo run --example build_cache -- src
//! ```

use atomic_mapping::{AtomicMapping, Mapping, Value};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(fs::read(path)?);
    Ok(hex::encode(hasher.finalize()))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let cache = AtomicMapping::<Mapping>::builder(std::env::temp_dir().join("atomic_mapping_build_cache.json"))
        .create_parent(true)
        .build()?;

    let previous = cache.read();
    let mut files = Vec::new();
    collect_files(&root, &mut files)?;
    files.sort();

    let mut next = Mapping::new();
    let mut changed = 0usize;
    for file in &files {
        let key = file.display().to_string();
        let hash = hash_file(file)?;
        if previous.get(&key).and_then(Value::as_str) != Some(hash.as_str()) {
            changed += 1;
            println!("changed: {key}");
        }
        next.insert(key, json!(hash));
    }

    // the "build" succeeded; only now record its inputs
    cache.update(&next).commit().wait()?;
    println!(
        "{} files, {changed} changed, cache at {}",
        files.len(),
        cache.path().display()
    );
    Ok(())
}
