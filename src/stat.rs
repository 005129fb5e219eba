//! File stat tree and per-operation options (spec §3).

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::uri::Resource;

/// Sentinel opting a stat out of etag precondition checks (spec §3).
pub const ETAG_DISABLED: &str = "disabled";

/// Deterministic short tag derived from `(mtime, size)` (spec §3, §8).
pub fn compute_etag(mtime_millis: u64, size: u64) -> String {
    format!("{mtime_millis:x}-{size:x}")
}

pub fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Independent type-flag bits: a node may be file+symlink simultaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileKind {
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symbolic_link: bool,
}

/// Immutable snapshot of a provider-reported file or directory.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStat {
    pub resource: Resource,
    pub name: String,
    pub kind: FileKind,
    pub mtime: u64,
    pub ctime: u64,
    pub size: u64,
    pub etag: String,
    /// `None` if never expanded; `Some` (possibly empty) once `resolve`
    /// has descended into this directory.
    pub children: Option<Vec<FileStat>>,
}

impl FileStat {
    pub fn is_file(&self) -> bool {
        self.kind.is_file
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_directory
    }
}

/// Options accepted by `resolve` (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub resolve_to: Vec<Resource>,
    pub resolve_single_child_descendants: bool,
    pub resolve_metadata: bool,
}

/// Options accepted by `readFile`/`readFileStream` (spec §3).
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub position: Option<u64>,
    pub length: Option<u64>,
    pub etag: Option<String>,
    pub limit_size: Option<u64>,
    pub limit_memory: Option<u64>,
    pub prefer_unbuffered: bool,
}

/// Options accepted by `writeFile`/`createFile` (spec §3, §4.4).
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub overwrite: bool,
    pub create: bool,
    pub mtime: Option<u64>,
    pub etag: Option<String>,
}

/// Options accepted by `watch` (spec §3, §4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchOptions {
    pub recursive: bool,
    pub excludes: Vec<String>,
}

impl WatchOptions {
    /// Part of the watcher multiplexer key (spec §4.8).
    pub fn excludes_key(&self) -> String {
        self.excludes.join(",")
    }
}

/// Options accepted by `del` (spec §4.7).
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub recursive: bool,
    pub use_trash: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_is_deterministic_function_of_mtime_and_size() {
        assert_eq!(compute_etag(1000, 5), compute_etag(1000, 5));
        assert_ne!(compute_etag(1000, 5), compute_etag(1000, 6));
        assert_ne!(compute_etag(1000, 5), compute_etag(2000, 5));
    }
}
