//! In-memory test/demo provider (spec §10.4).
//!
//! Grounded on the teacher's `examples/in_memory/filesystem.rs`
//! (`InMemoryVfs`: `RwLock<State>`, a flat node map, `default_attr` helper).
//! Exposes only `FILE_READ_WRITE` — no native copy, no positional I/O, no
//! trash — so it exercises the opposite end of the capability spectrum from
//! `demos/mirrorfs`'s disk provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::capability::FileSystemProviderCapabilities;
use crate::error::ProviderError;
use crate::provider::{
    Disposable, FileChangeEvent, FileChangeKind, FileSystemProvider, ProviderResult, RawDirEntry,
    RawStat,
};
use crate::stat::{now_millis, FileKind};
use crate::uri::Resource;

#[derive(Clone)]
enum Node {
    Directory,
    File { data: Vec<u8> },
}

struct Entry {
    node: Node,
    mtime: u64,
    ctime: u64,
}

fn parent_of(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => "/".to_string(),
    }
}

fn basename_of(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => trimmed[idx + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

/// A tiny, in-memory VFS provider.
pub struct MemFsProvider {
    nodes: RwLock<HashMap<String, Entry>>,
    changes: broadcast::Sender<FileChangeEvent>,
    capability_changes: broadcast::Sender<FileSystemProviderCapabilities>,
    watch_calls: AtomicUsize,
    clock: AtomicU64,
}

impl Default for MemFsProvider {
    fn default() -> Self {
        let mut nodes = HashMap::new();
        let now = now_millis();
        nodes.insert("/".to_string(), Entry { node: Node::Directory, mtime: now, ctime: now });
        Self {
            nodes: RwLock::new(nodes),
            changes: broadcast::channel(64).0,
            capability_changes: broadcast::channel(4).0,
            watch_calls: AtomicUsize::new(0),
            clock: AtomicU64::new(now),
        }
    }
}

impl MemFsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonically increasing millis so successive writes get distinct mtimes.
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn watch_call_count(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Test helper: seed a file (and its missing ancestor directories) directly.
    pub async fn seed_file(&self, path: &str, data: &[u8]) {
        let mut nodes = self.nodes.write().await;
        let mut current = String::new();
        for segment in path.trim_start_matches('/').split('/') {
            let parent = if current.is_empty() { "/".to_string() } else { current.clone() };
            current = if current.is_empty() { format!("/{segment}") } else { format!("{current}/{segment}") };
            if current == path {
                break;
            }
            nodes.entry(parent).or_insert_with(|| Entry { node: Node::Directory, mtime: 0, ctime: 0 });
            nodes.entry(current.clone()).or_insert_with(|| Entry { node: Node::Directory, mtime: 0, ctime: 0 });
        }
        let now = now_millis();
        nodes.insert(path.to_string(), Entry { node: Node::File { data: data.to_vec() }, mtime: now, ctime: now });
    }

    pub async fn read_raw(&self, path: &str) -> Option<Vec<u8>> {
        let nodes = self.nodes.read().await;
        match nodes.get(path) {
            Some(Entry { node: Node::File { data }, .. }) => Some(data.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl FileSystemProvider for MemFsProvider {
    fn scheme(&self) -> &str {
        "mem"
    }

    fn capabilities(&self) -> FileSystemProviderCapabilities {
        FileSystemProviderCapabilities::FILE_READ_WRITE
            | FileSystemProviderCapabilities::PATH_CASE_SENSITIVE
    }

    fn on_did_change_file(&self) -> broadcast::Receiver<FileChangeEvent> {
        self.changes.subscribe()
    }

    fn on_did_change_capabilities(&self) -> broadcast::Receiver<FileSystemProviderCapabilities> {
        self.capability_changes.subscribe()
    }

    async fn stat(&self, resource: &Resource) -> ProviderResult<RawStat> {
        let nodes = self.nodes.read().await;
        let entry = nodes.get(&resource.path).ok_or(ProviderError::FileNotFound)?;
        let (kind, size) = match &entry.node {
            Node::Directory => (FileKind { is_directory: true, ..Default::default() }, 0),
            Node::File { data } => (FileKind { is_file: true, ..Default::default() }, data.len() as u64),
        };
        Ok(RawStat { kind, mtime: entry.mtime, ctime: entry.ctime, size })
    }

    async fn readdir(&self, resource: &Resource) -> ProviderResult<Vec<RawDirEntry>> {
        let nodes = self.nodes.read().await;
        if !matches!(nodes.get(&resource.path), Some(Entry { node: Node::Directory, .. })) {
            return Err(ProviderError::FileNotDirectory);
        }
        let prefix = resource.path.trim_end_matches('/');
        let mut out = Vec::new();
        for (path, entry) in nodes.iter() {
            if path == prefix || path == "/" && prefix.is_empty() {
                continue;
            }
            if parent_of(path) == prefix || (prefix.is_empty() && parent_of(path) == "/") {
                let kind = match &entry.node {
                    Node::Directory => FileKind { is_directory: true, ..Default::default() },
                    Node::File { .. } => FileKind { is_file: true, ..Default::default() },
                };
                out.push(RawDirEntry { name: basename_of(path), kind });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn mkdir(&self, resource: &Resource) -> ProviderResult<()> {
        let mut nodes = self.nodes.write().await;
        match nodes.get(&resource.path) {
            Some(Entry { node: Node::Directory, .. }) => Ok(()),
            Some(Entry { node: Node::File { .. }, .. }) => Err(ProviderError::FileExists),
            None => {
                let now = now_millis();
                nodes.insert(resource.path.clone(), Entry { node: Node::Directory, mtime: now, ctime: now });
                Ok(())
            }
        }
    }

    async fn delete(&self, resource: &Resource, recursive: bool, use_trash: bool) -> ProviderResult<()> {
        if use_trash {
            return Err(ProviderError::Other("trash not supported".into()));
        }
        let mut nodes = self.nodes.write().await;
        if !nodes.contains_key(&resource.path) {
            return Err(ProviderError::FileNotFound);
        }
        let prefix = format!("{}/", resource.path.trim_end_matches('/'));
        let has_children = nodes.keys().any(|k| k.starts_with(&prefix));
        if has_children && !recursive {
            return Err(ProviderError::DirectoryNotEmpty);
        }
        nodes.retain(|path, _| path != &resource.path && !path.starts_with(&prefix));
        drop(nodes);
        let _ = self.changes.send(FileChangeEvent { kind: FileChangeKind::Deleted, resource: resource.clone() });
        Ok(())
    }

    async fn rename(&self, from: &Resource, to: &Resource, overwrite: bool) -> ProviderResult<()> {
        let mut nodes = self.nodes.write().await;
        if !nodes.contains_key(&from.path) {
            return Err(ProviderError::FileNotFound);
        }
        if nodes.contains_key(&to.path) && !overwrite {
            return Err(ProviderError::FileExists);
        }
        let from_prefix = format!("{}/", from.path.trim_end_matches('/'));
        let to_prefix = format!("{}/", to.path.trim_end_matches('/'));
        let moved: Vec<(String, Entry)> = nodes
            .keys()
            .filter(|k| *k == &from.path || k.starts_with(&from_prefix))
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .map(|k| {
                let entry = nodes.remove(&k).unwrap();
                let new_key = if k == from.path { to.path.clone() } else { format!("{}{}", to_prefix, &k[from_prefix.len()..]) };
                (new_key, entry)
            })
            .collect();
        for (key, entry) in moved {
            nodes.insert(key, entry);
        }
        Ok(())
    }

    async fn read_file(&self, resource: &Resource) -> ProviderResult<Vec<u8>> {
        let nodes = self.nodes.read().await;
        match nodes.get(&resource.path) {
            Some(Entry { node: Node::File { data }, .. }) => Ok(data.clone()),
            Some(Entry { node: Node::Directory, .. }) => Err(ProviderError::FileIsDirectory),
            None => Err(ProviderError::FileNotFound),
        }
    }

    async fn write_file(&self, resource: &Resource, data: &[u8], create: bool, overwrite: bool) -> ProviderResult<()> {
        let existed = {
            let nodes = self.nodes.read().await;
            nodes.contains_key(&resource.path)
        };
        if existed {
            let nodes = self.nodes.read().await;
            if matches!(nodes.get(&resource.path), Some(Entry { node: Node::Directory, .. })) {
                return Err(ProviderError::FileIsDirectory);
            }
            if !overwrite {
                return Err(ProviderError::FileExists);
            }
        } else if !create {
            return Err(ProviderError::FileNotFound);
        }
        let mtime = self.tick();
        let mut nodes = self.nodes.write().await;
        let ctime = nodes.get(&resource.path).map(|e| e.ctime).unwrap_or(mtime);
        nodes.insert(resource.path.clone(), Entry { node: Node::File { data: data.to_vec() }, mtime, ctime });
        drop(nodes);
        let kind = if existed { FileChangeKind::Updated } else { FileChangeKind::Created };
        let _ = self.changes.send(FileChangeEvent { kind, resource: resource.clone() });
        Ok(())
    }

    async fn watch(
        &self,
        _resource: &Resource,
        _recursive: bool,
        _excludes: &[String],
    ) -> ProviderResult<Box<dyn Disposable>> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        struct NoopWatch;
        impl Disposable for NoopWatch {
            fn dispose(self: Box<Self>) {}
        }
        Ok(Box::new(NoopWatch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seed_then_read_roundtrip() {
        let provider = MemFsProvider::new();
        provider.seed_file("/a/b.txt", b"hi").await;
        let resource: Resource = "mem:///a/b.txt".parse().unwrap();
        assert_eq!(provider.read_file(&resource).await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn write_then_read_empty_file() {
        let provider = MemFsProvider::new();
        let resource: Resource = "mem:///empty.txt".parse().unwrap();
        provider.write_file(&resource, b"", true, true).await.unwrap();
        assert_eq!(provider.read_file(&resource).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn readdir_lists_direct_children_only() {
        let provider = MemFsProvider::new();
        provider.seed_file("/dir/a.txt", b"1").await;
        provider.seed_file("/dir/sub/b.txt", b"2").await;
        let resource: Resource = "mem:///dir".parse().unwrap();
        let entries = provider.readdir(&resource).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["a.txt".to_string(), "sub".to_string()]);
    }
}
