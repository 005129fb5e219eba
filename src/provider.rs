//! Provider capability contract (spec §6).
//!
//! Generalizes the teacher's `Vfs` trait (`src/vfs/mod.rs` in
//! `RMamonts-nfs-mamont`, 22 NFSv3 procedures behind `#[async_trait]`) down
//! to the smaller capability-keyed method family this service actually
//! dispatches against.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::capability::FileSystemProviderCapabilities;
use crate::error::ProviderError;
use crate::stat::FileKind;
use crate::uri::Resource;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A provider-reported stat, before the resolver wraps it in a `FileStat`.
#[derive(Debug, Clone)]
pub struct RawStat {
    pub kind: FileKind,
    pub mtime: u64,
    pub ctime: u64,
    pub size: u64,
}

/// A single directory entry as reported by `readdir` — no metadata unless
/// the caller additionally calls `stat` on it (spec §4.2).
#[derive(Debug, Clone)]
pub struct RawDirEntry {
    pub name: String,
    pub kind: FileKind,
}

/// Numeric handle returned by positional `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileDescriptor(pub u64);

/// Tagged write input (spec §9 design note: "model as a tagged input").
pub enum WriteData {
    Bytes(Vec<u8>),
    /// Pull-style: each call yields the next chunk, or `None` at end.
    PullReadable(Box<dyn FnMut() -> Option<Vec<u8>> + Send>),
    /// Push-style: chunks arrive over a channel until it closes.
    PushStream(tokio::sync::mpsc::Receiver<ProviderResult<Vec<u8>>>),
}

/// A chunk of a provider-native streaming read.
pub type StreamChunk = ProviderResult<Vec<u8>>;

/// File-change kinds carried by `onDidChangeFile` (spec §2.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    pub kind: FileChangeKind,
    pub resource: Resource,
}

/// A disposable subscription or registration handle.
///
/// Consuming `dispose` by value makes double-dispose a non-issue for owned
/// handles; multiplexed handles (the watcher table) additionally guard the
/// async race described in spec §4.8 / §3's refcount invariant.
pub trait Disposable: Send {
    fn dispose(self: Box<Self>);
}

/// A provider's declared method family (spec §6).
///
/// `capabilities()` is re-read by every pipeline before it picks a code
/// path — the bit is never assumed permanent (spec §3).
#[async_trait]
pub trait FileSystemProvider: Send + Sync {
    fn scheme(&self) -> &str;

    fn capabilities(&self) -> FileSystemProviderCapabilities;

    /// Subscribe to file-change notifications for this provider.
    fn on_did_change_file(&self) -> broadcast::Receiver<FileChangeEvent>;

    /// Subscribe to capability-change notifications.
    fn on_did_change_capabilities(&self) -> broadcast::Receiver<FileSystemProviderCapabilities>;

    async fn stat(&self, resource: &Resource) -> ProviderResult<RawStat>;

    async fn readdir(&self, resource: &Resource) -> ProviderResult<Vec<RawDirEntry>>;

    async fn mkdir(&self, resource: &Resource) -> ProviderResult<()>;

    async fn delete(&self, resource: &Resource, recursive: bool, use_trash: bool) -> ProviderResult<()>;

    async fn rename(&self, from: &Resource, to: &Resource, overwrite: bool) -> ProviderResult<()>;

    /// Present only when `FILE_FOLDER_COPY` is set.
    async fn copy(&self, _from: &Resource, _to: &Resource, _overwrite: bool) -> ProviderResult<()> {
        Err(ProviderError::Other("copy not supported".into()))
    }

    /// Present only when `FILE_READ_WRITE` is set.
    async fn read_file(&self, _resource: &Resource) -> ProviderResult<Vec<u8>> {
        Err(ProviderError::Other("unbuffered read not supported".into()))
    }

    /// Present only when `FILE_READ_WRITE` is set.
    async fn write_file(&self, _resource: &Resource, _data: &[u8], _create: bool, _overwrite: bool) -> ProviderResult<()> {
        Err(ProviderError::Other("unbuffered write not supported".into()))
    }

    /// Present only when `FILE_READ_STREAM` is set.
    async fn read_file_stream(
        &self,
        _resource: &Resource,
        _position: Option<u64>,
        _length: Option<u64>,
    ) -> ProviderResult<tokio::sync::mpsc::Receiver<StreamChunk>> {
        Err(ProviderError::Other("streamed read not supported".into()))
    }

    /// Present only when `FILE_OPEN_READ_WRITE_CLOSE` is set.
    async fn open(&self, _resource: &Resource, _create: bool) -> ProviderResult<FileDescriptor> {
        Err(ProviderError::Other("positional open not supported".into()))
    }

    async fn read(&self, _fd: FileDescriptor, _position: u64, _length: usize) -> ProviderResult<Vec<u8>> {
        Err(ProviderError::Other("positional read not supported".into()))
    }

    async fn write(&self, _fd: FileDescriptor, _position: u64, _data: &[u8]) -> ProviderResult<usize> {
        Err(ProviderError::Other("positional write not supported".into()))
    }

    async fn close(&self, _fd: FileDescriptor) -> ProviderResult<()> {
        Ok(())
    }

    /// Always present; returns a disposable subscription.
    async fn watch(
        &self,
        resource: &Resource,
        recursive: bool,
        excludes: &[String],
    ) -> ProviderResult<Box<dyn Disposable>>;
}
