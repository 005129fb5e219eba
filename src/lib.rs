//! A uniform, scheme-addressed virtual filesystem service over a pluggable
//! set of filesystem providers.
//!
//! Consumers register providers with [`FileService::register_provider`] and
//! then issue resource-addressed operations (`resolve`, `readFile`,
//! `writeFile`, `move`, `copy`, `del`, `createFolder`, `watch`, ...) against
//! `scheme://authority/path` URIs; the service dispatches each to the
//! provider registered for that scheme, adapting its declared capability set
//! to the requested operation.

pub mod capability;
pub mod cancellation;
pub mod delete;
pub mod error;
pub mod events;
pub mod move_copy;
pub mod provider;
pub mod read;
pub mod registry;
pub mod resolve;
pub mod service;
pub mod stat;
pub mod trie;
pub mod uri;
pub mod watch;
pub mod write;
pub mod write_queue;

pub mod testing;

pub use capability::FileSystemProviderCapabilities;
pub use error::{FileOperationError, FileOperationErrorKind, ProviderError};
pub use provider::{Disposable, FileChangeEvent, FileChangeKind, FileSystemProvider, WriteData};
pub use service::FileService;
pub use stat::{DeleteOptions, FileKind, FileStat, ReadOptions, ResolveOptions, WatchOptions, WriteOptions};
pub use uri::{InvalidUri, Resource};
