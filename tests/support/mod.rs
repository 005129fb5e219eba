//! Shared fixtures for the integration tests (spec §10.4): re-uses the
//! `DiskFsProvider` built for the `mirrorfs` demo rather than duplicating it.

#[path = "../../demos/mirrorfs/disk_provider.rs"]
pub mod disk_provider;

pub use disk_provider::DiskFsProvider;

use std::sync::Arc;

use tempfile::TempDir;
use vfs_core::testing::mem_provider::MemFsProvider;
use vfs_core::{FileService, FileSystemProvider};

/// A `FileService` with both fixture providers registered: `mem` (whole-buffer
/// unbuffered I/O only) and `disk` (positional I/O + native copy + trash),
/// rooted at a fresh temp directory.
pub struct Harness {
    pub service: Arc<FileService>,
    pub disk_dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let service = FileService::new();
        service.register_provider("mem", Arc::new(MemFsProvider::new())).await.unwrap();

        let disk_dir = TempDir::new().expect("create temp dir");
        let disk: Arc<dyn FileSystemProvider> =
            Arc::new(DiskFsProvider::new("disk", disk_dir.path().to_path_buf()).expect("canonicalize temp dir"));
        service.register_provider("disk", disk).await.unwrap();

        Self { service, disk_dir }
    }
}
