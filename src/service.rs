//! Top-level `FileService` (spec §6): wires the registry, write queue,
//! watcher multiplexer, and event bus behind the public operation list.

use std::sync::Arc;

use crate::capability::FileSystemProviderCapabilities;
use crate::delete::{create_folder, del as del_impl, mkdirp};
use crate::error::FileOperationError;
use crate::events::{AfterOperationEvent, EventBus, OperationKind};
use crate::move_copy::{do_move_copy, OperationMode};
use crate::provider::{FileSystemProvider, StreamChunk, WriteData};
use crate::read::{read_file as read_file_impl, read_file_stream as read_file_stream_impl};
use crate::registry::{ProviderRegistry, RegistrationHandle};
use crate::resolve::resolve as resolve_impl;
use crate::stat::{DeleteOptions, FileStat, ReadOptions, ResolveOptions, WriteOptions};
use crate::uri::Resource;
use crate::watch::{WatchHandle, WatcherMultiplexer};
use crate::write::{create_file as create_file_impl, write_file as write_file_impl};
use crate::write_queue::WriteQueueTable;

use tokio::sync::mpsc;

/// The service's public operation surface (spec §6).
pub struct FileService {
    registry: Arc<ProviderRegistry>,
    write_queue: WriteQueueTable,
    watchers: Arc<WatcherMultiplexer>,
    events: Arc<EventBus>,
}

impl FileService {
    pub fn new() -> Arc<Self> {
        let events = Arc::new(EventBus::new());
        Arc::new(Self {
            registry: ProviderRegistry::new(events.clone()),
            write_queue: WriteQueueTable::new(),
            watchers: WatcherMultiplexer::new(),
            events,
        })
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub async fn register_provider(
        self: &Arc<Self>,
        scheme: impl Into<String>,
        provider: Arc<dyn FileSystemProvider>,
    ) -> Result<RegistrationHandle, FileOperationError> {
        self.registry.register(scheme, provider).await
    }

    pub async fn activate_provider(&self, scheme: &str) {
        self.registry.activate(scheme).await;
    }

    pub async fn can_handle_resource(&self, resource: &Resource) -> bool {
        self.registry.can_handle_resource(resource).await
    }

    pub async fn has_capability(&self, resource: &Resource, capability: FileSystemProviderCapabilities) -> bool {
        self.registry.has_capability(resource, capability).await
    }

    pub async fn resolve(&self, resource: &Resource, options: &ResolveOptions) -> Result<FileStat, FileOperationError> {
        let provider = self.registry.with_provider(resource).await?;
        resolve_impl(&*provider, resource, options).await
    }

    /// `resolveAll(entries)` (spec §4.2, §6): resources may belong to
    /// different providers, so each entry looks up its own.
    pub async fn resolve_all(&self, entries: &[(Resource, ResolveOptions)]) -> Vec<Result<FileStat, ()>> {
        let mut out = Vec::with_capacity(entries.len());
        for (resource, options) in entries {
            let result = async {
                let provider = self.registry.with_provider(resource).await?;
                resolve_impl(&*provider, resource, options).await
            }
            .await;
            out.push(result.map_err(|_| ()));
        }
        out
    }

    pub async fn exists(&self, resource: &Resource) -> bool {
        match self.registry.with_provider(resource).await {
            Ok(provider) => crate::resolve::exists(&*provider, resource).await,
            Err(_) => false,
        }
    }

    pub async fn create_file(
        self: &Arc<Self>,
        resource: &Resource,
        data: WriteData,
        options: &WriteOptions,
    ) -> Result<FileStat, FileOperationError> {
        let provider = self.registry.with_provider(resource).await?;
        let stat = self.report_err(create_file_impl(provider, &self.write_queue, resource, data, options).await)?;
        self.emit_after_operation(OperationKind::Create, resource, &stat);
        Ok(stat)
    }

    pub async fn write_file(
        self: &Arc<Self>,
        resource: &Resource,
        data: WriteData,
        options: &WriteOptions,
    ) -> Result<FileStat, FileOperationError> {
        let provider = self.registry.with_provider(resource).await?;
        let stat = self.report_err(write_file_impl(provider, &self.write_queue, resource, data, options).await)?;
        self.emit_after_operation(OperationKind::Write, resource, &stat);
        Ok(stat)
    }

    pub async fn read_file(&self, resource: &Resource, options: &ReadOptions) -> Result<(FileStat, Vec<u8>), FileOperationError> {
        let provider = self.registry.with_provider(resource).await?;
        read_file_impl(&*provider, resource, options).await
    }

    pub async fn read_file_stream(
        &self,
        resource: &Resource,
        options: &ReadOptions,
    ) -> Result<(FileStat, mpsc::Receiver<StreamChunk>), FileOperationError> {
        let provider = self.registry.with_provider(resource).await?;
        read_file_stream_impl(&*provider, resource, options).await
    }

    /// `move(source, target, overwrite)` (spec §4.5): always emits `MOVE` at
    /// the top level even when the cross-provider path internally copies
    /// then deletes (spec §12 decision 2).
    pub async fn move_resource(
        self: &Arc<Self>,
        source: &Resource,
        target: &Resource,
        overwrite: bool,
    ) -> Result<FileStat, FileOperationError> {
        let source_provider = self.registry.with_provider(source).await?;
        let target_provider = self.registry.with_provider(target).await?;
        self.report_err(do_move_copy(source_provider, source, target_provider, target, &self.write_queue, OperationMode::Move, overwrite).await)?;
        let stat = self.resolve(target, &ResolveOptions { resolve_metadata: true, ..Default::default() }).await?;
        self.emit_after_operation(OperationKind::Move, target, &stat);
        Ok(stat)
    }

    /// `copy(source, target, overwrite)` (spec §4.5).
    pub async fn copy_resource(
        self: &Arc<Self>,
        source: &Resource,
        target: &Resource,
        overwrite: bool,
    ) -> Result<FileStat, FileOperationError> {
        let source_provider = self.registry.with_provider(source).await?;
        let target_provider = self.registry.with_provider(target).await?;
        self.report_err(do_move_copy(source_provider, source, target_provider, target, &self.write_queue, OperationMode::Copy, overwrite).await)?;
        let stat = self.resolve(target, &ResolveOptions { resolve_metadata: true, ..Default::default() }).await?;
        self.emit_after_operation(OperationKind::Copy, target, &stat);
        Ok(stat)
    }

    /// `del(resource, options)` (spec §4.7).
    pub async fn del(self: &Arc<Self>, resource: &Resource, options: &DeleteOptions) -> Result<(), FileOperationError> {
        let provider = self.registry.with_provider(resource).await?;
        self.report_err(del_impl(&*provider, resource, options.recursive, options.use_trash).await)?;
        self.events.emit_after_operation(AfterOperationEvent {
            kind: OperationKind::Delete,
            stat: None,
            resource: resource.clone(),
        });
        Ok(())
    }

    /// `createFolder(resource)` (spec §4.7): `mkdirp` then re-resolve.
    pub async fn create_folder(self: &Arc<Self>, resource: &Resource) -> Result<FileStat, FileOperationError> {
        let provider = self.registry.with_provider(resource).await?;
        let stat = self.report_err(create_folder(&*provider, resource).await)?;
        self.emit_after_operation(OperationKind::Create, resource, &stat);
        Ok(stat)
    }

    /// `watch(resource, options)` (spec §4.8).
    pub async fn watch(self: &Arc<Self>, resource: &Resource, recursive: bool, excludes: Vec<String>) -> Result<WatchHandle, FileOperationError> {
        let provider = self.registry.with_provider(resource).await?;
        Ok(self.watchers.watch(provider, resource.clone(), recursive, excludes).await)
    }

    /// `dispose()` (spec §4.8): tears down all active watchers.
    pub async fn dispose(&self) {
        self.watchers.dispose_all().await;
        self.registry.dispose().await;
    }

    /// Mirrors a failed mutating operation onto the `onError` channel (spec
    /// §6, §11) before letting the caller see the same error via `?`.
    fn report_err<T>(&self, result: Result<T, FileOperationError>) -> Result<T, FileOperationError> {
        if let Err(err) = &result {
            self.events.emit_error(err.clone());
        }
        result
    }

    fn emit_after_operation(&self, kind: OperationKind, resource: &Resource, stat: &FileStat) {
        self.events.emit_after_operation(AfterOperationEvent {
            kind,
            stat: Some(stat.clone()),
            resource: resource.clone(),
        });
    }
}

/// Exposed for consumers wiring up a provider root before first use —
/// mirrors `mkdirp`'s role in `createFolder` but callable directly.
pub async fn ensure_directory(provider: &dyn FileSystemProvider, directory: &Resource) -> Result<(), FileOperationError> {
    mkdirp(provider, directory).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mem_provider::MemFsProvider;

    fn bytes(v: &[u8]) -> WriteData {
        WriteData::Bytes(v.to_vec())
    }

    #[tokio::test]
    async fn single_provider_round_trip_fires_create_then_resolves() {
        let service = FileService::new();
        let mut after_op = service.events().after_operation.subscribe();
        service.register_provider("mem", Arc::new(MemFsProvider::new())).await.unwrap();

        let resource: Resource = "mem:///a/b.txt".parse().unwrap();
        let stat = service.write_file(&resource, bytes(b"hello"), &WriteOptions::default()).await.unwrap();
        assert_eq!(stat.size, 5);
        assert!(service.exists(&resource).await);

        let (_, read_back) = service.read_file(&resource, &ReadOptions::default()).await.unwrap();
        assert_eq!(read_back, b"hello");

        let event = after_op.recv().await.unwrap();
        assert_eq!(event.kind, OperationKind::Write);
    }

    #[tokio::test]
    async fn move_within_same_provider_fires_move_event() {
        let service = FileService::new();
        service.register_provider("mem", Arc::new(MemFsProvider::new())).await.unwrap();
        let source: Resource = "mem:///a.txt".parse().unwrap();
        let target: Resource = "mem:///b.txt".parse().unwrap();
        service.write_file(&source, bytes(b"x"), &WriteOptions::default()).await.unwrap();

        let mut after_op = service.events().after_operation.subscribe();
        service.move_resource(&source, &target, false).await.unwrap();
        assert!(!service.exists(&source).await);
        assert!(service.exists(&target).await);

        let event = after_op.recv().await.unwrap();
        assert_eq!(event.kind, OperationKind::Move);
    }

    #[tokio::test]
    async fn delete_fires_delete_event() {
        let service = FileService::new();
        service.register_provider("mem", Arc::new(MemFsProvider::new())).await.unwrap();
        let resource: Resource = "mem:///a.txt".parse().unwrap();
        service.write_file(&resource, bytes(b"x"), &WriteOptions::default()).await.unwrap();

        let mut after_op = service.events().after_operation.subscribe();
        service.del(&resource, &DeleteOptions::default()).await.unwrap();
        assert!(!service.exists(&resource).await);
        let event = after_op.recv().await.unwrap();
        assert_eq!(event.kind, OperationKind::Delete);
    }

    #[tokio::test]
    async fn unregistered_scheme_yields_no_provider_error() {
        let service = FileService::new();
        let resource: Resource = "mem:///a.txt".parse().unwrap();
        assert!(!service.exists(&resource).await);
        let err = service.resolve(&resource, &ResolveOptions::default()).await.unwrap_err();
        assert_eq!(err.kind, crate::error::FileOperationErrorKind::NoProvider);
    }
}
