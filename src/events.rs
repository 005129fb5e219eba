//! Event bus (spec §2.10, §6).
//!
//! Modeled as synchronous multicast channels delivered on the current task
//! (spec §9 design note: "Do not introduce implicit threading"). Built on
//! `tokio::sync::broadcast`, mirroring the teacher's use of `tokio::sync`
//! channels elsewhere (`src/vfs_task.rs`'s `mpsc`, removed) but multicast
//! since several independent observers may subscribe.

use tokio::sync::broadcast;

use crate::error::FileOperationError;
use crate::provider::FileChangeEvent;
use crate::stat::FileStat;
use crate::uri::Resource;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Write,
    Delete,
    Move,
    Copy,
}

#[derive(Debug, Clone)]
pub struct AfterOperationEvent {
    pub kind: OperationKind,
    pub stat: Option<FileStat>,
    pub resource: Resource,
}

#[derive(Debug, Clone)]
pub struct ProviderRegistrationEvent {
    pub scheme: String,
    pub added: bool,
}

/// The service's outward-facing multicast channels.
pub struct EventBus {
    pub after_operation: broadcast::Sender<AfterOperationEvent>,
    pub file_changes: broadcast::Sender<FileChangeEvent>,
    pub provider_registrations: broadcast::Sender<ProviderRegistrationEvent>,
    pub will_activate: broadcast::Sender<String>,
    pub errors: broadcast::Sender<FileOperationError>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            after_operation: broadcast::channel(CHANNEL_CAPACITY).0,
            file_changes: broadcast::channel(CHANNEL_CAPACITY).0,
            provider_registrations: broadcast::channel(CHANNEL_CAPACITY).0,
            will_activate: broadcast::channel(CHANNEL_CAPACITY).0,
            errors: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best-effort emit: no subscribers is not an error (spec: events are a
    /// side channel, never required for correctness of the calling operation).
    pub fn emit_after_operation(&self, event: AfterOperationEvent) {
        let _ = self.after_operation.send(event);
    }

    pub fn emit_file_change(&self, event: FileChangeEvent) {
        let _ = self.file_changes.send(event);
    }

    pub fn emit_registration(&self, scheme: &str, added: bool) {
        let _ = self.provider_registrations.send(ProviderRegistrationEvent { scheme: scheme.to_string(), added });
    }

    pub fn emit_error(&self, error: FileOperationError) {
        let _ = self.errors.send(error);
    }
}
