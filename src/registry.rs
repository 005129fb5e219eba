//! Provider registry (spec §4.1).
//!
//! Generalizes the teacher's `Export` registry (`src/export/mod.rs`, a
//! `HashMap<Uid, FileNode>` populated lazily) to a concurrent scheme→provider
//! map. Uses `whirlwind::ShardMap`, a dependency the teacher declares but
//! never exercises — this is its first real use in the transformed crate.

use std::sync::Arc;

use tracing::{debug, info, warn};
use whirlwind::ShardMap;

use crate::capability::FileSystemProviderCapabilities;
use crate::error::{FileOperationError, FileOperationErrorKind};
use crate::events::EventBus;
use crate::provider::{Disposable, FileSystemProvider};
use crate::uri::Resource;

/// Handle returned by [`ProviderRegistry::register`]; disposing it unregisters
/// the provider and tears down its event subscriptions (spec §4.1).
pub struct RegistrationHandle {
    scheme: String,
    registry: Arc<ProviderRegistry>,
}

impl Disposable for RegistrationHandle {
    fn dispose(self: Box<Self>) {
        self.registry.unregister(&self.scheme);
    }
}

/// Maps scheme → provider; fires registration events; mediates activation.
pub struct ProviderRegistry {
    providers: ShardMap<String, Arc<dyn FileSystemProvider>>,
    events: Arc<EventBus>,
}

impl ProviderRegistry {
    pub fn new(events: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self { providers: ShardMap::new(), events })
    }

    /// Register `provider` for `scheme`. Fails if the scheme is already bound.
    pub async fn register(
        self: &Arc<Self>,
        scheme: impl Into<String>,
        provider: Arc<dyn FileSystemProvider>,
    ) -> Result<RegistrationHandle, FileOperationError> {
        let scheme = scheme.into();
        if self.providers.contains_key(&scheme).await {
            return Err(FileOperationError::new(
                FileOperationErrorKind::Unknown,
                Resource::new(scheme.clone(), "/"),
                "scheme already has a registered provider",
            ));
        }
        self.providers.insert(scheme.clone(), provider).await;
        info!(scheme = %scheme, "provider registered");
        self.events.emit_registration(&scheme, true);
        Ok(RegistrationHandle { scheme, registry: self.clone() })
    }

    fn unregister(&self, scheme: &str) {
        // Dropping removal from the map invalidates every handle the
        // provider owned (spec §3 lifecycle note); fired as a removal event.
        let providers = &self.providers;
        let scheme = scheme.to_string();
        let events = self.events.clone();
        tokio::spawn(async move {
            providers.remove(&scheme).await;
            info!(scheme = %scheme, "provider unregistered");
            events.emit_registration(&scheme, false);
        });
    }

    /// Fire `onWillActivateFileSystemProvider` and await any listener-joined work.
    ///
    /// This service has no external activation listeners of its own (that is
    /// a higher-level concern, out of scope per spec §1); the broadcast exists
    /// so a consumer embedding this service can lazily register providers on
    /// first use.
    pub async fn activate(&self, scheme: &str) {
        debug!(scheme = %scheme, "activating provider");
        let _ = self.events.will_activate.send(scheme.to_string());
    }

    /// Require `resource.path` absolute; activate the scheme; return the provider.
    pub async fn with_provider(
        &self,
        resource: &Resource,
    ) -> Result<Arc<dyn FileSystemProvider>, FileOperationError> {
        if !resource.has_absolute_path() {
            return Err(FileOperationError::new(
                FileOperationErrorKind::FileInvalidPath,
                resource.clone(),
                "resource path must be absolute",
            ));
        }
        self.activate(&resource.scheme).await;
        match self.providers.get(&resource.scheme).await {
            Some(provider) => Ok(provider),
            None => {
                warn!(scheme = %resource.scheme, "no provider registered for scheme");
                Err(FileOperationError::new(
                    FileOperationErrorKind::NoProvider,
                    resource.clone(),
                    format!("no filesystem provider for scheme '{}'", resource.scheme),
                ))
            }
        }
    }

    pub async fn can_handle_resource(&self, resource: &Resource) -> bool {
        resource.has_absolute_path() && self.providers.contains_key(&resource.scheme).await
    }

    pub async fn has_capability(
        &self,
        resource: &Resource,
        capability: FileSystemProviderCapabilities,
    ) -> bool {
        match self.providers.get(&resource.scheme).await {
            Some(provider) => provider.capabilities().contains(capability),
            None => false,
        }
    }

    pub async fn dispose(&self) {
        // ShardMap has no bulk-clear primitive we rely on beyond drop; each
        // RegistrationHandle is expected to be disposed by its owner before
        // the service itself goes away (spec §9: "no cyclic ownership").
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mem_provider::MemFsProvider;

    #[tokio::test]
    async fn register_then_lookup_then_unregister() {
        let events = Arc::new(EventBus::new());
        let registry = ProviderRegistry::new(events);
        let provider: Arc<dyn FileSystemProvider> = Arc::new(MemFsProvider::new());
        let handle = registry.register("mem", provider).await.unwrap();

        let resource: Resource = "mem:///a.txt".parse().unwrap();
        assert!(registry.with_provider(&resource).await.is_ok());

        Box::new(handle).dispose();
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(registry.with_provider(&resource).await.is_err());
    }

    #[tokio::test]
    async fn double_register_fails() {
        let events = Arc::new(EventBus::new());
        let registry = ProviderRegistry::new(events);
        let a: Arc<dyn FileSystemProvider> = Arc::new(MemFsProvider::new());
        let b: Arc<dyn FileSystemProvider> = Arc::new(MemFsProvider::new());
        registry.clone().register("mem", a).await.unwrap();
        assert!(registry.register("mem", b).await.is_err());
    }

    #[tokio::test]
    async fn relative_path_is_invalid() {
        let events = Arc::new(EventBus::new());
        let registry = ProviderRegistry::new(events);
        let resource = Resource::new("mem", "relative/path");
        let err = registry.with_provider(&resource).await.unwrap_err();
        assert_eq!(err.kind, FileOperationErrorKind::FileInvalidPath);
    }
}
