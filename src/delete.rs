//! Delete + mkdirp (spec §4.7).

use tracing::debug;

use crate::capability::has_trash;
use crate::error::{FileOperationError, FileOperationErrorKind, ProviderError};
use crate::provider::FileSystemProvider;
use crate::resolve::resolve;
use crate::stat::{FileStat, ResolveOptions};
use crate::uri::Resource;

/// `del(resource, {recursive, useTrash})` (spec §4.7).
pub async fn del(
    provider: &dyn FileSystemProvider,
    resource: &Resource,
    recursive: bool,
    use_trash: bool,
) -> Result<(), FileOperationError> {
    if use_trash && !has_trash(provider.capabilities()) {
        return Err(FileOperationError::new(
            FileOperationErrorKind::Unknown,
            resource.clone(),
            "provider does not support trash",
        ));
    }

    let stat = resolve(provider, resource, &ResolveOptions::default()).await?;

    if !recursive && stat.is_directory() {
        if let Some(children) = &stat.children {
            if !children.is_empty() {
                return Err(FileOperationError::new(
                    FileOperationErrorKind::Unknown,
                    resource.clone(),
                    "directory is not empty",
                ));
            }
        }
    }

    provider
        .delete(resource, recursive, use_trash)
        .await
        .map_err(|e| FileOperationError::from_provider(resource.clone(), e))?;

    debug!(resource = %resource, recursive, use_trash, "deleted");
    Ok(())
}

/// `mkdirp(provider, directory)` (spec §4.7): walk upward to the nearest
/// existing directory ancestor (or fail), then walk downward creating each
/// missing directory.
pub async fn mkdirp(provider: &dyn FileSystemProvider, directory: &Resource) -> Result<(), FileOperationError> {
    let mut missing = Vec::new();
    let mut cursor = directory.clone();

    loop {
        match provider.stat(&cursor).await {
            Ok(raw) if raw.kind.is_directory => break,
            Ok(_) => {
                return Err(FileOperationError::new(
                    FileOperationErrorKind::FileNotDirectory,
                    cursor.clone(),
                    "ancestor path exists but is not a directory",
                ));
            }
            Err(ProviderError::FileNotFound) => {
                let parent = cursor.parent();
                if parent == cursor {
                    // reached the root without finding an existing directory ancestor
                    break;
                }
                missing.push(cursor.clone());
                cursor = parent;
            }
            Err(other) => {
                return Err(FileOperationError::from_provider(cursor.clone(), other));
            }
        }
    }

    for resource in missing.into_iter().rev() {
        match provider.mkdir(&resource).await {
            Ok(()) | Err(ProviderError::FileExists) => {}
            Err(err) => return Err(FileOperationError::from_provider(resource, err)),
        }
    }
    Ok(())
}

/// `createFolder(resource)` (spec §4.7): `mkdirp` then re-resolve with metadata.
pub async fn create_folder(
    provider: &dyn FileSystemProvider,
    resource: &Resource,
) -> Result<FileStat, FileOperationError> {
    mkdirp(provider, resource).await?;
    let options = ResolveOptions { resolve_metadata: true, ..Default::default() };
    resolve(provider, resource, &options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mem_provider::MemFsProvider;

    #[tokio::test]
    async fn mkdirp_creates_missing_ancestors() {
        let provider = MemFsProvider::new();
        let target: Resource = "mem:///a/b/c".parse().unwrap();
        mkdirp(&provider, &target).await.unwrap();
        let raw = provider.stat(&target).await.unwrap();
        assert!(raw.kind.is_directory);
        let raw = provider.stat(&"mem:///a/b".parse().unwrap()).await.unwrap();
        assert!(raw.kind.is_directory);
    }

    #[tokio::test]
    async fn mkdirp_is_noop_on_existing_directory() {
        let provider = MemFsProvider::new();
        let target: Resource = "mem:///a".parse().unwrap();
        mkdirp(&provider, &target).await.unwrap();
        mkdirp(&provider, &target).await.unwrap();
    }

    #[tokio::test]
    async fn mkdirp_fails_when_ancestor_is_a_file() {
        let provider = MemFsProvider::new();
        provider.seed_file("/a", b"x").await;
        let target: Resource = "mem:///a/b".parse().unwrap();
        let err = mkdirp(&provider, &target).await.unwrap_err();
        assert_eq!(err.kind, FileOperationErrorKind::FileNotDirectory);
    }

    #[tokio::test]
    async fn delete_non_empty_directory_without_recursive_fails() {
        let provider = MemFsProvider::new();
        provider.seed_file("/dir/f.txt", b"x").await;
        let resource: Resource = "mem:///dir".parse().unwrap();
        let err = del(&provider, &resource, false, false).await.unwrap_err();
        assert_eq!(err.kind, FileOperationErrorKind::Unknown);
    }

    #[tokio::test]
    async fn delete_recursive_removes_subtree() {
        let provider = MemFsProvider::new();
        provider.seed_file("/dir/f.txt", b"x").await;
        let resource: Resource = "mem:///dir".parse().unwrap();
        del(&provider, &resource, true, false).await.unwrap();
        assert!(provider.stat(&resource).await.is_err());
    }

    #[tokio::test]
    async fn delete_missing_resource_fails_not_found() {
        let provider = MemFsProvider::new();
        let resource: Resource = "mem:///missing".parse().unwrap();
        let err = del(&provider, &resource, false, false).await.unwrap_err();
        assert_eq!(err.kind, FileOperationErrorKind::FileNotFound);
    }
}
