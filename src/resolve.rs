//! Stat resolver / tree walker (spec §4.2).

use tracing::warn;

use crate::error::{FileOperationError, FileOperationErrorKind, ProviderError};
use crate::provider::{FileSystemProvider, RawDirEntry, RawStat};
use crate::stat::{compute_etag, FileStat, ResolveOptions};
use crate::trie::ResolveTargets;
use crate::uri::Resource;

fn to_file_stat(resource: &Resource, raw: &RawStat, children: Option<Vec<FileStat>>) -> FileStat {
    FileStat {
        resource: resource.clone(),
        name: resource.basename(),
        kind: raw.kind,
        mtime: raw.mtime,
        ctime: raw.ctime,
        size: raw.size,
        etag: compute_etag(raw.mtime, raw.size),
        children,
    }
}

fn minimal_file_stat(resource: &Resource, entry: &RawDirEntry) -> FileStat {
    FileStat {
        resource: resource.clone(),
        name: entry.name.clone(),
        kind: entry.kind,
        mtime: 0,
        ctime: 0,
        size: 0,
        etag: String::new(),
        children: None,
    }
}

fn map_top_level_error(resource: &Resource, err: ProviderError) -> FileOperationError {
    // spec §4.2: "Top-level errors map FileNotFound -> FILE_NOT_FOUND; other
    // provider errors propagate as-is", i.e. go through the normal boundary
    // mapping rather than being coalesced.
    FileOperationError::from_provider(resource.clone(), err)
}

/// `resolve(resource, options)` (spec §4.2).
pub async fn resolve(
    provider: &dyn FileSystemProvider,
    resource: &Resource,
    options: &ResolveOptions,
) -> Result<FileStat, FileOperationError> {
    let raw = provider.stat(resource).await.map_err(|e| map_top_level_error(resource, e))?;

    if !raw.kind.is_directory {
        return Ok(to_file_stat(resource, &raw, None));
    }

    let targets = ResolveTargets::new(resource, &options.resolve_to);
    let children = resolve_children(provider, resource, &targets, options).await;
    Ok(to_file_stat(resource, &raw, Some(children)))
}

/// Recursively lists `directory`, deciding per-child whether to expand
/// further. Errors reading individual children are logged and coalesced out;
/// an error reading the directory listing itself yields an empty `children`.
async fn resolve_children(
    provider: &dyn FileSystemProvider,
    directory: &Resource,
    targets: &ResolveTargets,
    options: &ResolveOptions,
) -> Vec<FileStat> {
    let entries = match provider.readdir(directory).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(resource = %directory, error = %err, "readdir failed, yielding empty children");
            return Vec::new();
        }
    };

    let sibling_count = entries.len();
    let mut out = Vec::with_capacity(entries.len());

    for entry in &entries {
        let child_resource = directory.join(&entry.name);

        let mut stat = if options.resolve_metadata {
            match provider.stat(&child_resource).await {
                Ok(raw) => to_file_stat(&child_resource, &raw, None),
                Err(err) => {
                    warn!(resource = %child_resource, error = %err, "per-child stat failed, coalescing out");
                    continue;
                }
            }
        } else {
            minimal_file_stat(&child_resource, entry)
        };

        if stat.kind.is_directory {
            let should_expand = targets.has_entry_at_or_beneath(&child_resource)
                || (options.resolve_single_child_descendants && sibling_count == 1);
            if should_expand {
                let grandchildren =
                    Box::pin(resolve_children(provider, &child_resource, targets, options)).await;
                stat.children = Some(grandchildren);
            }
        }

        out.push(stat);
    }

    out
}

/// `resolveAll(entries)` (spec §4.2): independent resolves, no failure propagates out.
pub async fn resolve_all(
    provider: &dyn FileSystemProvider,
    entries: &[(Resource, ResolveOptions)],
) -> Vec<Result<FileStat, ()>> {
    let mut out = Vec::with_capacity(entries.len());
    for (resource, options) in entries {
        match resolve(provider, resource, options).await {
            Ok(stat) => out.push(Ok(stat)),
            Err(err) => {
                warn!(resource = %resource, error = %err, "resolveAll: resolve failed, reporting success=false");
                out.push(Err(()));
            }
        }
    }
    out
}

/// `exists(resource)` (spec §4.2): any stat error maps to `false`.
pub async fn exists(provider: &dyn FileSystemProvider, resource: &Resource) -> bool {
    provider.stat(resource).await.is_ok()
}

pub fn map_not_found(resource: &Resource) -> FileOperationError {
    FileOperationError::new(FileOperationErrorKind::FileNotFound, resource.clone(), "file not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mem_provider::MemFsProvider;

    #[tokio::test]
    async fn resolve_single_file() {
        let provider = MemFsProvider::new();
        provider.seed_file("/a.txt", b"hello").await;
        let resource: Resource = "mem:///a.txt".parse().unwrap();
        let stat = resolve(&provider, &resource, &ResolveOptions::default()).await.unwrap();
        assert!(stat.is_file());
        assert_eq!(stat.size, 5);
    }

    #[tokio::test]
    async fn resolve_directory_without_targets_does_not_recurse_into_children_dirs() {
        let provider = MemFsProvider::new();
        provider.seed_file("/dir/sub/f.txt", b"x").await;
        let resource: Resource = "mem:///dir".parse().unwrap();
        let stat = resolve(&provider, &resource, &ResolveOptions::default()).await.unwrap();
        let children = stat.children.unwrap();
        assert_eq!(children.len(), 1);
        assert!(children[0].is_directory());
        assert!(children[0].children.is_none());
    }

    #[tokio::test]
    async fn resolve_to_forces_expansion_along_path() {
        let provider = MemFsProvider::new();
        provider.seed_file("/dir/sub/f.txt", b"x").await;
        let resource: Resource = "mem:///dir".parse().unwrap();
        let target: Resource = "mem:///dir/sub/f.txt".parse().unwrap();
        let options = ResolveOptions { resolve_to: vec![target], ..Default::default() };
        let stat = resolve(&provider, &resource, &options).await.unwrap();
        let children = stat.children.unwrap();
        let sub = children.iter().find(|c| c.name == "sub").unwrap();
        let grandchildren = sub.children.as_ref().unwrap();
        assert_eq!(grandchildren.len(), 1);
        assert_eq!(grandchildren[0].name, "f.txt");
    }

    #[tokio::test]
    async fn exists_false_for_missing_resource() {
        let provider = MemFsProvider::new();
        let resource: Resource = "mem:///missing".parse().unwrap();
        assert!(!exists(&provider, &resource).await);
    }

    #[tokio::test]
    async fn resolve_not_found_maps_to_taxonomy() {
        let provider = MemFsProvider::new();
        let resource: Resource = "mem:///missing".parse().unwrap();
        let err = resolve(&provider, &resource, &ResolveOptions::default()).await.unwrap_err();
        assert_eq!(err.kind, FileOperationErrorKind::FileNotFound);
    }
}
