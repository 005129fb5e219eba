//! Move/Copy engine + cross-provider byte pipe (spec §4.5/§4.6).

use std::sync::Arc;

use tracing::debug;

use crate::capability::{can_copy_natively, can_open_read_write_close, can_read_unbuffered, is_case_sensitive};
use crate::delete::{del, mkdirp};
use crate::error::{FileOperationError, FileOperationErrorKind, ProviderError};
use crate::provider::{FileDescriptor, FileSystemProvider, ProviderResult};
use crate::resolve::resolve;
use crate::stat::ResolveOptions;
use crate::uri::Resource;
use crate::write_queue::WriteQueueTable;

const PIPE_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Move,
    Copy,
}

fn is_same_resource_different_case(source: &Resource, target: &Resource, case_sensitive: bool) -> bool {
    !case_sensitive
        && source.to_string() != target.to_string()
        && source.to_string().to_lowercase() == target.to_string().to_lowercase()
}

/// `doValidateMoveCopy` (spec §4.5).
async fn validate_move_copy(
    source_provider: &dyn FileSystemProvider,
    source: &Resource,
    target_provider: &dyn FileSystemProvider,
    target: &Resource,
    same_provider: bool,
    mode: OperationMode,
    overwrite: bool,
) -> Result<ValidationOutcome, FileOperationError> {
    if source.to_string() == target.to_string() {
        return Ok(ValidationOutcome::NoOp);
    }

    let case_sensitive = is_case_sensitive(source_provider.capabilities());
    let same_case_diff_path = same_provider && is_same_resource_different_case(source, target, case_sensitive);

    if same_case_diff_path && mode == OperationMode::Copy {
        // spec §4.5/§8: copying onto self with only a casing difference on a
        // case-insensitive provider must fail, not silently no-op or clobber
        // the single backing file a rename would otherwise just relabel.
        return Err(FileOperationError::new(
            FileOperationErrorKind::FileMoveConflict,
            target.clone(),
            "cannot copy onto self with different casing on a case-insensitive provider",
        ));
    }

    if same_provider && !same_case_diff_path && target.is_at_or_beneath(source) {
        return Err(FileOperationError::new(
            FileOperationErrorKind::FileMoveConflict,
            target.clone(),
            "target is an ancestor of or equal to source",
        ));
    }

    let target_exists = target_provider.stat(target).await.is_ok();
    if target_exists && !same_case_diff_path {
        if !overwrite {
            return Err(FileOperationError::new(
                FileOperationErrorKind::FileMoveConflict,
                target.clone(),
                "target already exists",
            ));
        }
        if same_provider && source.is_at_or_beneath(target) {
            return Err(FileOperationError::new(
                FileOperationErrorKind::FileMoveConflict,
                target.clone(),
                "overwriting target would delete source",
            ));
        }
    }

    Ok(ValidationOutcome::Proceed { target_exists, same_case_diff_path })
}

enum ValidationOutcome {
    NoOp,
    Proceed { target_exists: bool, same_case_diff_path: bool },
}

/// `doMoveCopy(srcProvider, source, tgtProvider, target, mode, overwrite)` (spec §4.5).
pub async fn do_move_copy(
    source_provider: Arc<dyn FileSystemProvider>,
    source: &Resource,
    target_provider: Arc<dyn FileSystemProvider>,
    target: &Resource,
    write_queue: &WriteQueueTable,
    mode: OperationMode,
    overwrite: bool,
) -> Result<OperationMode, FileOperationError> {
    let same_provider = source_provider.scheme() == target_provider.scheme();

    let outcome = validate_move_copy(&*source_provider, source, &*target_provider, target, same_provider, mode, overwrite).await?;
    let (target_exists, same_case_diff_path) = match outcome {
        ValidationOutcome::NoOp => return Ok(mode),
        ValidationOutcome::Proceed { target_exists, same_case_diff_path } => (target_exists, same_case_diff_path),
    };

    if target_exists && !same_case_diff_path {
        del(&*target_provider, target, true, false).await?;
    }
    mkdirp(&*target_provider, &target.parent()).await?;

    match mode {
        OperationMode::Copy => {
            if same_provider && can_copy_natively(source_provider.capabilities()) {
                source_provider
                    .copy(source, target, overwrite)
                    .await
                    .map_err(|e| FileOperationError::from_provider(target.clone(), e))?;
            } else {
                copy_recursive(&source_provider, source, &target_provider, target, write_queue).await?;
            }
            Ok(OperationMode::Copy)
        }
        OperationMode::Move => {
            if same_provider {
                source_provider
                    .rename(source, target, overwrite)
                    .await
                    .map_err(|e| FileOperationError::from_provider(target.clone(), e))?;
                Ok(OperationMode::Move)
            } else {
                Box::pin(do_move_copy(
                    source_provider.clone(),
                    source,
                    target_provider,
                    target,
                    write_queue,
                    OperationMode::Copy,
                    overwrite,
                ))
                .await?;
                del(&*source_provider, source, true, false).await?;
                // Cross-provider move internally performs copy+delete but the
                // top-level entry still reports MOVE (spec §4.5, §12 decision 2).
                Ok(OperationMode::Copy)
            }
        }
    }
}

/// Recursive folder copy across providers, dispatching files to the byte pipe.
async fn copy_recursive(
    source_provider: &Arc<dyn FileSystemProvider>,
    source: &Resource,
    target_provider: &Arc<dyn FileSystemProvider>,
    target: &Resource,
    write_queue: &WriteQueueTable,
) -> Result<(), FileOperationError> {
    let stat = resolve(&**source_provider, source, &ResolveOptions::default()).await?;

    if !stat.is_directory() {
        pipe_file(source_provider, source, target_provider, target, write_queue).await?;
        return Ok(());
    }

    target_provider
        .mkdir(target)
        .await
        .map_err(|e| FileOperationError::from_provider(target.clone(), e))?;

    let entries = source_provider
        .readdir(source)
        .await
        .map_err(|e| FileOperationError::from_provider(source.clone(), e))?;

    for entry in entries {
        let child_source = source.join(&entry.name);
        let child_target = target.join(&entry.name);
        if entry.kind.is_directory {
            Box::pin(copy_recursive(source_provider, &child_source, target_provider, &child_target, write_queue)).await?;
        } else {
            pipe_file(source_provider, &child_source, target_provider, &child_target, write_queue).await?;
        }
    }
    Ok(())
}

/// The four-variant cross-provider byte pipe (spec §4.6).
async fn pipe_file(
    source_provider: &Arc<dyn FileSystemProvider>,
    source: &Resource,
    target_provider: &Arc<dyn FileSystemProvider>,
    target: &Resource,
    write_queue: &WriteQueueTable,
) -> Result<(), FileOperationError> {
    let source_positional = can_open_read_write_close(source_provider.capabilities());
    let target_positional = can_open_read_write_close(target_provider.capabilities());
    let source_unbuffered = can_read_unbuffered(source_provider.capabilities());
    let target_unbuffered = can_read_unbuffered(target_provider.capabilities());

    let key = target.canonical_key(is_case_sensitive(target_provider.capabilities()));
    let source_provider = source_provider.clone();
    let source = source.clone();
    let target_provider_for_queue = target_provider.clone();
    let target_for_queue = target.clone();

    let result: ProviderResult<()> = write_queue
        .run(&key, move || async move {
            match (source_positional, target_positional) {
                (true, true) => {
                    pipe_positional_to_positional(&*source_provider, &source, &*target_provider_for_queue, &target_for_queue).await
                }
                (true, false) => {
                    let bytes = read_positional_whole(&*source_provider, &source).await?;
                    target_provider_for_queue.write_file(&target_for_queue, &bytes, true, true).await
                }
                (false, true) => {
                    let bytes = source_provider.read_file(&source).await?;
                    write_positional_whole(&*target_provider_for_queue, &target_for_queue, &bytes).await
                }
                (false, false) => {
                    let _ = (source_unbuffered, target_unbuffered);
                    let bytes = source_provider.read_file(&source).await?;
                    target_provider_for_queue.write_file(&target_for_queue, &bytes, true, true).await
                }
            }
        })
        .await;

    result.map_err(|e| FileOperationError::from_provider(target.clone(), e))?;
    debug!(source = %source, target = %target, "byte pipe completed");
    Ok(())
}

async fn read_positional_whole(provider: &dyn FileSystemProvider, resource: &Resource) -> ProviderResult<Vec<u8>> {
    let fd = provider.open(resource, false).await?;
    let mut offset = 0u64;
    let mut buf = Vec::new();
    let result: ProviderResult<()> = async {
        loop {
            let chunk = provider.read(fd, offset, PIPE_CHUNK_SIZE).await?;
            if chunk.is_empty() {
                break;
            }
            offset += chunk.len() as u64;
            buf.extend_from_slice(&chunk);
        }
        Ok(())
    }
    .await;
    provider.close(fd).await?;
    result?;
    Ok(buf)
}

async fn write_positional_whole(provider: &dyn FileSystemProvider, resource: &Resource, data: &[u8]) -> ProviderResult<()> {
    let fd = provider.open(resource, true).await?;
    let result = write_buffer_loop(provider, fd, data).await;
    provider.close(fd).await?;
    result
}

async fn pipe_positional_to_positional(
    source_provider: &dyn FileSystemProvider,
    source: &Resource,
    target_provider: &dyn FileSystemProvider,
    target: &Resource,
) -> ProviderResult<()> {
    let src_fd = source_provider.open(source, false).await?;
    let result: ProviderResult<()> = async {
        let tgt_fd = target_provider.open(target, true).await?;
        let pipe_result: ProviderResult<()> = async {
            let mut src_offset = 0u64;
            loop {
                let chunk = source_provider.read(src_fd, src_offset, PIPE_CHUNK_SIZE).await?;
                if chunk.is_empty() {
                    break;
                }
                src_offset += chunk.len() as u64;
                write_buffer_loop(target_provider, tgt_fd, &chunk).await?;
            }
            Ok(())
        }
        .await;
        target_provider.close(tgt_fd).await?;
        pipe_result
    }
    .await;
    source_provider.close(src_fd).await?;
    result
}

/// Write `data` to `fd` starting at offset 0, handling short writes.
async fn write_buffer_loop(provider: &dyn FileSystemProvider, fd: FileDescriptor, data: &[u8]) -> ProviderResult<()> {
    let mut written = 0usize;
    let mut offset = 0u64;
    while written < data.len() {
        let n = provider.write(fd, offset, &data[written..]).await?;
        if n == 0 {
            return Err(ProviderError::Other("provider write returned 0 bytes".into()));
        }
        written += n;
        offset += n as u64;
    }
    Ok(())
}
