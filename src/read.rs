//! Read pipeline (spec §4.3).

use tokio::sync::mpsc;
use tracing::debug;

use crate::cancellation::CancellationToken;
use crate::capability::{can_open_read_write_close, can_read_stream, can_read_unbuffered, FileSystemProviderCapabilities};
use crate::error::{FileOperationError, FileOperationErrorKind, ProviderError};
use crate::provider::{FileSystemProvider, ProviderResult, StreamChunk};
use crate::resolve::resolve;
use crate::stat::{FileStat, ReadOptions, ResolveOptions, ETAG_DISABLED};
use crate::uri::Resource;

const POSITIONAL_CHUNK_SIZE: usize = 64 * 1024;

fn map_provider_error(resource: &Resource, err: ProviderError) -> FileOperationError {
    FileOperationError::from_provider(resource.clone(), err)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPath {
    Unbuffered,
    Streamed,
    Positional,
}

fn select_read_path(caps: FileSystemProviderCapabilities, prefer_unbuffered: bool) -> ReadPath {
    let has_rw = can_read_unbuffered(caps);
    let has_stream = can_read_stream(caps);
    let has_positional = can_open_read_write_close(caps);

    if has_rw && !has_stream && !has_positional {
        return ReadPath::Unbuffered;
    }
    if has_rw && prefer_unbuffered {
        return ReadPath::Unbuffered;
    }
    if has_stream {
        return ReadPath::Streamed;
    }
    if has_positional {
        return ReadPath::Positional;
    }
    // No capability advertises a read path; unbuffered is attempted and the
    // provider's stub implementation will surface its own error.
    ReadPath::Unbuffered
}

async fn validate_read_file(
    provider: &dyn FileSystemProvider,
    resource: &Resource,
    options: &ReadOptions,
) -> Result<FileStat, FileOperationError> {
    let stat = resolve(provider, resource, &ResolveOptions::default()).await?;

    if stat.is_directory() {
        return Err(FileOperationError::new(
            FileOperationErrorKind::FileIsDirectory,
            resource.clone(),
            "cannot read a directory",
        ));
    }
    if let Some(etag) = &options.etag {
        if etag != ETAG_DISABLED && *etag == stat.etag {
            return Err(FileOperationError::new(
                FileOperationErrorKind::FileNotModifiedSince,
                resource.clone(),
                "resource not modified since given etag",
            ));
        }
    }
    if let Some(limit) = options.limit_size {
        if stat.size > limit {
            return Err(FileOperationError::new(
                FileOperationErrorKind::FileTooLarge,
                resource.clone(),
                "file exceeds configured size limit",
            ));
        }
    }
    if let Some(limit) = options.limit_memory {
        if stat.size > limit {
            return Err(FileOperationError::new(
                FileOperationErrorKind::FileExceedsMemoryLimit,
                resource.clone(),
                "file exceeds configured memory limit",
            ));
        }
    }
    Ok(stat)
}

fn slice_bytes(data: Vec<u8>, position: Option<u64>, length: Option<u64>) -> Vec<u8> {
    let start = position.unwrap_or(0) as usize;
    if start >= data.len() {
        return Vec::new();
    }
    let end = match length {
        Some(0) => start,
        Some(len) => (start + len as usize).min(data.len()),
        None => data.len(),
    };
    data[start..end].to_vec()
}

async fn read_positional(
    provider: &dyn FileSystemProvider,
    resource: &Resource,
    position: Option<u64>,
    length: Option<u64>,
    token: &CancellationToken,
) -> ProviderResult<Vec<u8>> {
    if length == Some(0) {
        return Ok(Vec::new());
    }
    let fd = provider.open(resource, false).await?;
    let mut offset = position.unwrap_or(0);
    let mut collected = Vec::new();
    let remaining_limit = length;
    loop {
        if token.is_cancelled() {
            break;
        }
        let want = remaining_limit
            .map(|l| (l as usize).saturating_sub(collected.len()).min(POSITIONAL_CHUNK_SIZE))
            .unwrap_or(POSITIONAL_CHUNK_SIZE);
        if want == 0 {
            break;
        }
        let chunk = match provider.read(fd, offset, want).await {
            Ok(chunk) => chunk,
            Err(err) => {
                token.cancel();
                let _ = provider.close(fd).await;
                return Err(err);
            }
        };
        if chunk.is_empty() {
            break;
        }
        offset += chunk.len() as u64;
        collected.extend_from_slice(&chunk);
        if let Some(limit) = remaining_limit {
            if collected.len() as u64 >= limit {
                break;
            }
        }
    }
    provider.close(fd).await?;
    Ok(collected)
}

/// `readFile(resource, options)` (spec §4.3).
pub async fn read_file(
    provider: &dyn FileSystemProvider,
    resource: &Resource,
    options: &ReadOptions,
) -> Result<(FileStat, Vec<u8>), FileOperationError> {
    let token = CancellationToken::new();

    // Validation (existence, directory check, etag/size preconditions) must
    // always complete before the read path is chosen and run, since the read
    // path itself depends on the resolved stat.
    let stat = validate_read_file(provider, resource, options).await.map_err(|e| {
        token.cancel();
        e
    })?;

    let caps = provider.capabilities();
    let path = select_read_path(caps, options.prefer_unbuffered);
    debug!(resource = %resource, ?path, "read pipeline path selected");

    let bytes = match path {
        ReadPath::Unbuffered => {
            let data = provider.read_file(resource).await.map_err(|e| {
                token.cancel();
                map_provider_error(resource, e)
            })?;
            slice_bytes(data, options.position, options.length)
        }
        ReadPath::Streamed => {
            let mut receiver = provider
                .read_file_stream(resource, options.position, options.length)
                .await
                .map_err(|e| {
                    token.cancel();
                    map_provider_error(resource, e)
                })?;
            let mut collected = Vec::new();
            while let Some(chunk) = receiver.recv().await {
                match chunk {
                    Ok(bytes) => collected.extend_from_slice(&bytes),
                    Err(err) => {
                        token.cancel();
                        return Err(map_provider_error(resource, err));
                    }
                }
            }
            collected
        }
        ReadPath::Positional => read_positional(provider, resource, options.position, options.length, &token)
            .await
            .map_err(|e| {
                token.cancel();
                map_provider_error(resource, e)
            })?,
    };

    Ok((stat, bytes))
}

/// `readFileStream(resource, options)` (spec §4.3): returns the stat plus a
/// channel of chunks instead of one assembled buffer.
pub async fn read_file_stream(
    provider: &dyn FileSystemProvider,
    resource: &Resource,
    options: &ReadOptions,
) -> Result<(FileStat, mpsc::Receiver<StreamChunk>), FileOperationError> {
    let token = CancellationToken::new();
    let stat = validate_read_file(provider, resource, options).await.map_err(|e| {
        token.cancel();
        e
    })?;

    let caps = provider.capabilities();
    let path = select_read_path(caps, options.prefer_unbuffered);
    let (tx, rx) = mpsc::channel::<StreamChunk>(8);

    match path {
        ReadPath::Streamed => {
            let mut upstream = provider
                .read_file_stream(resource, options.position, options.length)
                .await
                .map_err(|e| {
                    token.cancel();
                    map_provider_error(resource, e)
                })?;
            tokio::spawn(async move {
                while let Some(chunk) = upstream.recv().await {
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
            });
        }
        ReadPath::Unbuffered => {
            let data = provider.read_file(resource).await.map_err(|e| {
                token.cancel();
                map_provider_error(resource, e)
            })?;
            let sliced = slice_bytes(data, options.position, options.length);
            let _ = tx.send(Ok(sliced)).await;
        }
        ReadPath::Positional => {
            let position = options.position;
            let length = options.length;
            let resource = resource.clone();
            // SAFETY note: providers are `Send + Sync` trait objects behind
            // `Arc` at the service layer; this pipeline is generic over
            // `&dyn FileSystemProvider` for direct callers/tests only.
            let bytes = read_positional(provider, &resource, position, length, &token).await;
            match bytes {
                Ok(data) => {
                    let _ = tx.send(Ok(data)).await;
                }
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                }
            }
        }
    }

    Ok((stat, rx))
}
