//! Write pipeline (spec §4.4). Event emission (`CREATE`/`WRITE`) happens at
//! the service layer, which wraps these entry points and knows the caller's
//! intent; this module only validates, writes, and returns the fresh stat.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::capability::{can_open_read_write_close, can_read_unbuffered, is_case_sensitive, is_readonly};
use crate::delete::mkdirp;
use crate::error::{FileOperationError, FileOperationErrorKind, ProviderError};
use crate::provider::{FileDescriptor, FileSystemProvider, ProviderResult, WriteData};
use crate::resolve::resolve;
use crate::stat::{compute_etag, FileStat, ResolveOptions, WriteOptions};
use crate::uri::Resource;
use crate::write_queue::WriteQueueTable;

const EAGER_CHUNK_LIMIT: usize = 3;

/// What remains of a pull/push-style input after eager consumption.
enum Remainder {
    Done,
    Pull(Box<dyn FnMut() -> Option<Vec<u8>> + Send>),
    Push(mpsc::Receiver<ProviderResult<Vec<u8>>>),
}

/// Step 4 (spec §4.4): for non-byte inputs on an unbuffered-capable provider,
/// eagerly consume up to `EAGER_CHUNK_LIMIT` chunks. Returns the concatenated
/// prefix and, if the input wasn't fully drained within the budget, what's
/// left of it.
async fn eager_consume(data: WriteData) -> ProviderResult<(Vec<u8>, Remainder)> {
    match data {
        WriteData::Bytes(bytes) => Ok((bytes, Remainder::Done)),
        WriteData::PullReadable(mut pull) => {
            let mut buf = Vec::new();
            for _ in 0..EAGER_CHUNK_LIMIT {
                match pull() {
                    Some(chunk) => buf.extend_from_slice(&chunk),
                    None => return Ok((buf, Remainder::Done)),
                }
            }
            Ok((buf, Remainder::Pull(pull)))
        }
        WriteData::PushStream(mut rx) => {
            let mut buf = Vec::new();
            for _ in 0..EAGER_CHUNK_LIMIT {
                match rx.recv().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(err)) => return Err(err),
                    None => return Ok((buf, Remainder::Done)),
                }
            }
            Ok((buf, Remainder::Push(rx)))
        }
    }
}

/// Write `chunk` at `offset`, re-entering on short writes until fully
/// written (spec §4.6: "handles short writes by re-entering with updated
/// offsets until the chunk is fully written"). Returns the new offset.
async fn write_chunk_looped(
    provider: &dyn FileSystemProvider,
    fd: FileDescriptor,
    chunk: &[u8],
    mut offset: u64,
) -> ProviderResult<u64> {
    let mut written = 0usize;
    while written < chunk.len() {
        let n = provider.write(fd, offset, &chunk[written..]).await?;
        if n == 0 {
            return Err(ProviderError::Other("provider write returned 0 bytes".into()));
        }
        written += n;
        offset += n as u64;
    }
    Ok(offset)
}

/// Positional-buffered write path (spec §4.4 step 5): `open`, loop-write,
/// `close` on every exit path.
async fn write_positional(
    provider: &dyn FileSystemProvider,
    resource: &Resource,
    prefix: Vec<u8>,
    mut remainder: Remainder,
) -> ProviderResult<()> {
    let fd = provider.open(resource, true).await?;

    let result: ProviderResult<()> = async {
        let mut offset = 0u64;
        if !prefix.is_empty() {
            offset = write_chunk_looped(provider, fd, &prefix, offset).await?;
        }
        loop {
            let next = match &mut remainder {
                Remainder::Done => None,
                Remainder::Pull(pull) => pull(),
                Remainder::Push(rx) => match rx.recv().await {
                    Some(Ok(chunk)) => Some(chunk),
                    Some(Err(err)) => return Err(err),
                    None => None,
                },
            };
            match next {
                Some(chunk) => {
                    offset = write_chunk_looped(provider, fd, &chunk, offset).await?;
                }
                None => break,
            }
        }
        Ok(())
    }
    .await;

    provider.close(fd).await?;
    result
}

async fn read_all(data: WriteData) -> ProviderResult<Vec<u8>> {
    match eager_consume(data).await? {
        (buf, Remainder::Done) => Ok(buf),
        (mut buf, Remainder::Pull(mut pull)) => {
            while let Some(chunk) = pull() {
                buf.extend_from_slice(&chunk);
            }
            Ok(buf)
        }
        (mut buf, Remainder::Push(mut rx)) => {
            while let Some(chunk) = rx.recv().await {
                buf.extend_from_slice(&chunk?);
            }
            Ok(buf)
        }
    }
}

/// Validate the write target (spec §4.4 step 2): directory check, then the
/// mtime+etag dirty-write guard. Returns `true` if the resource already
/// exists (so `mkdirp` can be skipped).
async fn validate_write(
    provider: &dyn FileSystemProvider,
    resource: &Resource,
    options: &WriteOptions,
) -> Result<bool, FileOperationError> {
    match provider.stat(resource).await {
        Ok(raw) => {
            if raw.kind.is_directory {
                return Err(FileOperationError::new(
                    FileOperationErrorKind::FileIsDirectory,
                    resource.clone(),
                    "cannot write to a directory",
                ));
            }
            if let (Some(expected_mtime), Some(expected_etag)) = (options.mtime, &options.etag) {
                if raw.mtime > expected_mtime {
                    let recomputed = compute_etag(expected_mtime, raw.size);
                    if &recomputed != expected_etag {
                        return Err(FileOperationError::new(
                            FileOperationErrorKind::FileModifiedSince,
                            resource.clone(),
                            "resource was modified since the given mtime/etag",
                        ));
                    }
                }
            }
            Ok(true)
        }
        Err(ProviderError::FileNotFound) => Ok(false),
        Err(other) => Err(FileOperationError::from_provider(resource.clone(), other)),
    }
}

/// `writeFile(resource, data, options)` (spec §4.4).
pub async fn write_file(
    provider: Arc<dyn FileSystemProvider>,
    write_queue: &WriteQueueTable,
    resource: &Resource,
    data: WriteData,
    options: &WriteOptions,
) -> Result<FileStat, FileOperationError> {
    let caps = provider.capabilities();
    if is_readonly(caps) {
        return Err(FileOperationError::new(
            FileOperationErrorKind::FilePermissionDenied,
            resource.clone(),
            "provider is readonly",
        ));
    }

    let existed = validate_write(&*provider, resource, options).await?;
    if !existed {
        mkdirp(&*provider, &resource.parent()).await?;
    }

    let key = resource.canonical_key(is_case_sensitive(caps));
    let queued_provider = provider.clone();
    let queued_resource = resource.clone();

    write_queue
        .run(&key, move || async move {
            execute_write(queued_provider, &queued_resource, data).await
        })
        .await
        .map_err(|e| FileOperationError::from_provider(resource.clone(), e))?;

    debug!(resource = %resource, "write committed");
    resolve(&*provider, resource, &ResolveOptions { resolve_metadata: true, ..Default::default() }).await
}

/// Executes the already-validated write: picks unbuffered vs. positional
/// per capability, applying the eager-coalescing heuristic for non-byte
/// inputs on unbuffered providers (spec §4.4 steps 4-5).
async fn execute_write(
    provider: Arc<dyn FileSystemProvider>,
    resource: &Resource,
    data: WriteData,
) -> ProviderResult<()> {
    let caps = provider.capabilities();
    let unbuffered_capable = can_read_unbuffered(caps);
    let positional_capable = can_open_read_write_close(caps);

    if unbuffered_capable {
        if let WriteData::Bytes(bytes) = data {
            return provider.write_file(resource, &bytes, true, true).await;
        }
        let (prefix, remainder) = eager_consume(data).await?;
        if matches!(remainder, Remainder::Done) {
            return provider.write_file(resource, &prefix, true, true).await;
        }
        if positional_capable {
            return write_positional(&*provider, resource, prefix, remainder).await;
        }
        // No positional path either: fall back to fully draining into one
        // unbuffered write (the provider's only write path).
        let mut buf = prefix;
        match remainder {
            Remainder::Pull(mut pull) => {
                while let Some(chunk) = pull() {
                    buf.extend_from_slice(&chunk);
                }
            }
            Remainder::Push(mut rx) => {
                while let Some(chunk) = rx.recv().await {
                    buf.extend_from_slice(&chunk?);
                }
            }
            Remainder::Done => {}
        }
        return provider.write_file(resource, &buf, true, true).await;
    }

    if positional_capable {
        let (prefix, remainder) = eager_consume(data).await?;
        return write_positional(&*provider, resource, prefix, remainder).await;
    }

    // Neither capability advertised: attempt unbuffered anyway so the
    // provider's stub implementation reports its own error.
    let buf = read_all(data).await?;
    provider.write_file(resource, &buf, true, true).await
}

/// `createFile(resource, data, options)` (spec §4.4): rejects if the target
/// already exists and overwrite wasn't requested, else delegates to `writeFile`.
pub async fn create_file(
    provider: Arc<dyn FileSystemProvider>,
    write_queue: &WriteQueueTable,
    resource: &Resource,
    data: WriteData,
    options: &WriteOptions,
) -> Result<FileStat, FileOperationError> {
    if !options.overwrite {
        if let Ok(_raw) = provider.stat(resource).await {
            return Err(FileOperationError::new(
                FileOperationErrorKind::FileModifiedSince,
                resource.clone(),
                "target already exists and overwrite was not requested",
            ));
        }
    }
    write_file(provider, write_queue, resource, data, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mem_provider::MemFsProvider;

    fn bytes(v: &[u8]) -> WriteData {
        WriteData::Bytes(v.to_vec())
    }

    #[tokio::test]
    async fn write_auto_creates_parent_directories() {
        let provider: Arc<dyn FileSystemProvider> = Arc::new(MemFsProvider::new());
        let queue = WriteQueueTable::new();
        let resource: Resource = "mem:///a/b/c.txt".parse().unwrap();
        let stat = write_file(provider.clone(), &queue, &resource, bytes(b"hi"), &WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(stat.size, 2);
    }

    #[tokio::test]
    async fn write_to_directory_fails() {
        let provider: Arc<dyn FileSystemProvider> = Arc::new(MemFsProvider::new());
        let queue = WriteQueueTable::new();
        let dir: Resource = "mem:///dir".parse().unwrap();
        provider.mkdir(&dir).await.unwrap();
        let err = write_file(provider.clone(), &queue, &dir, bytes(b"x"), &WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, FileOperationErrorKind::FileIsDirectory);
    }

    #[tokio::test]
    async fn dirty_write_guard_rejects_stale_mtime_etag() {
        let provider: Arc<dyn FileSystemProvider> = Arc::new(MemFsProvider::new());
        let queue = WriteQueueTable::new();
        let resource: Resource = "mem:///a.txt".parse().unwrap();
        write_file(provider.clone(), &queue, &resource, bytes(b"hello"), &WriteOptions::default())
            .await
            .unwrap();
        let raw = provider.stat(&resource).await.unwrap();

        let stale_options = WriteOptions {
            mtime: Some(raw.mtime.saturating_sub(1)),
            etag: Some(compute_etag(raw.mtime.saturating_sub(1), raw.size)),
            ..Default::default()
        };
        // Forge a future on-disk mtime by writing again first.
        write_file(provider.clone(), &queue, &resource, bytes(b"world"), &WriteOptions::default())
            .await
            .unwrap();
        let err = write_file(provider.clone(), &queue, &resource, bytes(b"stale"), &stale_options)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FileOperationErrorKind::FileModifiedSince);
    }

    #[tokio::test]
    async fn create_file_fails_when_target_exists_without_overwrite() {
        let provider: Arc<dyn FileSystemProvider> = Arc::new(MemFsProvider::new());
        let queue = WriteQueueTable::new();
        let resource: Resource = "mem:///a.txt".parse().unwrap();
        provider.write_file(&resource, b"x", true, true).await.unwrap();
        let err = create_file(provider.clone(), &queue, &resource, bytes(b"y"), &WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, FileOperationErrorKind::FileModifiedSince);
    }

    #[tokio::test]
    async fn concurrent_writes_to_same_key_resolve_to_last_enqueued() {
        let provider: Arc<dyn FileSystemProvider> = Arc::new(MemFsProvider::new());
        let queue = Arc::new(WriteQueueTable::new());
        let resource: Resource = "mem:///q".parse().unwrap();

        let p1 = provider.clone();
        let q1 = queue.clone();
        let r1 = resource.clone();
        let t1 = tokio::spawn(async move {
            write_file(p1, &q1, &r1, bytes(b"A"), &WriteOptions::default()).await.unwrap();
        });
        t1.await.unwrap();

        let p2 = provider.clone();
        let q2 = queue.clone();
        let r2 = resource.clone();
        let t2 = tokio::spawn(async move {
            write_file(p2, &q2, &r2, bytes(b"B"), &WriteOptions::default()).await.unwrap();
        });
        t2.await.unwrap();

        let (_, final_bytes) = crate::read::read_file(&*provider, &resource, &Default::default()).await.unwrap();
        assert_eq!(final_bytes, b"B");
    }
}
