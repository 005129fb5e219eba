//! Error taxonomy for the virtual filesystem service.
//!
//! `ProviderError` is what a [`crate::provider::FileSystemProvider`] returns;
//! every pipeline maps it to a [`FileOperationErrorKind`] at its boundary
//! before handing it back to the caller as a [`FileOperationError`].

use std::fmt;

use crate::uri::Resource;

/// Error surface exposed by a provider implementation.
///
/// Deliberately small and generic: providers do not need to know the
/// service-level taxonomy, only to report what actually happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The target of the operation does not exist.
    FileNotFound,
    /// The operation requires a file but the target is a directory.
    FileIsDirectory,
    /// The operation requires a directory but the target is not one.
    FileNotDirectory,
    /// The caller lacks permission, or the provider is read-only.
    PermissionDenied,
    /// Target already exists and the operation does not allow overwrite.
    FileExists,
    /// Directory is not empty and the operation requires it to be.
    DirectoryNotEmpty,
    /// Some other, provider-specific failure. Carries a human-readable detail.
    Other(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::FileNotFound => write!(f, "file not found"),
            ProviderError::FileIsDirectory => write!(f, "is a directory"),
            ProviderError::FileNotDirectory => write!(f, "not a directory"),
            ProviderError::PermissionDenied => write!(f, "permission denied"),
            ProviderError::FileExists => write!(f, "file exists"),
            ProviderError::DirectoryNotEmpty => write!(f, "directory not empty"),
            ProviderError::Other(detail) => write!(f, "{detail}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Taxonomy of errors surfaced by the service (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperationErrorKind {
    FileNotFound,
    FileIsDirectory,
    FileNotDirectory,
    FileModifiedSince,
    FileMoveConflict,
    FileTooLarge,
    FileExceedsMemoryLimit,
    FilePermissionDenied,
    FileNotModifiedSince,
    FileInvalidPath,
    NoProvider,
    Unknown,
}

impl fmt::Display for FileOperationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileOperationErrorKind::FileNotFound => "FILE_NOT_FOUND",
            FileOperationErrorKind::FileIsDirectory => "FILE_IS_DIRECTORY",
            FileOperationErrorKind::FileNotDirectory => "FILE_NOT_DIRECTORY",
            FileOperationErrorKind::FileModifiedSince => "FILE_MODIFIED_SINCE",
            FileOperationErrorKind::FileMoveConflict => "FILE_MOVE_CONFLICT",
            FileOperationErrorKind::FileTooLarge => "FILE_TOO_LARGE",
            FileOperationErrorKind::FileExceedsMemoryLimit => "FILE_EXCEEDS_MEMORY_LIMIT",
            FileOperationErrorKind::FilePermissionDenied => "FILE_PERMISSION_DENIED",
            FileOperationErrorKind::FileNotModifiedSince => "FILE_NOT_MODIFIED_SINCE",
            FileOperationErrorKind::FileInvalidPath => "FILE_INVALID_PATH",
            FileOperationErrorKind::NoProvider => "NO_PROVIDER",
            FileOperationErrorKind::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Error returned by every public [`crate::service::FileService`] operation.
#[derive(Debug, Clone)]
pub struct FileOperationError {
    pub kind: FileOperationErrorKind,
    pub resource: Resource,
    pub message: String,
    pub source: Option<ProviderError>,
}

impl FileOperationError {
    pub fn new(kind: FileOperationErrorKind, resource: Resource, message: impl Into<String>) -> Self {
        Self { kind, resource, message: message.into(), source: None }
    }

    /// Build from a provider error, mapping it to the taxonomy at the boundary (spec §7).
    pub fn from_provider(resource: Resource, err: ProviderError) -> Self {
        let kind = match &err {
            ProviderError::FileNotFound => FileOperationErrorKind::FileNotFound,
            ProviderError::FileIsDirectory => FileOperationErrorKind::FileIsDirectory,
            ProviderError::FileNotDirectory => FileOperationErrorKind::FileNotDirectory,
            ProviderError::PermissionDenied => FileOperationErrorKind::FilePermissionDenied,
            ProviderError::FileExists => FileOperationErrorKind::FileMoveConflict,
            ProviderError::DirectoryNotEmpty => FileOperationErrorKind::Unknown,
            ProviderError::Other(_) => FileOperationErrorKind::Unknown,
        };
        let message = format!("{resource}: {err}");
        Self { kind, resource, message, source: Some(err) }
    }
}

impl fmt::Display for FileOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FileOperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

pub type Result<T> = std::result::Result<T, FileOperationError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn resource() -> Resource {
        "mem://authority/a/b.txt".parse().unwrap()
    }

    #[test]
    fn maps_not_found() {
        let err = FileOperationError::from_provider(resource(), ProviderError::FileNotFound);
        assert_eq!(err.kind, FileOperationErrorKind::FileNotFound);
        assert!(err.message.contains("file not found"));
    }

    #[test]
    fn maps_permission_denied() {
        let err = FileOperationError::from_provider(resource(), ProviderError::PermissionDenied);
        assert_eq!(err.kind, FileOperationErrorKind::FilePermissionDenied);
    }
}
