//! Capability bitset and pure probe predicates (spec §2.1, §3).
//!
//! Grounded on the `FsProviderCapabilities` bitflags pattern used by the
//! provider registry in `other_examples/.../wasmer__vfs-core-src-provider.rs`.

use bitflags::bitflags;

bitflags! {
    /// Bitset a provider exposes describing which method families it supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileSystemProviderCapabilities: u32 {
        /// Unbuffered whole-file `readFile`/`writeFile`.
        const FILE_READ_WRITE = 1 << 0;
        /// Positional `open`/`read`/`write`/`close` with a numeric handle.
        const FILE_OPEN_READ_WRITE_CLOSE = 1 << 1;
        /// Provider-native streaming read.
        const FILE_READ_STREAM = 1 << 2;
        /// Intra-provider copy of files and folders.
        const FILE_FOLDER_COPY = 1 << 3;
        /// Deleted resources can be sent to a trash instead of purged.
        const TRASH = 1 << 4;
        /// Path comparisons on this provider are case-sensitive.
        const PATH_CASE_SENSITIVE = 1 << 5;
        /// The provider refuses all mutating operations.
        const READONLY = 1 << 6;
    }
}

/// The probe never assumes a bit is permanent — callers re-read capabilities
/// per-call and pass the current bitset in here (spec §3: "observed at
/// every call because it may change").
pub fn can_read_unbuffered(caps: FileSystemProviderCapabilities) -> bool {
    caps.contains(FileSystemProviderCapabilities::FILE_READ_WRITE)
}

pub fn can_read_stream(caps: FileSystemProviderCapabilities) -> bool {
    caps.contains(FileSystemProviderCapabilities::FILE_READ_STREAM)
}

pub fn can_open_read_write_close(caps: FileSystemProviderCapabilities) -> bool {
    caps.contains(FileSystemProviderCapabilities::FILE_OPEN_READ_WRITE_CLOSE)
}

pub fn can_copy_natively(caps: FileSystemProviderCapabilities) -> bool {
    caps.contains(FileSystemProviderCapabilities::FILE_FOLDER_COPY)
}

pub fn has_trash(caps: FileSystemProviderCapabilities) -> bool {
    caps.contains(FileSystemProviderCapabilities::TRASH)
}

pub fn is_case_sensitive(caps: FileSystemProviderCapabilities) -> bool {
    caps.contains(FileSystemProviderCapabilities::PATH_CASE_SENSITIVE)
}

pub fn is_readonly(caps: FileSystemProviderCapabilities) -> bool {
    caps.contains(FileSystemProviderCapabilities::READONLY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_are_pure_bit_checks() {
        let caps = FileSystemProviderCapabilities::FILE_READ_WRITE
            | FileSystemProviderCapabilities::TRASH;
        assert!(can_read_unbuffered(caps));
        assert!(has_trash(caps));
        assert!(!can_open_read_write_close(caps));
        assert!(!is_readonly(caps));
    }
}
