//! Error types for the ROM filesystem.

use thiserror::Error;

use crate::fs::{DirId, EntryId};

/// Errors that can occur while loading, patching or repacking a ROM.
#[derive(Error, Debug)]
pub enum NitroError {
    #[error("Truncated read at {offset:#x}: needed {needed} bytes, {remaining} remaining")]
    TruncatedRead {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("Corrupt filesystem: {0}")]
    CorruptFilesystem(String),

    #[error("Unknown overlay: {0}")]
    UnknownOverlay(u32),

    #[error("Unresolved RAM address: {0:#010X}")]
    UnresolvedAddress(u32),

    #[error("Entry {0} cannot be moved")]
    ImmovableEntry(EntryId),

    #[error("Access at {offset:#x} is outside entry {id} (length {len:#x})")]
    OutOfBounds { id: EntryId, offset: u32, len: u32 },

    #[error("Offset {offset:#x} is not aligned to {alignment:#x}")]
    Misaligned { offset: u32, alignment: u32 },

    #[error("Space at {offset:#x} is occupied by entry {by}")]
    SpaceOccupied { offset: u32, by: EntryId },

    #[error("Entry {id} must stay {expected:#x} bytes long, got {actual:#x}")]
    SizeMismatch {
        id: EntryId,
        expected: u32,
        actual: usize,
    },

    #[error("File not found: {0}")]
    FileNotFound(EntryId),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(DirId),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("No .nds image in archive")]
    NoRomInArchive,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NitroError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        NitroError::CorruptFilesystem(msg.into())
    }
}

/// Result type for ROM filesystem operations.
pub type NitroResult<T> = Result<T, NitroError>;
