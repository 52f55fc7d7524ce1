//! Filesystem entries.
//!
//! Every byte range the filesystem knows about is an `Entry`: named and
//! nameless FAT files, overlays, and the system regions (header, tables,
//! program binaries, banner). They share one addressing contract and
//! differ only in the payload carried by `EntryKind`.

use std::fmt;

use serde::Serialize;

use super::directory::DirId;
use crate::arm9::Arm9Layout;
use crate::fs::overlay::OverlayDescriptor;

/// Stable entry identifier.
///
/// FAT-backed files use their FAT index. System entries use the
/// reserved negative ids below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntryId(pub i32);

impl EntryId {
    pub const HEADER: EntryId = EntryId(-1);
    pub const FNT: EntryId = EntryId(-2);
    pub const FAT: EntryId = EntryId(-3);
    pub const ARM9_OVERLAY_TABLE: EntryId = EntryId(-4);
    pub const ARM7_OVERLAY_TABLE: EntryId = EntryId(-5);
    pub const ARM9: EntryId = EntryId(-6);
    pub const ARM7: EntryId = EntryId(-7);
    pub const BANNER: EntryId = EntryId(-8);

    pub fn fat(index: u16) -> Self {
        EntryId(index as i32)
    }

    /// FAT index, if this id names a FAT-backed file.
    pub fn fat_index(self) -> Option<u16> {
        u16::try_from(self.0).ok()
    }

    pub fn is_system_id(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an entry's offset and length are recorded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Not recorded anywhere (the header itself).
    Fixed,
    /// Header offset field plus header size field.
    HeaderSpan { offset_field: usize, size_field: usize },
    /// Header offset field; the length is implied by the content.
    HeaderOffset { offset_field: usize },
    /// FAT record: start at `slot*8`, end at `slot*8 + 4`.
    FatSlot(u16),
}

/// Variant-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    Plain,
    Overlay(OverlayDescriptor),
    Arm9Binary(Arm9Layout),
    Header,
    Banner,
}

/// One addressable region of the image.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: EntryId,
    pub name: String,
    /// Owning directory.
    pub parent: DirId,
    pub offset: u32,
    pub len: u32,
    /// Power-of-two boundary the offset must satisfy when relocated.
    pub alignment: u32,
    /// False for regions whose offset is baked into boot code.
    pub movable: bool,
    /// Excluded from user rename/move in front ends.
    pub system: bool,
    pub placement: Placement,
    pub kind: EntryKind,
}

impl Entry {
    /// Exclusive end offset.
    pub fn end(&self) -> u32 {
        self.offset + self.len
    }

    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        self.len > 0 && start < end && self.offset < end && start < self.end()
    }

    pub fn overlay(&self) -> Option<&OverlayDescriptor> {
        match &self.kind {
            EntryKind::Overlay(desc) => Some(desc),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            EntryKind::Plain => "file",
            EntryKind::Overlay(_) => "overlay",
            EntryKind::Arm9Binary(_) => "arm9",
            EntryKind::Header => "header",
            EntryKind::Banner => "banner",
        }
    }
}

/// Round `value` up to a multiple of `alignment`.
pub fn align_up(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}
