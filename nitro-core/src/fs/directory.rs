//! Directories of the virtual filesystem.

use std::fmt;

use serde::Serialize;

use super::entry::EntryId;

/// Directory identifier. FNT directories use `0xF000 | index`; the
/// synthetic overlay-table directories use negative ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DirId(pub i32);

impl DirId {
    pub const ROOT: DirId = DirId(0xF000);
    pub const ARM9_OVERLAYS: DirId = DirId(-98);
    pub const ARM7_OVERLAYS: DirId = DirId(-99);

    /// FNT directory id for a main-table index.
    pub fn fnt(index: u16) -> Self {
        DirId(0xF000 | index as i32)
    }
}

impl fmt::Display for DirId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 0 {
            write!(f, "{:#06X}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A directory node. Children are referenced by id and kept in on-disk
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct Directory {
    pub id: DirId,
    pub name: String,
    /// `None` only for the root.
    pub parent: Option<DirId>,
    pub dirs: Vec<DirId>,
    pub files: Vec<EntryId>,
    pub system: bool,
}

impl Directory {
    pub fn new(id: DirId, name: impl Into<String>, parent: Option<DirId>) -> Self {
        Self {
            id,
            name: name.into(),
            parent,
            dirs: Vec::new(),
            files: Vec::new(),
            system: false,
        }
    }
}

/// Kind of a listed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Dir,
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub name: String,
    pub kind: NodeKind,
    /// `EntryId` for files, `DirId` for directories.
    pub id: i32,
}
