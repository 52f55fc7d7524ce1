//! Virtual filesystem over the cartridge image.
//!
//! - `entry`: addressable regions and their placement records
//! - `directory`: directory nodes and listings
//! - `builder`: header/FNT/FAT parsing into the tree
//! - `overlay`: overlay tables
//! - `placement`: repacking after size or offset changes

mod builder;
mod directory;
mod entry;
pub(crate) mod overlay;
mod placement;

pub use directory::{DirId, Directory, Listing, NodeKind};
pub use entry::{align_up, Entry, EntryId, EntryKind, Placement};
pub use overlay::{parse_overlay_table, OverlayDescriptor, Processor, OVERLAY_RECORD_SIZE};
