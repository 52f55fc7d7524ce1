//! Nintendo DS ROM filesystem core
//!
//! This crate reads the filesystem embedded in a DS cartridge image and
//! patches it in place:
//! - Header, FAT and FNT parsing into a directory tree
//! - ARM9/ARM7 overlay tables
//! - Repacking bookkeeping when files change size or move
//! - RAM address resolution for patching the ARM9 program and overlays
//!
//! # Architecture
//!
//! - `ByteReader`/`ByteWriter`: little-endian cursor over the image
//! - `Header`: typed view of the header fields
//! - `Entry`/`Directory`: the virtual filesystem model
//! - `Rom`: owns the image and every table, and exposes the operations

pub mod arm9;
pub mod config;
pub mod cursor;
pub mod error;
pub mod fs;
pub mod header;
pub mod resolver;
pub mod rom;

pub use arm9::{Arm9Layout, Arm9Section};
pub use config::NitroConfig;
pub use cursor::{ByteReader, ByteWriter};
pub use error::{NitroError, NitroResult};
pub use fs::{
    DirId, Directory, Entry, EntryId, EntryKind, Listing, NodeKind, OverlayDescriptor, Placement,
    Processor,
};
pub use header::Header;
pub use resolver::{PatchMode, RamLocation};
pub use rom::Rom;
