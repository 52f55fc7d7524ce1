//! RAM address resolution for ARM9 patching.
//!
//! Maps a runtime address (optionally qualified by an overlay id) to the
//! entry and byte offset that supply it:
//! 1. An explicit overlay id selects that ARM9 overlay, or fails.
//! 2. Otherwise a static ARM9 section containing the address.
//! 3. Otherwise any ARM9 overlay whose RAM footprint contains it.

use serde::Serialize;

use crate::cursor::{read_u32_at, write_u32_at};
use crate::error::{NitroError, NitroResult};
use crate::fs::{EntryId, EntryKind};
use crate::rom::Rom;

/// Entry and offset backing a RAM address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RamLocation {
    pub entry: EntryId,
    pub offset: u32,
}

/// Access performed by `Rom::patch_ram`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    Read,
    Write,
}

impl Rom {
    pub fn resolve(&self, ram_address: u32, overlay_id: Option<u32>) -> NitroResult<RamLocation> {
        if let Some(wanted) = overlay_id {
            // An explicit id is authoritative; never fall back to static code.
            return self
                .arm9_overlays
                .iter()
                .filter_map(|id| self.entries.get(id))
                .find_map(|e| match e.overlay() {
                    Some(desc) if desc.overlay_id == wanted => Some(RamLocation {
                        entry: e.id,
                        offset: ram_address.wrapping_sub(desc.ram_address),
                    }),
                    _ => None,
                })
                .ok_or(NitroError::UnknownOverlay(wanted));
        }

        if let Some(EntryKind::Arm9Binary(layout)) = self.entries.get(&EntryId::ARM9).map(|e| &e.kind) {
            if let Some(section) = layout.section_for(ram_address) {
                return Ok(RamLocation {
                    entry: EntryId::ARM9,
                    offset: section.file_offset_of(ram_address),
                });
            }
        }

        self.arm9_overlays
            .iter()
            .filter_map(|id| self.entries.get(id))
            .find_map(|e| match e.overlay() {
                Some(desc) if desc.contains(ram_address) => Some(RamLocation {
                    entry: e.id,
                    offset: ram_address - desc.ram_address,
                }),
                _ => None,
            })
            .ok_or(NitroError::UnresolvedAddress(ram_address))
    }

    pub fn read_ram_u32(&self, ram_address: u32, overlay_id: Option<u32>) -> NitroResult<u32> {
        if self.trace {
            eprintln!("[PATCH] READFROM {:08X}", ram_address);
        }
        let loc = self.resolve(ram_address, overlay_id)?;
        let pos = self.image_offset(loc)?;
        read_u32_at(&self.image, pos)
    }

    pub fn write_ram_u32(
        &mut self,
        ram_address: u32,
        value: u32,
        overlay_id: Option<u32>,
    ) -> NitroResult<()> {
        if self.trace {
            eprintln!("[PATCH] WRITETO {:08X} {:08X}", ram_address, value);
        }
        let loc = self.resolve(ram_address, overlay_id)?;
        let pos = self.image_offset(loc)?;
        write_u32_at(&mut self.image, pos, value)
    }

    /// Patch-tool entry point. Returns the value read, or on write the
    /// value that was replaced.
    pub fn patch_ram(
        &mut self,
        ram_address: u32,
        overlay_id: Option<u32>,
        value: u32,
        mode: PatchMode,
    ) -> NitroResult<u32> {
        let previous = self.read_ram_u32(ram_address, overlay_id)?;
        if mode == PatchMode::Write {
            self.write_ram_u32(ram_address, value, overlay_id)?;
        }
        Ok(previous)
    }

    /// Absolute image offset of a 4-byte access, bounds-checked against
    /// the entry.
    fn image_offset(&self, loc: RamLocation) -> NitroResult<usize> {
        let entry = self.entry(loc.entry)?;
        match loc.offset.checked_add(4) {
            Some(end) if end <= entry.len => Ok(entry.offset as usize + loc.offset as usize),
            _ => Err(NitroError::OutOfBounds {
                id: loc.entry,
                offset: loc.offset,
                len: entry.len,
            }),
        }
    }
}
