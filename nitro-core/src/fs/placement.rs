//! Repacking.
//!
//! When an entry changes size or moves, its new span is written back to
//! wherever the image records it (header fields or its FAT record), the
//! filesystem end pointer at 0x80 is recomputed and the header CRC is
//! refreshed. The image is never truncated; it grows with 0xFF padding
//! when an entry lands past its current end.

use super::entry::{align_up, EntryId, EntryKind, Placement};
use crate::arm9::Arm9Layout;
use crate::cursor::{read_u32_at, write_u32_at, ByteWriter};
use crate::error::{NitroError, NitroResult};
use crate::header::{field, header_crc, HEADER_LEN};
use crate::rom::Rom;

const PADDING: u8 = 0xFF;

impl Rom {
    /// Replace an entry's contents, relocating as needed.
    ///
    /// - Fits before the next entry (or is the last one): written in place.
    /// - Movable: moved to the first free gap large enough.
    /// - Immovable (ARM9): entries in the way are moved out first.
    ///
    /// An ARM9 replacement re-reads its section layout. An overlay whose
    /// length changes gets its table record rewritten.
    pub fn replace_file(&mut self, id: EntryId, data: &[u8]) -> NitroResult<()> {
        let entry = self.entry(id)?.clone();
        let new_len = u32::try_from(data.len()).map_err(|_| NitroError::SizeMismatch {
            id,
            expected: entry.len,
            actual: data.len(),
        })?;

        if entry.placement == Placement::Fixed && new_len != entry.len {
            return Err(NitroError::SizeMismatch {
                id,
                expected: entry.len,
                actual: data.len(),
            });
        }

        // New ARM9 code brings its own autoload sections.
        let layout = match &entry.kind {
            EntryKind::Arm9Binary(_) => {
                let ram_address = read_u32_at(&self.image, field::ARM9_RAM_ADDRESS)?;
                Some(Arm9Layout::parse(data, ram_address)?)
            }
            _ => None,
        };

        let fits = match self.next_start_after(id) {
            Some(next) => entry.offset as u64 + new_len as u64 <= next as u64,
            None => true,
        };

        let target = if fits {
            entry.offset
        } else if entry.movable {
            self.find_free_space(new_len, entry.alignment, &[id], &[])
        } else {
            self.evict(id, entry.offset, entry.offset + new_len)?;
            entry.offset
        };

        if self.trace {
            eprintln!(
                "[REPACK] {} {:#x}+{:#x} -> {:#x}+{:#x}",
                entry.name, entry.offset, entry.len, target, new_len
            );
        }

        self.write_image(target, data);
        if let Some(e) = self.entries.get_mut(&id) {
            e.offset = target;
            e.len = new_len;
            if let Some(layout) = layout {
                e.kind = EntryKind::Arm9Binary(layout);
            }
        }
        self.write_placement(id)?;
        if new_len != entry.len {
            self.sync_overlay_record(id)?;
        }
        self.file_moved()
    }

    /// Move an entry to `offset` without changing its contents.
    pub fn move_entry(&mut self, id: EntryId, offset: u32) -> NitroResult<()> {
        let entry = self.entry(id)?;
        if !entry.movable {
            return Err(NitroError::ImmovableEntry(id));
        }
        if offset % entry.alignment.max(1) != 0 {
            return Err(NitroError::Misaligned {
                offset,
                alignment: entry.alignment,
            });
        }
        let end = offset.checked_add(entry.len).ok_or(NitroError::OutOfBounds {
            id,
            offset,
            len: entry.len,
        })?;
        if let Some(other) = self
            .entries
            .values()
            .find(|e| e.id != id && e.overlaps(offset, end))
        {
            return Err(NitroError::SpaceOccupied {
                offset,
                by: other.id,
            });
        }

        self.relocate(id, offset)?;
        self.file_moved()
    }

    /// Recompute the filesystem end and store it with a fresh CRC.
    /// Runs after every structural change.
    pub(crate) fn file_moved(&mut self) -> NitroResult<()> {
        let end = self.fs_end();
        self.set_header_u32(field::FS_END, end)?;
        if self.trace {
            eprintln!("[REPACK] Filesystem end {:#x}", end);
        }
        Ok(())
    }

    /// End of the furthest entry, rounded to the configured alignment.
    pub fn fs_end(&self) -> u32 {
        let end = self.entries.values().map(|e| e.end()).max().unwrap_or(0);
        align_up(end, self.config.fs_end_alignment)
    }

    /// First offset where `len` bytes fit, ignoring `exclude` and
    /// treating `reserved` spans as occupied. Falls back to the end of
    /// the last entry.
    fn find_free_space(
        &self,
        len: u32,
        alignment: u32,
        exclude: &[EntryId],
        reserved: &[(u32, u32)],
    ) -> u32 {
        let mut spans: Vec<(u32, u32)> = self
            .entries
            .values()
            .filter(|e| e.len > 0 && !exclude.contains(&e.id))
            .map(|e| (e.offset, e.end()))
            .chain(reserved.iter().copied())
            .collect();
        spans.sort_unstable();

        let mut candidate = align_up(self.data_floor(), alignment);
        for (start, end) in spans {
            if end <= candidate {
                continue;
            }
            if candidate as u64 + len as u64 <= start as u64 {
                return candidate;
            }
            candidate = candidate.max(align_up(end, alignment));
        }
        candidate
    }

    /// Lowest offset file data may use: the declared header size.
    fn data_floor(&self) -> u32 {
        match read_u32_at(&self.image, field::HEADER_SIZE) {
            Ok(size) if size as usize <= self.image.len() => size.max(HEADER_LEN),
            _ => HEADER_LEN,
        }
    }

    /// Start of the closest non-empty entry at or after `id`'s offset.
    fn next_start_after(&self, id: EntryId) -> Option<u32> {
        let offset = self.entries.get(&id)?.offset;
        self.entries
            .values()
            .filter(|e| e.id != id && e.len > 0 && e.offset >= offset)
            .map(|e| e.offset)
            .min()
    }

    /// Move every entry overlapping `start..end` out of the way.
    fn evict(&mut self, id: EntryId, start: u32, end: u32) -> NitroResult<()> {
        let blockers: Vec<EntryId> = self
            .entries
            .values()
            .filter(|e| e.id != id && e.overlaps(start, end))
            .map(|e| e.id)
            .collect();

        if let Some(stuck) = blockers
            .iter()
            .find(|b| self.entries.get(*b).map(|e| !e.movable).unwrap_or(false))
        {
            return Err(NitroError::ImmovableEntry(*stuck));
        }

        for blocker in blockers {
            let e = self.entry(blocker)?;
            let (len, alignment) = (e.len, e.alignment);
            let target = self.find_free_space(len, alignment, &[id, blocker], &[(start, end)]);
            self.relocate(blocker, target)?;
        }
        Ok(())
    }

    /// Copy an entry's bytes to `offset` and record the new placement.
    fn relocate(&mut self, id: EntryId, offset: u32) -> NitroResult<()> {
        let entry = self.entry(id)?;
        let old = entry.offset;
        let bytes = self.read_file(id)?.to_vec();
        if self.trace {
            eprintln!("[REPACK] Move {} {:#x} -> {:#x}", entry.name, old, offset);
        }

        self.write_image(offset, &bytes);
        if let Some(e) = self.entries.get_mut(&id) {
            e.offset = offset;
        }
        self.write_placement(id)
    }

    /// Store an entry's span where the image records it.
    fn write_placement(&mut self, id: EntryId) -> NitroResult<()> {
        let entry = self.entry(id)?;
        let (offset, len, placement) = (entry.offset, entry.len, entry.placement);

        match placement {
            Placement::Fixed => Ok(()),
            Placement::HeaderSpan {
                offset_field,
                size_field,
            } => {
                self.set_header_u32(offset_field, offset)?;
                self.set_header_u32(size_field, len)
            }
            Placement::HeaderOffset { offset_field } => self.set_header_u32(offset_field, offset),
            Placement::FatSlot(slot) => {
                let fat = self.entry(EntryId::FAT)?.offset as usize;
                let pos = fat + slot as usize * 8;
                write_u32_at(&mut self.image, pos, offset)?;
                write_u32_at(&mut self.image, pos + 4, offset + len)
            }
        }
    }

    /// Write a header field and refresh the CRC.
    pub(crate) fn set_header_u32(&mut self, offset: usize, value: u32) -> NitroResult<()> {
        write_u32_at(&mut self.image, offset, value)?;
        self.update_header_crc()
    }

    fn update_header_crc(&mut self) -> NitroResult<()> {
        let crc = header_crc(&self.image);
        ByteWriter::at(&mut self.image, field::HEADER_CRC)?.write_u16(crc)
    }

    fn write_image(&mut self, offset: u32, data: &[u8]) {
        let start = offset as usize;
        let end = start + data.len();
        if self.image.len() < end {
            self.image.resize(end, PADDING);
        }
        self.image[start..end].copy_from_slice(data);
    }
}
