//! Overlay tables.
//!
//! Each table is a run of 32-byte descriptors:
//! - 0x00: Overlay id
//! - 0x04: RAM address
//! - 0x08: RAM size
//! - 0x0C: bss size
//! - 0x10: Static initializer start
//! - 0x14: Static initializer end
//! - 0x18: File id (u16)
//! - 0x1A: Reserved (2 bytes)
//! - 0x1C: Compressed size (24 bits), flags in the top byte
//!
//! Padding after the last full record is expected and ignored.

use serde::Serialize;

use super::directory::{DirId, Directory};
use super::entry::{EntryId, EntryKind};
use crate::cursor::{write_u32_at, ByteReader};
use crate::error::NitroResult;
use crate::rom::Rom;

pub const OVERLAY_RECORD_SIZE: usize = 32;

const RAM_SIZE_FIELD: usize = 0x08;
const COMPRESSED_SIZE_FIELD: usize = 0x1C;

const FLAG_COMPRESSED: u8 = 0x01;

/// Which processor an overlay table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processor {
    Arm9,
    Arm7,
}

impl Processor {
    fn table(self) -> EntryId {
        match self {
            Processor::Arm9 => EntryId::ARM9_OVERLAY_TABLE,
            Processor::Arm7 => EntryId::ARM7_OVERLAY_TABLE,
        }
    }

    fn dir(self) -> (DirId, &'static str) {
        match self {
            Processor::Arm9 => (DirId::ARM9_OVERLAYS, "ARM9 Overlay Table"),
            Processor::Arm7 => (DirId::ARM7_OVERLAYS, "ARM7 Overlay Table"),
        }
    }

    fn digit(self) -> u8 {
        match self {
            Processor::Arm9 => 9,
            Processor::Arm7 => 7,
        }
    }
}

/// One overlay table record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayDescriptor {
    pub overlay_id: u32,
    pub ram_address: u32,
    pub ram_size: u32,
    pub bss_size: u32,
    pub static_init_start: u32,
    pub static_init_end: u32,
    /// FAT index of the overlay's data.
    pub file_id: u16,
    /// Offset of this record inside its table.
    pub table_offset: u32,
    pub flags: u8,
}

impl OverlayDescriptor {
    pub fn contains(&self, ram_address: u32) -> bool {
        ram_address >= self.ram_address && ram_address - self.ram_address < self.ram_size
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }
}

/// Parse every complete record of an overlay table.
pub fn parse_overlay_table(table: &[u8]) -> NitroResult<Vec<OverlayDescriptor>> {
    let mut r = ByteReader::new(table);
    let mut descriptors = Vec::with_capacity(table.len() / OVERLAY_RECORD_SIZE);

    while r.has_remaining(OVERLAY_RECORD_SIZE) {
        let table_offset = r.position() as u32;
        let overlay_id = r.read_u32()?;
        let ram_address = r.read_u32()?;
        let ram_size = r.read_u32()?;
        let bss_size = r.read_u32()?;
        let static_init_start = r.read_u32()?;
        let static_init_end = r.read_u32()?;
        let file_id = r.read_u16()?;
        let reserved = r.read_bytes(6)?;

        descriptors.push(OverlayDescriptor {
            overlay_id,
            ram_address,
            ram_size,
            bss_size,
            static_init_start,
            static_init_end,
            file_id,
            table_offset,
            flags: reserved[5],
        });
    }

    Ok(descriptors)
}

impl Rom {
    /// Attach every overlay of a table under its synthetic directory.
    /// Returns the overlay entries in table order.
    pub(crate) fn load_overlay_table(
        &mut self,
        cpu: Processor,
        claimed: &mut [bool],
    ) -> NitroResult<Vec<EntryId>> {
        let (dir_id, dir_name) = cpu.dir();
        let mut dir = Directory::new(dir_id, dir_name, Some(DirId::ROOT));
        dir.system = true;
        self.add_dir(dir)?;

        let table = self.read_file(cpu.table())?.to_vec();
        let descriptors = parse_overlay_table(&table)?;

        let mut overlays = Vec::with_capacity(descriptors.len());
        for desc in descriptors {
            let name = format!("overlay{}_{:04}.bin", cpu.digit(), desc.overlay_id);
            let id = self.add_fat_file(
                desc.file_id,
                name,
                dir_id,
                EntryKind::Overlay(desc),
                claimed,
            )?;
            overlays.push(id);
        }

        if self.trace {
            eprintln!("[FS] {}: {} overlays", dir_name, overlays.len());
        }
        Ok(overlays)
    }

    /// Rewrite an overlay's table record after its file changed length.
    ///
    /// An uncompressed overlay is loaded as-is, so its RAM size is the file
    /// length. A compressed one keeps its RAM size and records the packed
    /// length instead.
    pub(crate) fn sync_overlay_record(&mut self, id: EntryId) -> NitroResult<()> {
        let entry = self.entry(id)?;
        let Some(desc) = entry.overlay().copied() else {
            return Ok(());
        };
        let len = entry.len;
        let table = match entry.parent {
            DirId::ARM7_OVERLAYS => Processor::Arm7.table(),
            _ => Processor::Arm9.table(),
        };
        let record = self.entry(table)?.offset as usize + desc.table_offset as usize;

        let mut updated = desc;
        if desc.is_compressed() {
            let word = (len & 0x00FF_FFFF) | (desc.flags as u32) << 24;
            write_u32_at(&mut self.image, record + COMPRESSED_SIZE_FIELD, word)?;
        } else {
            updated.ram_size = len;
            write_u32_at(&mut self.image, record + RAM_SIZE_FIELD, len)?;
        }
        if self.trace {
            eprintln!(
                "[REPACK] Overlay {} record at {:#x} now {:#x} bytes",
                desc.overlay_id, record, len
            );
        }
        if let Some(e) = self.entries.get_mut(&id) {
            e.kind = EntryKind::Overlay(updated);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ByteWriter;

    fn table(records: &[(u32, u32, u32, u16)], slack: usize) -> Vec<u8> {
        let mut data = vec![0u8; records.len() * OVERLAY_RECORD_SIZE + slack];
        for (i, &(ov, ram, size, file)) in records.iter().enumerate() {
            let mut w = ByteWriter::at(&mut data, i * OVERLAY_RECORD_SIZE).unwrap();
            w.write_u32(ov).unwrap();
            w.write_u32(ram).unwrap();
            w.write_u32(size).unwrap();
            w.write_u32(0x40).unwrap();
            w.write_u32(ram + 0x10).unwrap();
            w.write_u32(ram + 0x14).unwrap();
            w.write_u16(file).unwrap();
        }
        data
    }

    #[test]
    fn test_parse_records() {
        let data = table(&[(0, 0x020C_0000, 0x100, 0), (1, 0x020C_0000, 0x80, 1)], 0);
        let descs = parse_overlay_table(&data).unwrap();

        assert_eq!(descs.len(), 2);
        assert_eq!(descs[1].overlay_id, 1);
        assert_eq!(descs[1].ram_size, 0x80);
        assert_eq!(descs[1].bss_size, 0x40);
        assert_eq!(descs[1].static_init_start, 0x020C_0010);
        assert_eq!(descs[1].static_init_end, 0x020C_0014);
        assert_eq!(descs[1].file_id, 1);
        assert_eq!(descs[1].table_offset, 0x20);
        assert!(!descs[1].is_compressed());
    }

    // A trailing partial record is padding, not an error.
    #[test]
    fn test_trailing_partial_record_ignored() {
        for slack in [1, 4, 31] {
            let data = table(&[(0, 0x0210_0000, 0x10, 0), (1, 0x0210_0000, 0x10, 1)], slack);
            assert_eq!(parse_overlay_table(&data).unwrap().len(), 2);
        }
        assert!(parse_overlay_table(&[0u8; 31]).unwrap().is_empty());
        assert!(parse_overlay_table(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_compressed_flag() {
        let mut data = table(&[(3, 0x0210_0000, 0x10, 9)], 0);
        data[0x1F] = FLAG_COMPRESSED;
        let descs = parse_overlay_table(&data).unwrap();
        assert!(descs[0].is_compressed());
    }

    #[test]
    fn test_contains() {
        let data = table(&[(0, 0x0210_0000, 0x100, 0)], 0);
        let desc = parse_overlay_table(&data).unwrap()[0];
        assert!(desc.contains(0x0210_0000));
        assert!(desc.contains(0x0210_00FF));
        assert!(!desc.contains(0x0210_0100));
        assert!(!desc.contains(0x020F_FFFF));
    }
}
