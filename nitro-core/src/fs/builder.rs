//! Tree construction from the header, FNT and FAT.
//!
//! FNT layout:
//! - Main table: one 8-byte record per directory
//!   (u32 sub-table offset, u16 first file id, u16 parent id; the root's
//!   parent field holds the directory count)
//! - Sub-table: length-prefixed names. 0x00 ends the table, 0x01-0x7F is
//!   a file name, 0x81-0xFF a directory name followed by its u16 id.
//!
//! File ids inside a directory count up from the record's first file id,
//! and file id N always maps to FAT record N. Every FAT record ends up
//! owned by exactly one entry: named files from the FNT, overlays from
//! the overlay tables, and the rest as nameless root files.

use super::directory::{DirId, Directory};
use super::entry::{Entry, EntryId, EntryKind, Placement};
use super::overlay::Processor;
use crate::arm9::Arm9Layout;
use crate::cursor::{read_u32_at, ByteReader};
use crate::error::{NitroError, NitroResult};
use crate::header::{field, Header, HEADER_LEN};
use crate::rom::Rom;

const FNT_RECORD_SIZE: usize = 8;
const FAT_RECORD_SIZE: u32 = 8;
const MAX_DIRECTORIES: usize = 0x1000;
const MAX_FILES: u32 = 0xF000;

/// Main-table record of one FNT directory.
#[derive(Debug, Clone, Copy)]
struct FntRecord {
    subtable: u32,
    first_file: u16,
}

/// One sub-table item, in on-disk order.
#[derive(Debug, Clone, PartialEq)]
enum FntItem {
    File(String),
    Dir(String, u16),
}

impl Rom {
    pub(crate) fn load(&mut self) -> NitroResult<()> {
        let header = Header::parse(&self.image)?;
        self.dirs
            .insert(DirId::ROOT, Directory::new(DirId::ROOT, "root", None));

        // Header, FNT and FAT are needed before the tree exists; they are
        // attached to the root after the named children.
        let header_entry = self.system_entry(
            EntryId::HEADER,
            "header.bin",
            0,
            HEADER_LEN,
            Placement::Fixed,
            EntryKind::Header,
        )?;
        let fnt = self.system_entry(
            EntryId::FNT,
            "fnt.bin",
            header.fnt_offset,
            header.fnt_size,
            Placement::HeaderSpan {
                offset_field: field::FNT_OFFSET,
                size_field: field::FNT_SIZE,
            },
            EntryKind::Plain,
        )?;
        let fat = self.system_entry(
            EntryId::FAT,
            "fat.bin",
            header.fat_offset,
            header.fat_size,
            Placement::HeaderSpan {
                offset_field: field::FAT_OFFSET,
                size_field: field::FAT_SIZE,
            },
            EntryKind::Plain,
        )?;
        for entry in [header_entry, fnt, fat] {
            self.entries.insert(entry.id, entry);
        }

        let fat_count = header.fat_size / FAT_RECORD_SIZE;
        if fat_count > MAX_FILES {
            return Err(NitroError::corrupt(format!(
                "FAT declares {} files",
                fat_count
            )));
        }
        let mut claimed = vec![false; fat_count as usize];

        self.load_fnt(&mut claimed)?;

        for id in [EntryId::HEADER, EntryId::FNT, EntryId::FAT] {
            self.attach(id)?;
        }
        self.load_system_files(&header)?;

        self.arm7_overlays = self.load_overlay_table(Processor::Arm7, &mut claimed)?;
        self.arm9_overlays = self.load_overlay_table(Processor::Arm9, &mut claimed)?;
        self.load_nameless_files(&mut claimed)?;

        if self.config.strict_overlap_check {
            self.check_overlaps()?;
        }

        if self.trace {
            eprintln!(
                "[FS] Loaded {} entries, {} directories ({} FAT records)",
                self.entries.len(),
                self.dirs.len(),
                fat_count
            );
        }
        Ok(())
    }

    fn load_system_files(&mut self, header: &Header) -> NitroResult<()> {
        let cfg = self.config.clone();

        let mut arm9_ovt = self.system_entry(
            EntryId::ARM9_OVERLAY_TABLE,
            "arm9ovt.bin",
            header.arm9_overlay_offset,
            header.arm9_overlay_size,
            Placement::HeaderSpan {
                offset_field: field::ARM9_OVT_OFFSET,
                size_field: field::ARM9_OVT_SIZE,
            },
            EntryKind::Plain,
        )?;
        arm9_ovt.alignment = cfg.table_alignment;
        self.add_entry(arm9_ovt)?;

        let mut arm7_ovt = self.system_entry(
            EntryId::ARM7_OVERLAY_TABLE,
            "arm7ovt.bin",
            header.arm7_overlay_offset,
            header.arm7_overlay_size,
            Placement::HeaderSpan {
                offset_field: field::ARM7_OVT_OFFSET,
                size_field: field::ARM7_OVT_SIZE,
            },
            EntryKind::Plain,
        )?;
        arm7_ovt.alignment = cfg.table_alignment;
        self.add_entry(arm7_ovt)?;

        let mut arm9 = self.system_entry(
            EntryId::ARM9,
            "arm9.bin",
            header.arm9_offset,
            header.arm9_size,
            Placement::HeaderSpan {
                offset_field: field::ARM9_OFFSET,
                size_field: field::ARM9_SIZE,
            },
            EntryKind::Plain,
        )?;
        let layout = Arm9Layout::parse(
            &self.image[arm9.offset as usize..arm9.end() as usize],
            header.arm9_ram_address,
        )?;
        if self.trace {
            eprintln!(
                "[FS] ARM9: {} static sections{}",
                layout.sections.len(),
                if layout.compressed { " (compressed)" } else { "" }
            );
        }
        arm9.kind = EntryKind::Arm9Binary(layout);
        arm9.alignment = cfg.arm9_alignment;
        arm9.movable = false;
        self.add_entry(arm9)?;

        let mut arm7 = self.system_entry(
            EntryId::ARM7,
            "arm7.bin",
            header.arm7_offset,
            header.arm7_size,
            Placement::HeaderSpan {
                offset_field: field::ARM7_OFFSET,
                size_field: field::ARM7_SIZE,
            },
            EntryKind::Plain,
        )?;
        arm7.alignment = cfg.arm7_alignment;
        self.add_entry(arm7)?;

        if header.banner_offset != 0 {
            let version = ByteReader::at(&self.image, header.banner_offset as usize)
                .and_then(|mut r| r.read_u16())
                .map_err(|_| NitroError::corrupt("banner offset outside image"))?;
            let mut banner = self.system_entry(
                EntryId::BANNER,
                "banner.bin",
                header.banner_offset,
                banner_len(version),
                Placement::HeaderOffset {
                    offset_field: field::BANNER_OFFSET,
                },
                EntryKind::Banner,
            )?;
            banner.alignment = cfg.banner_alignment;
            self.add_entry(banner)?;
        }

        Ok(())
    }

    fn load_fnt(&mut self, claimed: &mut [bool]) -> NitroResult<()> {
        let fnt = self.read_file(EntryId::FNT)?.to_vec();
        let records = parse_main_table(&fnt)?;
        let mut visited = vec![false; records.len()];
        visited[0] = true;

        // Depth-first with an explicit stack; nesting can reach the full
        // directory count.
        let mut pending = vec![(0usize, DirId::ROOT)];
        while let Some((index, dir_id)) = pending.pop() {
            let children = self.load_dir(&fnt, &records, index, dir_id, claimed, &mut visited)?;
            pending.extend(children.into_iter().rev());
        }
        Ok(())
    }

    /// Attach one directory's files and sub-directories, in sub-table
    /// order. Returns the sub-directories still to be walked.
    fn load_dir(
        &mut self,
        fnt: &[u8],
        records: &[FntRecord],
        index: usize,
        dir_id: DirId,
        claimed: &mut [bool],
        visited: &mut [bool],
    ) -> NitroResult<Vec<(usize, DirId)>> {
        let record = records[index];
        let items = parse_subtable(fnt, record.subtable)?;

        let mut children = Vec::new();
        let mut file_id = record.first_file as u32;
        for item in items {
            match item {
                FntItem::File(name) => {
                    let fat_index = u16::try_from(file_id).map_err(|_| {
                        NitroError::corrupt(format!("file id {:#x} in {} overflows", file_id, dir_id))
                    })?;
                    self.add_fat_file(fat_index, name, dir_id, EntryKind::Plain, claimed)?;
                    file_id += 1;
                }
                FntItem::Dir(name, raw_id) => {
                    let sub_index = (raw_id & 0x0FFF) as usize;
                    if raw_id & 0xF000 != 0xF000 || sub_index >= records.len() {
                        return Err(NitroError::corrupt(format!(
                            "directory {:#06X} in {} is outside the FNT ({} directories)",
                            raw_id,
                            dir_id,
                            records.len()
                        )));
                    }
                    if visited[sub_index] {
                        return Err(NitroError::corrupt(format!(
                            "directory {:#06X} referenced twice",
                            raw_id
                        )));
                    }
                    visited[sub_index] = true;

                    let sub_id = DirId::fnt(sub_index as u16);
                    self.add_dir(Directory::new(sub_id, name, Some(dir_id)))?;
                    children.push((sub_index, sub_id));
                }
            }
        }
        Ok(children)
    }

    /// Every FAT record nobody claimed becomes a nameless root file.
    pub(crate) fn load_nameless_files(&mut self, claimed: &mut [bool]) -> NitroResult<()> {
        let missing: Vec<u16> = claimed
            .iter()
            .enumerate()
            .filter(|(_, taken)| !**taken)
            .map(|(i, _)| i as u16)
            .collect();

        for index in &missing {
            let name = format!("unnamed_{:04}.bin", index);
            self.add_fat_file(*index, name, DirId::ROOT, EntryKind::Plain, claimed)?;
        }

        if self.trace && !missing.is_empty() {
            eprintln!("[FS] {} nameless files", missing.len());
        }
        Ok(())
    }

    /// Create the entry backed by FAT record `index` and attach it.
    pub(crate) fn add_fat_file(
        &mut self,
        index: u16,
        name: String,
        parent: DirId,
        kind: EntryKind,
        claimed: &mut [bool],
    ) -> NitroResult<EntryId> {
        let slot = index as usize;
        if slot >= claimed.len() {
            return Err(NitroError::corrupt(format!(
                "file id {} outside the FAT ({} records)",
                index,
                claimed.len()
            )));
        }
        if claimed[slot] {
            return Err(NitroError::corrupt(format!(
                "FAT record {} claimed twice",
                index
            )));
        }
        claimed[slot] = true;

        let (start, end) = self.fat_record(index)?;
        if start > end || end as usize > self.image.len() {
            return Err(NitroError::corrupt(format!(
                "FAT record {} ({:#x}..{:#x}) outside image of {:#x} bytes",
                index,
                start,
                end,
                self.image.len()
            )));
        }

        let system = matches!(kind, EntryKind::Overlay(_));
        let id = EntryId::fat(index);
        self.add_entry(Entry {
            id,
            name,
            parent,
            offset: start,
            len: end - start,
            alignment: self.config.file_alignment,
            movable: true,
            system,
            placement: Placement::FatSlot(index),
            kind,
        })?;
        Ok(id)
    }

    /// Start/end pair of FAT record `index`.
    pub(crate) fn fat_record(&self, index: u16) -> NitroResult<(u32, u32)> {
        let fat = self.entry(EntryId::FAT)?;
        let pos = fat.offset as usize + index as usize * FAT_RECORD_SIZE as usize;
        Ok((read_u32_at(&self.image, pos)?, read_u32_at(&self.image, pos + 4)?))
    }

    fn system_entry(
        &self,
        id: EntryId,
        name: &str,
        offset: u32,
        len: u32,
        placement: Placement,
        kind: EntryKind,
    ) -> NitroResult<Entry> {
        if offset as u64 + len as u64 > self.image.len() as u64 {
            return Err(NitroError::corrupt(format!(
                "{} ({:#x}+{:#x}) outside image of {:#x} bytes",
                name,
                offset,
                len,
                self.image.len()
            )));
        }
        Ok(Entry {
            id,
            name: name.to_string(),
            parent: DirId::ROOT,
            offset,
            len,
            alignment: self.config.table_alignment,
            movable: !matches!(placement, Placement::Fixed),
            system: true,
            placement,
            kind,
        })
    }

    pub(crate) fn add_entry(&mut self, entry: Entry) -> NitroResult<()> {
        let id = entry.id;
        self.entries.insert(id, entry);
        self.attach(id)
    }

    fn attach(&mut self, id: EntryId) -> NitroResult<()> {
        let parent = self.entry(id)?.parent;
        self.dirs
            .get_mut(&parent)
            .ok_or(NitroError::DirectoryNotFound(parent))?
            .files
            .push(id);
        Ok(())
    }

    pub(crate) fn add_dir(&mut self, dir: Directory) -> NitroResult<()> {
        let id = dir.id;
        let parent = dir.parent;
        self.dirs.insert(id, dir);
        if let Some(parent) = parent {
            self.dirs
                .get_mut(&parent)
                .ok_or(NitroError::DirectoryNotFound(parent))?
                .dirs
                .push(id);
        }
        Ok(())
    }

    /// Reject images where two non-empty entries share bytes.
    fn check_overlaps(&self) -> NitroResult<()> {
        let mut spans: Vec<&Entry> = self.entries.values().filter(|e| e.len > 0).collect();
        spans.sort_by_key(|e| (e.offset, e.end()));

        let mut furthest: Option<&Entry> = None;
        for entry in spans {
            if let Some(prev) = furthest {
                if entry.offset < prev.end() {
                    return Err(NitroError::corrupt(format!(
                        "{} ({:#x}..{:#x}) overlaps {} ({:#x}..{:#x})",
                        entry.name,
                        entry.offset,
                        entry.end(),
                        prev.name,
                        prev.offset,
                        prev.end()
                    )));
                }
            }
            if furthest.map(|p| entry.end() > p.end()).unwrap_or(true) {
                furthest = Some(entry);
            }
        }
        Ok(())
    }
}

fn parse_main_table(fnt: &[u8]) -> NitroResult<Vec<FntRecord>> {
    let mut r = ByteReader::new(fnt);
    let subtable = r.read_u32()?;
    let first_file = r.read_u16()?;
    let count = r.read_u16()? as usize;

    if count == 0 || count > MAX_DIRECTORIES || count * FNT_RECORD_SIZE > fnt.len() {
        return Err(NitroError::corrupt(format!(
            "FNT declares {} directories in {:#x} bytes",
            count,
            fnt.len()
        )));
    }

    let mut records = Vec::with_capacity(count);
    records.push(FntRecord {
        subtable,
        first_file,
    });
    for _ in 1..count {
        let subtable = r.read_u32()?;
        let first_file = r.read_u16()?;
        r.skip(2)?; // parent id
        records.push(FntRecord {
            subtable,
            first_file,
        });
    }
    Ok(records)
}

fn parse_subtable(fnt: &[u8], offset: u32) -> NitroResult<Vec<FntItem>> {
    let mut r = ByteReader::at(fnt, offset as usize).map_err(|_| {
        NitroError::corrupt(format!("FNT sub-table at {:#x} outside the FNT", offset))
    })?;

    let mut items = Vec::new();
    loop {
        let len = r.read_u8()?;
        match len {
            0x00 => break,
            0x80 => {
                return Err(NitroError::corrupt(format!(
                    "reserved FNT length byte at {:#x}",
                    r.position() - 1
                )))
            }
            0x01..=0x7F => {
                let name = String::from_utf8_lossy(r.read_bytes(len as usize)?).into_owned();
                items.push(FntItem::File(name));
            }
            _ => {
                let name =
                    String::from_utf8_lossy(r.read_bytes((len & 0x7F) as usize)?).into_owned();
                let id = r.read_u16()?;
                items.push(FntItem::Dir(name, id));
            }
        }
    }
    Ok(items)
}

/// Banner size for a banner version.
fn banner_len(version: u16) -> u32 {
    match version {
        0x0002 => 0x940,
        0x0003 => 0xA40,
        0x0103 => 0x23C0,
        _ => 0x840,
    }
}
