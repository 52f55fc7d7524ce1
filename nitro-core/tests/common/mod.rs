//! Synthetic cartridge images for integration tests.
//!
//! Layout produced by `RomFixture::build`:
//! header (0x200) | ARM9 | ARM7 | ARM9 overlay table | ARM7 overlay table
//! | FNT | FAT | banner (optional) | files in FAT order
//!
//! File ids: ARM9 overlays first, then ARM7 overlays, then named files in
//! directory order, then nameless files.

#![allow(dead_code)]

use nitro_core::cursor::{write_u32_at, ByteWriter};
use nitro_core::header::{field, header_crc};

pub const ARM9_RAM: u32 = 0x0200_0000;
const SECTION_ALIGN: u32 = 0x20;

pub struct FixtureOverlay {
    pub overlay_id: u32,
    pub ram_address: u32,
    pub ram_size: u32,
    pub data: Vec<u8>,
}

pub struct FixtureDir {
    pub name: &'static str,
    /// Index of the parent in `RomFixture::dirs`; ignored for the root.
    pub parent: usize,
    pub files: Vec<(&'static str, Vec<u8>)>,
}

pub struct RomFixture {
    pub arm9: Vec<u8>,
    pub arm7: Vec<u8>,
    pub overlays: Vec<FixtureOverlay>,
    pub arm7_overlays: Vec<FixtureOverlay>,
    /// Bytes appended after the last full overlay record.
    pub overlay_table_slack: usize,
    /// `dirs[0]` is the root.
    pub dirs: Vec<FixtureDir>,
    pub nameless: Vec<Vec<u8>>,
    /// Where the first file goes; defaults to right after the tables.
    pub files_base: Option<u32>,
    pub file_alignment: u32,
    pub banner: bool,
}

impl Default for RomFixture {
    fn default() -> Self {
        Self {
            arm9: pattern(0x100, 0x90),
            arm7: pattern(0x40, 0x70),
            overlays: Vec::new(),
            arm7_overlays: Vec::new(),
            overlay_table_slack: 0,
            dirs: vec![FixtureDir {
                name: "root",
                parent: 0,
                files: Vec::new(),
            }],
            nameless: Vec::new(),
            files_base: None,
            file_alignment: 4,
            banner: false,
        }
    }
}

/// Deterministic non-zero content.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| seed.wrapping_add((i as u8).wrapping_mul(7)) | 1)
        .collect()
}

fn align(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

impl RomFixture {
    /// FAT `[(0x1000, 0x20), (0x1020, 0x40)]`, "a.bin" as id 0 in the
    /// root and id 1 unnamed.
    pub fn single_named_and_nameless() -> Self {
        let mut fixture = Self::default();
        fixture.dirs[0].files.push(("a.bin", pattern(0x20, 1)));
        fixture.nameless.push(pattern(0x40, 2));
        fixture.files_base = Some(0x1000);
        fixture
    }

    /// Two subdirectories, overlays and a nameless file.
    pub fn nested() -> Self {
        let mut fixture = Self::default();
        fixture.overlays = vec![
            FixtureOverlay {
                overlay_id: 0,
                ram_address: 0x020C_0000,
                ram_size: 0x100,
                data: pattern(0x100, 0x30),
            },
            FixtureOverlay {
                overlay_id: 3,
                ram_address: 0x020D_0000,
                ram_size: 0x80,
                data: pattern(0x80, 0x33),
            },
        ];
        fixture.dirs[0].files = vec![
            ("readme.txt", b"hello".to_vec()),
            ("sound.sdat", pattern(0x60, 0x50)),
        ];
        fixture.dirs.push(FixtureDir {
            name: "data",
            parent: 0,
            files: vec![("a.bin", pattern(0x40, 0x10)), ("b.bin", pattern(0x40, 0x20))],
        });
        fixture.dirs.push(FixtureDir {
            name: "stage",
            parent: 1,
            files: vec![("s1.bin", pattern(0x40, 0x40))],
        });
        fixture.nameless.push(pattern(0x24, 0x60));
        fixture
    }

    /// `depth` directories nested inside each other, all named "d", with
    /// "leaf.bin" in the innermost one.
    pub fn deep(depth: usize) -> Self {
        let mut fixture = Self::default();
        for level in 1..=depth {
            fixture.dirs.push(FixtureDir {
                name: "d",
                parent: level - 1,
                files: Vec::new(),
            });
        }
        fixture.dirs[depth].files.push(("leaf.bin", pattern(0x10, 0x5A)));
        fixture
    }

    /// ARM9 overlays as in `nested`, plus two ARM7 overlays. ARM7 overlay 3
    /// shares its RAM range with ARM9 overlay 3; ARM7 overlay 1 covers
    /// 0x037F8000, which no ARM9 code maps.
    pub fn with_arm7_overlays() -> Self {
        let mut fixture = Self::nested();
        fixture.arm7_overlays = vec![
            FixtureOverlay {
                overlay_id: 1,
                ram_address: 0x037F_8000,
                ram_size: 0x40,
                data: pattern(0x40, 0x71),
            },
            FixtureOverlay {
                overlay_id: 3,
                ram_address: 0x020D_0000,
                ram_size: 0x80,
                data: pattern(0x80, 0x73),
            },
        ];
        fixture
    }

    /// Total number of FAT records.
    pub fn file_count(&self) -> usize {
        self.overlays.len()
            + self.arm7_overlays.len()
            + self.dirs.iter().map(|d| d.files.len()).sum::<usize>()
            + self.nameless.len()
    }

    fn build_fnt(&self) -> Vec<u8> {
        let count = self.dirs.len();
        let mut first_ids = Vec::with_capacity(count);
        let mut next_id = (self.overlays.len() + self.arm7_overlays.len()) as u16;
        for dir in &self.dirs {
            first_ids.push(next_id);
            next_id += dir.files.len() as u16;
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (j, child) in self.dirs.iter().enumerate().skip(1) {
            children[child.parent].push(j);
        }

        let mut subtables: Vec<Vec<u8>> = Vec::with_capacity(count);
        for (i, dir) in self.dirs.iter().enumerate() {
            let mut sub = Vec::new();
            for (name, _) in &dir.files {
                sub.push(name.len() as u8);
                sub.extend_from_slice(name.as_bytes());
            }
            for &j in &children[i] {
                let child = &self.dirs[j];
                sub.push(0x80 | child.name.len() as u8);
                sub.extend_from_slice(child.name.as_bytes());
                sub.extend_from_slice(&(0xF000u16 | j as u16).to_le_bytes());
            }
            sub.push(0);
            subtables.push(sub);
        }

        let mut fnt = vec![0u8; count * 8];
        let mut sub_offset = fnt.len() as u32;
        for (i, sub) in subtables.iter().enumerate() {
            let parent = if i == 0 {
                count as u16
            } else {
                0xF000 | self.dirs[i].parent as u16
            };
            let mut w = ByteWriter::at(&mut fnt, i * 8).unwrap();
            w.write_u32(sub_offset).unwrap();
            w.write_u16(first_ids[i]).unwrap();
            w.write_u16(parent).unwrap();
            sub_offset += sub.len() as u32;
        }
        for sub in subtables {
            fnt.extend_from_slice(&sub);
        }
        fnt
    }

    fn build_overlay_table(overlays: &[FixtureOverlay], first_file: usize, slack: usize) -> Vec<u8> {
        let mut table = vec![0u8; overlays.len() * 32 + slack];
        for (i, ov) in overlays.iter().enumerate() {
            let mut w = ByteWriter::at(&mut table, i * 32).unwrap();
            w.write_u32(ov.overlay_id).unwrap();
            w.write_u32(ov.ram_address).unwrap();
            w.write_u32(ov.ram_size).unwrap();
            w.write_u32(0).unwrap();
            w.write_u32(ov.ram_address).unwrap();
            w.write_u32(ov.ram_address).unwrap();
            w.write_u16((first_file + i) as u16).unwrap();
        }
        table
    }

    /// Files in FAT order.
    fn files(&self) -> Vec<&[u8]> {
        let mut files: Vec<&[u8]> = self
            .overlays
            .iter()
            .chain(&self.arm7_overlays)
            .map(|o| o.data.as_slice())
            .collect();
        for dir in &self.dirs {
            files.extend(dir.files.iter().map(|(_, d)| d.as_slice()));
        }
        files.extend(self.nameless.iter().map(|d| d.as_slice()));
        files
    }

    pub fn build(&self) -> Vec<u8> {
        let mut image = vec![0u8; 0x200];
        image[field::TITLE..field::TITLE + 7].copy_from_slice(b"FIXTURE");
        image[field::GAME_CODE..field::GAME_CODE + 4].copy_from_slice(b"NTRF");

        let fnt = self.build_fnt();
        let ovt = Self::build_overlay_table(&self.overlays, 0, self.overlay_table_slack);
        let ovt7 = Self::build_overlay_table(&self.arm7_overlays, self.overlays.len(), 0);
        let files = self.files();
        let fat_size = (files.len() * 8) as u32;

        let arm9_offset = place(&mut image, &self.arm9, SECTION_ALIGN);
        let arm7_offset = place(&mut image, &self.arm7, SECTION_ALIGN);
        let ovt9_offset = place(&mut image, &ovt, SECTION_ALIGN);
        let ovt7_offset = place(&mut image, &ovt7, SECTION_ALIGN);
        let fnt_offset = place(&mut image, &fnt, SECTION_ALIGN);
        let fat_offset = place(&mut image, &vec![0u8; fat_size as usize], SECTION_ALIGN);
        let banner_offset = if self.banner {
            let mut banner = pattern(0x840, 0xB0);
            banner[0] = 1;
            banner[1] = 0;
            place(&mut image, &banner, 0x200)
        } else {
            0
        };

        if let Some(base) = self.files_base {
            assert!(
                base as usize >= image.len(),
                "files_base {:#x} overlaps tables",
                base
            );
            image.resize(base as usize, 0xFF);
        }

        for (i, data) in files.iter().enumerate() {
            let offset = place(&mut image, data, self.file_alignment);
            let pos = fat_offset as usize + i * 8;
            write_u32_at(&mut image, pos, offset).unwrap();
            write_u32_at(&mut image, pos + 4, offset + data.len() as u32).unwrap();
        }

        let fields = [
            (field::ARM9_OFFSET, arm9_offset),
            (field::ARM9_ENTRY, ARM9_RAM),
            (field::ARM9_RAM_ADDRESS, ARM9_RAM),
            (field::ARM9_SIZE, self.arm9.len() as u32),
            (field::ARM7_OFFSET, arm7_offset),
            (field::ARM7_ENTRY, 0x0238_0000),
            (field::ARM7_RAM_ADDRESS, 0x0238_0000),
            (field::ARM7_SIZE, self.arm7.len() as u32),
            (field::FNT_OFFSET, fnt_offset),
            (field::FNT_SIZE, fnt.len() as u32),
            (field::FAT_OFFSET, fat_offset),
            (field::FAT_SIZE, fat_size),
            (field::ARM9_OVT_OFFSET, ovt9_offset),
            (field::ARM9_OVT_SIZE, ovt.len() as u32),
            (field::ARM7_OVT_OFFSET, ovt7_offset),
            (field::ARM7_OVT_SIZE, ovt7.len() as u32),
            (field::BANNER_OFFSET, banner_offset),
            (field::FS_END, image.len() as u32),
            (field::HEADER_SIZE, 0x200),
        ];
        for (offset, value) in fields {
            write_u32_at(&mut image, offset, value).unwrap();
        }
        refresh_crc(&mut image);
        image
    }
}

/// Append `data` at the next `alignment` boundary, padding with 0xFF.
fn place(image: &mut Vec<u8>, data: &[u8], alignment: u32) -> u32 {
    let offset = align(image.len() as u32, alignment);
    image.resize(offset as usize, 0xFF);
    image.extend_from_slice(data);
    offset
}

/// Recompute the header CRC after hand-editing header bytes.
pub fn refresh_crc(image: &mut [u8]) {
    let crc = header_crc(image);
    ByteWriter::at(image, field::HEADER_CRC)
        .unwrap()
        .write_u16(crc)
        .unwrap();
}

/// ARM9 binary with a module parameter block and two autoload sections
/// (ITCM at 0x01000000, 0x20 bytes; DTCM at 0x027E0000, 0x10 bytes).
/// The main section covers the first 0x200 bytes.
pub fn arm9_with_autoloads() -> Vec<u8> {
    let mut bin = pattern(0x230, 0x99);
    let mut w = ByteWriter::at(&mut bin, 0x40).unwrap();
    w.write_u32(ARM9_RAM + 0x100).unwrap();
    w.write_u32(ARM9_RAM + 0x118).unwrap();
    w.write_u32(ARM9_RAM + 0x200).unwrap();
    w.write_u32(0).unwrap();
    w.write_u32(0).unwrap();
    w.write_u32(0).unwrap();
    w.write_u32(0x0300_0000).unwrap();
    w.write_u32(0x2106_C0DE).unwrap();
    w.write_u32(0xDEC0_0621).unwrap();

    let mut w = ByteWriter::at(&mut bin, 0x100).unwrap();
    w.write_u32(0x0100_0000).unwrap();
    w.write_u32(0x20).unwrap();
    w.write_u32(0).unwrap();
    w.write_u32(0x027E_0000).unwrap();
    w.write_u32(0x10).unwrap();
    w.write_u32(0).unwrap();
    bin
}
