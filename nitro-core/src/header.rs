//! Cartridge header.
//!
//! The header lives at the start of the image. The image bytes stay the
//! source of truth; `Header` is a parsed snapshot used for lookups and
//! reporting. Mutations go through `Rom`, which rewrites the checksum
//! after every header write.
//!
//! Layout of the fields used here:
//! - 0x00: Title (12 bytes, NUL padded)
//! - 0x0C: Game code (4 bytes)
//! - 0x20-0x2C: ARM9 ROM offset, entry, RAM address, size
//! - 0x30-0x3C: ARM7 ROM offset, entry, RAM address, size
//! - 0x40/0x44: FNT offset/size
//! - 0x48/0x4C: FAT offset/size
//! - 0x50/0x54: ARM9 overlay table offset/size
//! - 0x58/0x5C: ARM7 overlay table offset/size
//! - 0x68: Banner offset
//! - 0x80: Filesystem end (total used ROM size)
//! - 0x84: Header size
//! - 0x15E: CRC-16 of bytes 0x000..0x15E

use crc::{Crc, CRC_16_MODBUS};
use serde::Serialize;

use crate::cursor::ByteReader;
use crate::error::NitroResult;

/// Byte offsets of header fields.
pub mod field {
    pub const TITLE: usize = 0x00;
    pub const GAME_CODE: usize = 0x0C;
    pub const ARM9_OFFSET: usize = 0x20;
    pub const ARM9_ENTRY: usize = 0x24;
    pub const ARM9_RAM_ADDRESS: usize = 0x28;
    pub const ARM9_SIZE: usize = 0x2C;
    pub const ARM7_OFFSET: usize = 0x30;
    pub const ARM7_ENTRY: usize = 0x34;
    pub const ARM7_RAM_ADDRESS: usize = 0x38;
    pub const ARM7_SIZE: usize = 0x3C;
    pub const FNT_OFFSET: usize = 0x40;
    pub const FNT_SIZE: usize = 0x44;
    pub const FAT_OFFSET: usize = 0x48;
    pub const FAT_SIZE: usize = 0x4C;
    pub const ARM9_OVT_OFFSET: usize = 0x50;
    pub const ARM9_OVT_SIZE: usize = 0x54;
    pub const ARM7_OVT_OFFSET: usize = 0x58;
    pub const ARM7_OVT_SIZE: usize = 0x5C;
    pub const BANNER_OFFSET: usize = 0x68;
    pub const FS_END: usize = 0x80;
    pub const HEADER_SIZE: usize = 0x84;
    pub const HEADER_CRC: usize = 0x15E;
}

/// Size of the header entry in the filesystem.
pub const HEADER_LEN: u32 = 0x200;

const HEADER_CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Parsed header snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub title: String,
    pub game_code: String,
    pub arm9_offset: u32,
    pub arm9_entry: u32,
    pub arm9_ram_address: u32,
    pub arm9_size: u32,
    pub arm7_offset: u32,
    pub arm7_entry: u32,
    pub arm7_ram_address: u32,
    pub arm7_size: u32,
    pub fnt_offset: u32,
    pub fnt_size: u32,
    pub fat_offset: u32,
    pub fat_size: u32,
    pub arm9_overlay_offset: u32,
    pub arm9_overlay_size: u32,
    pub arm7_overlay_offset: u32,
    pub arm7_overlay_size: u32,
    pub banner_offset: u32,
    pub fs_end: u32,
    pub header_size: u32,
    pub checksum: u16,
}

impl Header {
    /// Parse the header from the start of an image.
    pub fn parse(image: &[u8]) -> NitroResult<Self> {
        let mut r = ByteReader::new(image);

        let title = ascii_field(r.read_bytes(12)?);
        let game_code = ascii_field(r.read_bytes(4)?);

        r.seek(field::ARM9_OFFSET)?;
        let arm9_offset = r.read_u32()?;
        let arm9_entry = r.read_u32()?;
        let arm9_ram_address = r.read_u32()?;
        let arm9_size = r.read_u32()?;
        let arm7_offset = r.read_u32()?;
        let arm7_entry = r.read_u32()?;
        let arm7_ram_address = r.read_u32()?;
        let arm7_size = r.read_u32()?;
        let fnt_offset = r.read_u32()?;
        let fnt_size = r.read_u32()?;
        let fat_offset = r.read_u32()?;
        let fat_size = r.read_u32()?;
        let arm9_overlay_offset = r.read_u32()?;
        let arm9_overlay_size = r.read_u32()?;
        let arm7_overlay_offset = r.read_u32()?;
        let arm7_overlay_size = r.read_u32()?;

        r.seek(field::BANNER_OFFSET)?;
        let banner_offset = r.read_u32()?;

        r.seek(field::FS_END)?;
        let fs_end = r.read_u32()?;
        let header_size = r.read_u32()?;

        r.seek(field::HEADER_CRC)?;
        let checksum = r.read_u16()?;

        Ok(Self {
            title,
            game_code,
            arm9_offset,
            arm9_entry,
            arm9_ram_address,
            arm9_size,
            arm7_offset,
            arm7_entry,
            arm7_ram_address,
            arm7_size,
            fnt_offset,
            fnt_size,
            fat_offset,
            fat_size,
            arm9_overlay_offset,
            arm9_overlay_size,
            arm7_overlay_offset,
            arm7_overlay_size,
            banner_offset,
            fs_end,
            header_size,
            checksum,
        })
    }
}

/// CRC-16 over the checksummed part of the header.
pub fn header_crc(image: &[u8]) -> u16 {
    let end = field::HEADER_CRC.min(image.len());
    HEADER_CRC16.checksum(&image[..end])
}

fn ascii_field(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect()
}
