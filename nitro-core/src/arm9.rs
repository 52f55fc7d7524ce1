//! Static sections of the ARM9 program.
//!
//! The ARM9 binary is copied to its RAM address at boot. Its module
//! parameter block (found through the nitrocode signature) describes an
//! autoload list: extra sections that the startup code copies to other
//! RAM regions (ITCM, DTCM, ...). Their data sits in the binary right
//! after the main section, in list order.
//!
//! Module parameters (offsets from the block start):
//! - 0x00: Autoload list start (RAM address)
//! - 0x04: Autoload list end (RAM address)
//! - 0x08: Autoload data start (RAM address)
//! - 0x0C/0x10: Static bss start/end
//! - 0x14: Compressed static end (0 when not compressed)
//! - 0x18: SDK version
//! - 0x1C: 0x2106C0DE
//! - 0x20: 0xDEC00621

use serde::Serialize;

use crate::cursor::ByteReader;
use crate::error::{NitroError, NitroResult};

const NITROCODE_LE: u32 = 0x2106_C0DE;
const NITROCODE_BE: u32 = 0xDEC0_0621;
const MODULE_PARAMS_TO_SIGNATURE: usize = 0x1C;
const AUTOLOAD_RECORD_SIZE: usize = 12;

/// A contiguous RAM range backed by bytes of the ARM9 binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Arm9Section {
    pub ram_base: u32,
    pub ram_size: u32,
    pub bss_size: u32,
    /// Offset of the section's data inside the binary.
    pub file_offset: u32,
}

impl Arm9Section {
    pub fn contains(&self, ram_address: u32) -> bool {
        ram_address >= self.ram_base && ram_address - self.ram_base < self.ram_size
    }

    /// Offset inside the binary backing `ram_address`.
    pub fn file_offset_of(&self, ram_address: u32) -> u32 {
        self.file_offset + (ram_address - self.ram_base)
    }
}

/// Section layout of a decompressed ARM9 binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Arm9Layout {
    pub sections: Vec<Arm9Section>,
    /// Offset of the module parameter block, if found.
    pub module_params: Option<u32>,
    /// The static part is compressed; no sections are usable for patching.
    pub compressed: bool,
}

impl Arm9Layout {
    pub fn parse(bin: &[u8], ram_address: u32) -> NitroResult<Self> {
        let Some(params) = find_module_params(bin) else {
            return Ok(Self {
                sections: vec![Arm9Section {
                    ram_base: ram_address,
                    ram_size: bin.len() as u32,
                    bss_size: 0,
                    file_offset: 0,
                }],
                module_params: None,
                compressed: false,
            });
        };

        let mut r = ByteReader::at(bin, params)?;
        let list_start = r.read_u32()?;
        let list_end = r.read_u32()?;
        let data_start = r.read_u32()?;
        r.skip(8)?; // static bss start/end
        let compressed_end = r.read_u32()?;

        if compressed_end != 0 {
            return Ok(Self {
                sections: Vec::new(),
                module_params: Some(params as u32),
                compressed: true,
            });
        }

        let to_offset = |addr: u32, what: &str| -> NitroResult<u32> {
            addr.checked_sub(ram_address)
                .filter(|&off| off as usize <= bin.len())
                .ok_or_else(|| {
                    NitroError::corrupt(format!("ARM9 {} {:#010X} outside binary", what, addr))
                })
        };
        let list_start = to_offset(list_start, "autoload list start")?;
        let list_end = to_offset(list_end, "autoload list end")?;
        let data_start = to_offset(data_start, "autoload data")?;
        if list_end < list_start {
            return Err(NitroError::corrupt("ARM9 autoload list ends before it starts"));
        }

        let mut sections = vec![Arm9Section {
            ram_base: ram_address,
            ram_size: data_start,
            bss_size: 0,
            file_offset: 0,
        }];

        let mut list = ByteReader::new(&bin[list_start as usize..list_end as usize]);
        let mut data_offset = data_start;
        while list.has_remaining(AUTOLOAD_RECORD_SIZE) {
            let ram_base = list.read_u32()?;
            let ram_size = list.read_u32()?;
            let bss_size = list.read_u32()?;
            if data_offset as usize + ram_size as usize > bin.len() {
                return Err(NitroError::corrupt(format!(
                    "ARM9 autoload section {:#010X} runs past the binary",
                    ram_base
                )));
            }
            sections.push(Arm9Section {
                ram_base,
                ram_size,
                bss_size,
                file_offset: data_offset,
            });
            data_offset += ram_size;
        }

        Ok(Self {
            sections,
            module_params: Some(params as u32),
            compressed: false,
        })
    }

    pub fn section_for(&self, ram_address: u32) -> Option<&Arm9Section> {
        self.sections.iter().find(|s| s.contains(ram_address))
    }
}

/// Locate the module parameter block by its trailing signature.
fn find_module_params(bin: &[u8]) -> Option<usize> {
    let mut pos = MODULE_PARAMS_TO_SIGNATURE;
    while pos + 8 <= bin.len() {
        let mut r = ByteReader::at(bin, pos).ok()?;
        let lo = r.read_u32().ok()?;
        let hi = r.read_u32().ok()?;
        if lo == NITROCODE_LE && hi == NITROCODE_BE {
            return Some(pos - MODULE_PARAMS_TO_SIGNATURE);
        }
        pos += 4;
    }
    None
}
