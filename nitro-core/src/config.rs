//! Loader and repack settings.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::NitroResult;

/// Settings applied when a ROM is opened and repacked.
///
/// Every field has a default, so a JSON file only needs the keys it
/// overrides:
///
/// ```
/// use nitro_core::NitroConfig;
/// let cfg = NitroConfig::from_json_str(r#"{ "arm7Alignment": 1024 }"#).unwrap();
/// assert_eq!(cfg.arm7_alignment, 1024);
/// assert_eq!(cfg.file_alignment, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NitroConfig {
    /// Alignment of FAT-backed files (plain and overlay).
    pub file_alignment: u32,
    /// Alignment of FNT, FAT and the overlay tables.
    pub table_alignment: u32,
    pub arm9_alignment: u32,
    /// Unconfirmed against hardware; 0x200 matches shipped ROMs.
    pub arm7_alignment: u32,
    pub banner_alignment: u32,
    /// Rounding applied to the filesystem end pointer at 0x80.
    pub fs_end_alignment: u32,
    /// Reject images where two non-empty entries share bytes.
    pub strict_overlap_check: bool,
    /// Log loader, repack and patch activity to stderr.
    pub trace: bool,
}

impl Default for NitroConfig {
    fn default() -> Self {
        Self {
            file_alignment: 4,
            table_alignment: 4,
            arm9_alignment: 0x1000,
            arm7_alignment: 0x200,
            banner_alignment: 0x200,
            fs_end_alignment: 1,
            strict_overlap_check: true,
            trace: false,
        }
    }
}

impl NitroConfig {
    pub fn from_json_str(text: &str) -> NitroResult<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        Ok(cfg.sanitized())
    }

    /// Load from a JSON file.
    pub fn from_path(path: &Path) -> NitroResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    // Alignments of zero would break the free-space search.
    fn sanitized(mut self) -> Self {
        for value in [
            &mut self.file_alignment,
            &mut self.table_alignment,
            &mut self.arm9_alignment,
            &mut self.arm7_alignment,
            &mut self.banner_alignment,
            &mut self.fs_end_alignment,
        ] {
            if *value == 0 {
                *value = 1;
            }
        }
        self
    }
}
