//! ROM handle.
//!
//! `Rom` owns the image bytes, the flat id -> entry table and the
//! directory table. Loading happens in `fs::builder`, repacking in
//! `fs::placement`, address resolution in `resolver`; this module holds
//! the public lookups and the open/save surface.

use std::collections::BTreeMap;
use std::io::{BufReader, Read};
use std::path::Path;

use zip::ZipArchive;

use crate::arm9::Arm9Section;
use crate::config::NitroConfig;
use crate::error::{NitroError, NitroResult};
use crate::fs::{DirId, Directory, Entry, EntryId, EntryKind, Listing, NodeKind};
use crate::header::{self, field, Header};

/// An opened cartridge image.
#[derive(Debug, Clone)]
pub struct Rom {
    pub(crate) image: Vec<u8>,
    pub(crate) config: NitroConfig,
    pub(crate) entries: BTreeMap<EntryId, Entry>,
    pub(crate) dirs: BTreeMap<DirId, Directory>,
    pub(crate) arm9_overlays: Vec<EntryId>,
    pub(crate) arm7_overlays: Vec<EntryId>,
    /// Log loader, repack and patch activity to stderr.
    pub trace: bool,
}

impl Rom {
    /// Open a `.nds` image, or the first `.nds` member of a `.zip`.
    pub fn open(path: &Path) -> NitroResult<Self> {
        Self::open_with_config(path, NitroConfig::default())
    }

    pub fn open_with_config(path: &Path, config: NitroConfig) -> NitroResult<Self> {
        let is_zip = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);

        let image = if is_zip {
            read_zipped_image(path)?
        } else {
            std::fs::read(path)?
        };

        if config.trace {
            eprintln!("[FS] Opened {} ({} bytes)", path.display(), image.len());
        }
        Self::from_bytes_with_config(image, config)
    }

    pub fn from_bytes(image: Vec<u8>) -> NitroResult<Self> {
        Self::from_bytes_with_config(image, NitroConfig::default())
    }

    /// Parse an image. Construction order is fixed: header, FNT/FAT,
    /// directory tree, system entries, overlay tables, nameless files.
    pub fn from_bytes_with_config(image: Vec<u8>, config: NitroConfig) -> NitroResult<Self> {
        let mut rom = Self {
            image,
            trace: config.trace,
            config,
            entries: BTreeMap::new(),
            dirs: BTreeMap::new(),
            arm9_overlays: Vec::new(),
            arm7_overlays: Vec::new(),
        };
        rom.load()?;
        Ok(rom)
    }

    /// Write the current image to disk.
    pub fn save(&self, path: &Path) -> NitroResult<()> {
        std::fs::write(path, &self.image)?;
        if self.trace {
            eprintln!("[FS] Saved {} ({} bytes)", path.display(), self.image.len());
        }
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.image
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.image
    }

    pub fn config(&self) -> &NitroConfig {
        &self.config
    }

    /// Snapshot of the current header fields.
    pub fn header(&self) -> NitroResult<Header> {
        Header::parse(&self.image)
    }

    /// Whether the stored header CRC matches the header bytes.
    pub fn header_crc_valid(&self) -> bool {
        match Header::parse(&self.image) {
            Ok(h) => h.checksum == header::header_crc(&self.image),
            Err(_) => false,
        }
    }

    pub fn root(&self) -> DirId {
        DirId::ROOT
    }

    pub fn entry(&self, id: EntryId) -> NitroResult<&Entry> {
        self.entries.get(&id).ok_or(NitroError::FileNotFound(id))
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn directory(&self, id: DirId) -> NitroResult<&Directory> {
        self.dirs.get(&id).ok_or(NitroError::DirectoryNotFound(id))
    }

    pub fn directories(&self) -> impl Iterator<Item = &Directory> {
        self.dirs.values()
    }

    /// ARM9 overlays in table order.
    pub fn arm9_overlays(&self) -> &[EntryId] {
        &self.arm9_overlays
    }

    /// ARM7 overlays in table order.
    pub fn arm7_overlays(&self) -> &[EntryId] {
        &self.arm7_overlays
    }

    pub fn arm9_sections(&self) -> &[Arm9Section] {
        match self.entries.get(&EntryId::ARM9).map(|e| &e.kind) {
            Some(EntryKind::Arm9Binary(layout)) => &layout.sections,
            _ => &[],
        }
    }

    pub fn arm9_is_compressed(&self) -> bool {
        matches!(
            self.entries.get(&EntryId::ARM9).map(|e| &e.kind),
            Some(EntryKind::Arm9Binary(layout)) if layout.compressed
        )
    }

    /// Child directories then files, each in stored order.
    pub fn list_directory(&self, id: DirId) -> NitroResult<Vec<Listing>> {
        let dir = self.directory(id)?;
        let mut listing = Vec::with_capacity(dir.dirs.len() + dir.files.len());
        for sub in &dir.dirs {
            let sub_dir = self.directory(*sub)?;
            listing.push(Listing {
                name: sub_dir.name.clone(),
                kind: NodeKind::Dir,
                id: sub.0,
            });
        }
        for file in &dir.files {
            let entry = self.entry(*file)?;
            listing.push(Listing {
                name: entry.name.clone(),
                kind: NodeKind::File,
                id: file.0,
            });
        }
        Ok(listing)
    }

    /// Current bytes of an entry.
    pub fn read_file(&self, id: EntryId) -> NitroResult<&[u8]> {
        let entry = self.entry(id)?;
        let start = entry.offset as usize;
        let end = start + entry.len as usize;
        self.image.get(start..end).ok_or(NitroError::OutOfBounds {
            id,
            offset: entry.offset,
            len: entry.len,
        })
    }

    /// Find a directory by a `/`-separated path from the root.
    pub fn dir_by_path(&self, path: &str) -> NitroResult<DirId> {
        let mut current = DirId::ROOT;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = self.child_dir(current, part)
                .ok_or_else(|| NitroError::PathNotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Find a file by a `/`-separated path from the root.
    pub fn file_by_path(&self, path: &str) -> NitroResult<EntryId> {
        let not_found = || NitroError::PathNotFound(path.to_string());
        let trimmed = path.trim_matches('/');
        let (dir_path, name) = match trimmed.rfind('/') {
            Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
            None => ("", trimmed),
        };
        let dir = self.dir_by_path(dir_path).map_err(|_| not_found())?;
        self.directory(dir)?
            .files
            .iter()
            .copied()
            .find(|id| self.entries.get(id).map(|e| e.name == name).unwrap_or(false))
            .ok_or_else(not_found)
    }

    /// `/`-separated path of an entry, without the root name.
    pub fn path_of(&self, id: EntryId) -> NitroResult<String> {
        let entry = self.entry(id)?;
        let mut parts = vec![entry.name.clone()];
        let mut dir = Some(entry.parent);
        while let Some(d) = dir {
            let node = self.directory(d)?;
            if node.parent.is_none() {
                break;
            }
            parts.push(node.name.clone());
            dir = node.parent;
        }
        parts.reverse();
        Ok(parts.join("/"))
    }

    fn child_dir(&self, parent: DirId, name: &str) -> Option<DirId> {
        let dir = self.dirs.get(&parent)?;
        dir.dirs
            .iter()
            .copied()
            .find(|id| self.dirs.get(id).map(|d| d.name == name).unwrap_or(false))
    }

    /// Filesystem end currently stored at 0x80.
    pub fn stored_fs_end(&self) -> NitroResult<u32> {
        crate::cursor::read_u32_at(&self.image, field::FS_END)
    }
}

fn read_zipped_image(path: &Path) -> NitroResult<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    for i in 0..archive.len() {
        let mut member = archive.by_index(i)?;
        if member.is_dir() || !member.name().to_lowercase().ends_with(".nds") {
            continue;
        }
        let mut image = Vec::with_capacity(member.size() as usize);
        member.read_to_end(&mut image)?;
        return Ok(image);
    }
    Err(NitroError::NoRomInArchive)
}
