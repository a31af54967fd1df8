/// Directory readers, one per container

/// Commodore 1541 (D64) directory chain
pub mod cbm;
/// Amstrad CP/M directory on DSK images
pub mod cpm;
/// Commodore T64 tape archive
pub mod t64;
/// Commodore raw tape pulses
pub mod tap;
/// Sinclair TR-DOS directory
pub mod trdos;

pub use cbm::D64Reader;
pub use cpm::CpmReader;
pub use t64::T64Reader;
pub use tap::TapReader;
pub use trdos::TrdosReader;

use crate::error::{CatalogError, DecodeError};
use crate::format::{ContainerBase, Geometry};
use crate::image::address::{verify, Location};
use crate::image::{ChecksumPolicy, ReadOptions};

/// Where a file's data lives in the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLocation {
    /// First sector of a linked chain (D64)
    Chain(Location),
    /// Run of consecutive sectors (TR-DOS)
    Contiguous {
        /// First sector of the run
        start: Location,
        /// Number of sectors
        sectors: u8,
    },
    /// CP/M allocation blocks across every extent
    Blocks(Vec<u16>),
    /// Byte offset into the container (T64)
    Offset {
        /// Absolute offset of the data
        offset: usize,
    },
    /// Byte offset of the data block in the pulse data (TAP)
    Tape {
        /// Byte offset of the block's first pulse within the pulse data
        pulse: usize,
    },
}

/// Per-platform header words carried by a directory entry
///
/// Commodore: load and end address. TR-DOS: the two start/length words.
/// AMSDOS: load and entry address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryParams {
    /// First header word
    pub param1: u16,
    /// Second header word
    pub param2: u16,
}

/// One file in a catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Directory slot number
    pub index: usize,
    /// Name bytes exactly as stored, padding included
    pub name: Vec<u8>,
    /// Platform file type tag
    pub type_tag: u8,
    /// Where the data lives
    pub location: FileLocation,
    /// Size in bytes the directory claims
    pub declared_size: usize,
    /// Platform header words
    pub params: EntryParams,
}

impl DirectoryEntry {
    /// Name with padding removed and non-printable bytes replaced
    pub fn display_name(&self) -> String {
        printable_name(&self.name)
    }
}

/// Render raw name bytes, dropping trailing padding and attribute bits
pub fn printable_name(raw: &[u8]) -> String {
    let trimmed = raw
        .iter()
        .rposition(|&b| !matches!(b & 0x7F, 0x00 | 0x20))
        .map_or(&raw[..0], |end| &raw[..=end]);
    trimmed
        .iter()
        .map(|&b| match b & 0x7F {
            c @ 0x20..=0x7E => c as char,
            _ => '?',
        })
        .collect()
}

/// A slot that was recognised but could not be turned into an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogProblem {
    /// Directory slot number
    pub index: usize,
    /// What went wrong
    pub reason: String,
}

/// Ordered directory listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    /// Entries in on-disk traversal order
    pub entries: Vec<DirectoryEntry>,
    /// Deleted or empty slots passed over
    pub skipped: usize,
    /// Partial failures
    pub problems: Vec<CatalogProblem>,
    /// Raw disk or tape name
    pub label: Option<Vec<u8>>,
}

impl Catalog {
    /// Find an entry by slot number
    pub fn entry(&self, index: usize) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.index == index)
    }

    /// Find an entry by trimmed name
    pub fn find(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.display_name() == name)
    }

    /// Label with padding removed
    pub fn label_text(&self) -> Option<String> {
        self.label.as_deref().map(printable_name)
    }

    fn problem<S: Into<String>>(&mut self, index: usize, reason: S) {
        let reason = reason.into();
        log::warn!("Directory slot {}: {}", index, reason);
        self.problems.push(CatalogProblem { index, reason });
    }
}

/// Reads the directory of one container kind and gathers file data
pub trait CatalogReader: Send + Sync {
    /// Walk the directory
    fn read_catalog(
        &self,
        raw: &[u8],
        geometry: &Geometry,
        options: &ReadOptions,
    ) -> Result<Catalog, CatalogError>;

    /// Collect a file's bytes in the form its body decoder expects
    fn file_data(
        &self,
        raw: &[u8],
        geometry: &Geometry,
        entry: &DirectoryEntry,
        options: &ReadOptions,
    ) -> Result<Vec<u8>, DecodeError>;
}

/// Select the directory reader for a container
pub fn reader_for(base: ContainerBase) -> &'static dyn CatalogReader {
    match base {
        ContainerBase::D64 => &D64Reader,
        ContainerBase::T64 => &T64Reader,
        ContainerBase::Tap => &TapReader,
        ContainerBase::Trd => &TrdosReader,
        ContainerBase::Dsk => &CpmReader,
    }
}

/// Verify a directory sector and apply the checksum policy
pub(crate) fn check_directory_sector(
    raw: &[u8],
    geometry: &Geometry,
    location: Location,
    index: usize,
    options: &ReadOptions,
    catalog: &mut Catalog,
) -> Result<(), CatalogError> {
    if verify(raw, geometry, location)? {
        return Ok(());
    }
    let reason = format!("directory sector {} failed verification", location);
    match options.checksum_policy {
        ChecksumPolicy::Fatal => Err(CatalogError::UnreadableSector(reason)),
        ChecksumPolicy::Advisory => {
            catalog.problem(index, reason);
            Ok(())
        }
    }
}

/// Check a payload sector, logging failures
pub(crate) fn check_payload_sector(raw: &[u8], geometry: &Geometry, location: Location) {
    if let Ok(false) = verify(raw, geometry, location) {
        log::warn!("File sector {} failed verification", location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &[u8]) -> DirectoryEntry {
        DirectoryEntry {
            index: 0,
            name: name.to_vec(),
            type_tag: 0,
            location: FileLocation::Offset { offset: 0 },
            declared_size: 0,
            params: EntryParams::default(),
        }
    }

    #[test]
    fn test_display_name_strips_padding() {
        assert_eq!(entry(b"HELLO\xA0\xA0\xA0").display_name(), "HELLO");
        assert_eq!(entry(b"game    ").display_name(), "game");
        assert_eq!(entry(b"DISC    BAS").display_name(), "DISC    BAS");
    }

    #[test]
    fn test_display_name_masks_attribute_bits() {
        // CP/M read-only flag on the first extension byte
        assert_eq!(entry(b"FILE    \xC2IN").display_name(), "FILE    BIN");
        assert_eq!(entry(b"A\x01B").display_name(), "A?B");
    }

    #[test]
    fn test_catalog_lookup() {
        let mut catalog = Catalog::default();
        let mut hello = entry(b"HELLO   ");
        hello.index = 3;
        catalog.entries.push(hello);
        assert!(catalog.entry(3).is_some());
        assert!(catalog.entry(0).is_none());
        assert_eq!(catalog.find("HELLO").map(|e| e.index), Some(3));
    }

    #[test]
    fn test_reader_for_every_base() {
        for base in [
            ContainerBase::D64,
            ContainerBase::T64,
            ContainerBase::Tap,
            ContainerBase::Trd,
            ContainerBase::Dsk,
        ] {
            let _ = reader_for(base);
        }
    }
}
