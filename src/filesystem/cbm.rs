/// Commodore 1541 directory and sector chains

use crate::error::{CatalogError, DecodeError};
use crate::filesystem::{
    check_directory_sector, check_payload_sector, Catalog, CatalogReader, DirectoryEntry,
    EntryParams, FileLocation,
};
use crate::format::Geometry;
use crate::image::address::{address_to_offset, sector_data, Location};
use crate::image::ReadOptions;
use std::collections::HashSet;

/// Directory header (BAM) sector
pub const HEADER_LOCATION: Location = Location { track: 18, sector: 0 };

/// First directory sector
pub const DIRECTORY_LOCATION: Location = Location { track: 18, sector: 1 };

/// Directory entry size
const ENTRY_SIZE: usize = 32;

/// Bytes of file data in a full block (block minus the two link bytes)
pub const BLOCK_DATA_SIZE: usize = 254;

/// Offset and length of the disk name in the header sector
const DISK_NAME_OFFSET: usize = 0x90;
const DISK_NAME_LEN: usize = 16;

/// File type bits of the attribute byte
const TYPE_MASK: u8 = 0x0F;
/// Closed flag of the attribute byte
const CLOSED_FLAG: u8 = 0x80;

/// The two-byte link that starts every chained sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLink {
    /// Another sector follows
    Next(Location),
    /// Last sector, with this many bytes used (link included)
    Tail(usize),
}

impl ChainLink {
    /// Decode the link from the first two bytes of a block
    pub fn new(block: &[u8]) -> ChainLink {
        if block[0] == 0x00 {
            // A used count below 2 would not even cover the link itself
            ChainLink::Tail((block[1] as usize + 1).max(2))
        } else {
            ChainLink::Next(Location::new(block[0], block[1]))
        }
    }
}

/// One block of a chain together with where it was read from
#[derive(Debug)]
pub struct ChainSector<'a> {
    /// Full block contents, link included
    pub block: &'a [u8],
    /// Bytes in use, link included
    pub used: usize,
    /// Block location
    pub location: Location,
}

impl<'a> ChainSector<'a> {
    /// Data bytes after the link
    pub fn data(&self) -> &'a [u8] {
        &self.block[2..self.used.min(self.block.len())]
    }
}

/// Follows track/sector links, failing on loops, overlong chains and bad links
pub struct ChainIterator<'a> {
    raw: &'a [u8],
    geometry: &'a Geometry,
    next_sector: Option<Location>,
    visited_sectors: HashSet<Location>,
    limit: usize,
}

impl<'a> ChainIterator<'a> {
    /// Start a walk at `start`, reading at most `limit` sectors
    pub fn new(raw: &'a [u8], geometry: &'a Geometry, start: Location, limit: usize) -> Self {
        Self {
            raw,
            geometry,
            next_sector: Some(start),
            visited_sectors: HashSet::new(),
            limit,
        }
    }
}

impl<'a> Iterator for ChainIterator<'a> {
    type Item = Result<ChainSector<'a>, CatalogError>;

    fn next(&mut self) -> Option<Self::Item> {
        let location = self.next_sector.take()?;

        if !self.visited_sectors.insert(location) {
            return Some(Err(CatalogError::chain(
                location.track,
                location.sector,
                "sector revisited",
            )));
        }
        if self.visited_sectors.len() > self.limit {
            return Some(Err(CatalogError::chain(
                location.track,
                location.sector,
                format!("chain longer than {} sectors", self.limit),
            )));
        }

        let block = match sector_data(self.raw, self.geometry, location) {
            Ok(block) => block,
            Err(err) => {
                return Some(Err(CatalogError::chain(
                    location.track,
                    location.sector,
                    err.to_string(),
                )))
            }
        };

        let used = match ChainLink::new(block) {
            ChainLink::Next(next) => {
                if address_to_offset(self.geometry, next).is_err() {
                    return Some(Err(CatalogError::chain(
                        location.track,
                        location.sector,
                        format!("link to {} is out of range", next),
                    )));
                }
                log::trace!("Chain {} -> {}", location, next);
                self.next_sector = Some(next);
                block.len()
            }
            ChainLink::Tail(used) => used,
        };

        Some(Ok(ChainSector {
            block,
            used,
            location,
        }))
    }
}

/// Commodore file types (low nibble of the attribute byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbmFileType {
    /// Deleted
    Del,
    /// Sequential
    Seq,
    /// Program
    Prg,
    /// User
    Usr,
    /// Relative
    Rel,
}

impl CbmFileType {
    /// Parse the type tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CbmFileType::Del),
            1 => Some(CbmFileType::Seq),
            2 => Some(CbmFileType::Prg),
            3 => Some(CbmFileType::Usr),
            4 => Some(CbmFileType::Rel),
            _ => None,
        }
    }

    /// Three-letter directory name
    pub fn name(&self) -> &'static str {
        match self {
            CbmFileType::Del => "DEL",
            CbmFileType::Seq => "SEQ",
            CbmFileType::Prg => "PRG",
            CbmFileType::Usr => "USR",
            CbmFileType::Rel => "REL",
        }
    }
}

/// D64 directory reader
#[derive(Debug, Clone, Copy, Default)]
pub struct D64Reader;

impl D64Reader {
    fn parse_entry(slot: &[u8], index: usize) -> Option<DirectoryEntry> {
        let attribute = slot[2];
        if attribute == 0x00 {
            return None;
        }
        if attribute & CLOSED_FLAG == 0 {
            log::warn!("Directory slot {} holds an unclosed file", index);
        }
        let blocks = u16::from_le_bytes([slot[0x1E], slot[0x1F]]) as usize;
        Some(DirectoryEntry {
            index,
            name: slot[5..5 + 16].to_vec(),
            type_tag: attribute & TYPE_MASK,
            location: FileLocation::Chain(Location::new(slot[3], slot[4])),
            declared_size: blocks * BLOCK_DATA_SIZE,
            params: EntryParams {
                param1: attribute as u16,
                param2: slot[0x17] as u16,
            },
        })
    }
}

impl CatalogReader for D64Reader {
    fn read_catalog(
        &self,
        raw: &[u8],
        geometry: &Geometry,
        options: &ReadOptions,
    ) -> Result<Catalog, CatalogError> {
        let mut catalog = Catalog::default();

        let header = sector_data(raw, geometry, HEADER_LOCATION)?;
        check_directory_sector(raw, geometry, HEADER_LOCATION, 0, options, &mut catalog)?;
        catalog.label = Some(header[DISK_NAME_OFFSET..DISK_NAME_OFFSET + DISK_NAME_LEN].to_vec());

        let mut index = 0;
        let chain = ChainIterator::new(raw, geometry, DIRECTORY_LOCATION, options.max_chain_sectors);
        for sector in chain {
            let sector = sector?;
            check_directory_sector(raw, geometry, sector.location, index, options, &mut catalog)?;
            for slot in sector.block.chunks_exact(ENTRY_SIZE) {
                match Self::parse_entry(slot, index) {
                    Some(entry) => catalog.entries.push(entry),
                    None => catalog.skipped += 1,
                }
                index += 1;
            }
        }

        log::debug!(
            "D64 directory: {} entries, {} empty slots",
            catalog.entries.len(),
            catalog.skipped
        );
        Ok(catalog)
    }

    fn file_data(
        &self,
        raw: &[u8],
        geometry: &Geometry,
        entry: &DirectoryEntry,
        _options: &ReadOptions,
    ) -> Result<Vec<u8>, DecodeError> {
        let start = match entry.location {
            FileLocation::Chain(start) => start,
            _ => return Err(DecodeError::unreadable("D64 file without a chain")),
        };
        // Empty files have no data chain
        if start.track == 0 {
            return Ok(Vec::new());
        }

        let mut data = Vec::with_capacity(entry.declared_size);
        for sector in ChainIterator::new(raw, geometry, start, geometry.sector_count()) {
            let sector = sector.map_err(|err| DecodeError::unreadable(err.to_string()))?;
            check_payload_sector(raw, geometry, sector.location);
            data.extend_from_slice(sector.data());
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{resolve, ContainerBase, ContainerKind, D64_SIZE_35};

    fn blank_disk() -> (Vec<u8>, Geometry) {
        let geometry = resolve(&ContainerKind::new(ContainerBase::D64), D64_SIZE_35).unwrap();
        let mut raw = vec![0u8; D64_SIZE_35];
        let header = address_to_offset(&geometry, HEADER_LOCATION).unwrap().start;
        raw[header] = 18;
        raw[header + 1] = 1;
        raw[header + DISK_NAME_OFFSET..header + DISK_NAME_OFFSET + 16].copy_from_slice(b"TEST DISK\xA0\xA0\xA0\xA0\xA0\xA0\xA0");
        let dir = address_to_offset(&geometry, DIRECTORY_LOCATION).unwrap().start;
        raw[dir] = 0;
        raw[dir + 1] = 0xFF;
        (raw, geometry)
    }

    fn put_entry(raw: &mut [u8], geometry: &Geometry, slot: usize, name: &[u8], start: Location) {
        let dir = address_to_offset(geometry, DIRECTORY_LOCATION).unwrap().start;
        let entry = dir + slot * ENTRY_SIZE;
        raw[entry + 2] = 0x82;
        raw[entry + 3] = start.track;
        raw[entry + 4] = start.sector;
        raw[entry + 5..entry + 21].fill(0xA0);
        raw[entry + 5..entry + 5 + name.len()].copy_from_slice(name);
        raw[entry + 0x1E] = 1;
    }

    #[test]
    fn test_chain_link() {
        assert_eq!(ChainLink::new(&[18, 4]), ChainLink::Next(Location::new(18, 4)));
        assert_eq!(ChainLink::new(&[0, 0xFF]), ChainLink::Tail(256));
        assert_eq!(ChainLink::new(&[0, 0]), ChainLink::Tail(2));
    }

    #[test]
    fn test_read_directory() {
        let (mut raw, geometry) = blank_disk();
        put_entry(&mut raw, &geometry, 0, b"HELLO", Location::new(17, 0));
        put_entry(&mut raw, &geometry, 2, b"WORLD", Location::new(17, 1));

        let catalog = D64Reader
            .read_catalog(&raw, &geometry, &ReadOptions::default())
            .unwrap();
        assert_eq!(catalog.entries.len(), 2);
        assert_eq!(catalog.skipped, 6);
        assert_eq!(catalog.entries[0].display_name(), "HELLO");
        assert_eq!(catalog.entries[0].type_tag, 2);
        assert_eq!(catalog.entries[1].index, 2);
        assert_eq!(catalog.label_text().as_deref(), Some("TEST DISK"));
    }

    #[test]
    fn test_self_linked_directory_is_corrupt() {
        let (mut raw, geometry) = blank_disk();
        let dir = address_to_offset(&geometry, DIRECTORY_LOCATION).unwrap().start;
        raw[dir] = 18;
        raw[dir + 1] = 1;
        let result = D64Reader.read_catalog(&raw, &geometry, &ReadOptions::default());
        assert!(matches!(
            result,
            Err(CatalogError::CorruptChain { track: 18, sector: 1, .. })
        ));
    }

    #[test]
    fn test_out_of_range_link_is_corrupt() {
        let (mut raw, geometry) = blank_disk();
        let dir = address_to_offset(&geometry, DIRECTORY_LOCATION).unwrap().start;
        raw[dir] = 18;
        raw[dir + 1] = 40;
        let result = D64Reader.read_catalog(&raw, &geometry, &ReadOptions::default());
        assert!(matches!(result, Err(CatalogError::CorruptChain { .. })));
    }

    #[test]
    fn test_chain_cap() {
        let (mut raw, geometry) = blank_disk();
        for sector in 1..4u8 {
            let offset = address_to_offset(&geometry, Location::new(18, sector)).unwrap().start;
            raw[offset] = 18;
            raw[offset + 1] = sector + 1;
        }
        let options = ReadOptions::default().with_max_chain_sectors(2);
        let result = D64Reader.read_catalog(&raw, &geometry, &options);
        assert!(matches!(
            result,
            Err(CatalogError::CorruptChain { track: 18, sector: 3, .. })
        ));
    }

    #[test]
    fn test_file_data_follows_chain() {
        let (mut raw, geometry) = blank_disk();
        put_entry(&mut raw, &geometry, 0, b"PROG", Location::new(17, 0));
        let first = address_to_offset(&geometry, Location::new(17, 0)).unwrap().start;
        raw[first] = 17;
        raw[first + 1] = 5;
        raw[first + 2..first + 256].fill(0x11);
        let second = address_to_offset(&geometry, Location::new(17, 5)).unwrap().start;
        raw[second] = 0;
        raw[second + 1] = 4;
        raw[second + 2..second + 5].copy_from_slice(&[1, 2, 3]);

        let catalog = D64Reader
            .read_catalog(&raw, &geometry, &ReadOptions::default())
            .unwrap();
        let data = D64Reader
            .file_data(&raw, &geometry, &catalog.entries[0], &ReadOptions::default())
            .unwrap();
        assert_eq!(data.len(), 254 + 3);
        assert_eq!(&data[254..], &[1, 2, 3]);
    }

    #[test]
    fn test_file_type_names() {
        assert_eq!(CbmFileType::from_tag(2).map(|t| t.name()), Some("PRG"));
        assert_eq!(CbmFileType::from_tag(5), None);
    }
}
