/// Sinclair TR-DOS directory

use crate::error::{CatalogError, DecodeError};
use crate::filesystem::{
    check_directory_sector, check_payload_sector, Catalog, CatalogReader, DirectoryEntry,
    EntryParams, FileLocation,
};
use crate::format::{Geometry, TRD_ID, TRD_ID_OFFSET, TRD_SECTORS_PER_TRACK, TRD_SECTOR_SIZE};
use crate::image::address::{address_to_offset, sector_data, Location};
use crate::image::ReadOptions;

/// Directory entry size
const ENTRY_SIZE: usize = 16;

/// Directory sectors on track 0
const DIRECTORY_SECTORS: u8 = 8;

/// Disk info sector on track 0
const INFO_SECTOR: u8 = 8;

/// Label offset and length inside the info sector
const LABEL_OFFSET: usize = 0xF5;
const LABEL_LEN: usize = 8;

/// First name byte marking the end of the directory
const END_MARKER: u8 = 0x00;
/// First name byte marking a deleted file
const DELETED_MARKER: u8 = 0x01;

/// TR-DOS file type letters
pub const TYPE_BASIC: u8 = b'B';
/// Machine code
pub const TYPE_CODE: u8 = b'C';
/// BASIC array
pub const TYPE_DATA: u8 = b'D';
/// Sequential/print file
pub const TYPE_STREAM: u8 = b'#';

/// TR-DOS directory reader
#[derive(Debug, Clone, Copy, Default)]
pub struct TrdosReader;

impl TrdosReader {
    fn parse_entry(slot: &[u8], index: usize) -> DirectoryEntry {
        let type_tag = slot[8];
        let param1 = u16::from_le_bytes([slot[9], slot[10]]);
        let param2 = u16::from_le_bytes([slot[11], slot[12]]);
        let sectors = slot[13];
        let declared_size = match type_tag {
            TYPE_BASIC => param1 as usize,
            TYPE_CODE | TYPE_DATA => param2 as usize,
            _ => sectors as usize * TRD_SECTOR_SIZE,
        };
        DirectoryEntry {
            index,
            name: slot[..8].to_vec(),
            type_tag,
            location: FileLocation::Contiguous {
                start: Location::new(slot[15], slot[14]),
                sectors,
            },
            declared_size,
            params: EntryParams { param1, param2 },
        }
    }
}

/// Location of the `n`th sector after `start`, counting across tracks
fn sector_after(start: Location, n: usize) -> Location {
    let linear = start.track as usize * TRD_SECTORS_PER_TRACK as usize + start.sector as usize + n;
    Location::new(
        (linear / TRD_SECTORS_PER_TRACK as usize) as u8,
        (linear % TRD_SECTORS_PER_TRACK as usize) as u8,
    )
}

fn run_fits(geometry: &Geometry, start: Location, sectors: u8) -> bool {
    if start.sector >= TRD_SECTORS_PER_TRACK {
        return false;
    }
    let linear = start.track as usize * TRD_SECTORS_PER_TRACK as usize + start.sector as usize;
    linear + sectors as usize <= geometry.sector_count()
}

impl CatalogReader for TrdosReader {
    fn read_catalog(
        &self,
        raw: &[u8],
        geometry: &Geometry,
        options: &ReadOptions,
    ) -> Result<Catalog, CatalogError> {
        let mut catalog = Catalog::default();

        let info_location = Location::new(0, INFO_SECTOR);
        let info = sector_data(raw, geometry, info_location)?;
        check_directory_sector(raw, geometry, info_location, 0, options, &mut catalog)?;
        catalog.label = Some(info[LABEL_OFFSET..LABEL_OFFSET + LABEL_LEN].to_vec());
        if raw.get(TRD_ID_OFFSET) != Some(&TRD_ID) {
            log::warn!("TR-DOS identification byte is missing");
        }

        let mut index = 0;
        'sectors: for sector in 0..DIRECTORY_SECTORS {
            let location = Location::new(0, sector);
            let data = sector_data(raw, geometry, location)?;
            check_directory_sector(raw, geometry, location, index, options, &mut catalog)?;

            for slot in data.chunks_exact(ENTRY_SIZE) {
                match slot[0] {
                    END_MARKER => break 'sectors,
                    DELETED_MARKER => catalog.skipped += 1,
                    _ => {
                        let entry = Self::parse_entry(slot, index);
                        match entry.location {
                            FileLocation::Contiguous { start, sectors }
                                if !run_fits(geometry, start, sectors) =>
                            {
                                catalog.problem(
                                    index,
                                    format!("{} sectors at {} lie outside the disk", sectors, start),
                                );
                            }
                            _ => catalog.entries.push(entry),
                        }
                    }
                }
                index += 1;
            }
        }

        log::debug!(
            "TR-DOS directory: {} entries, {} deleted",
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
        let (start, sectors) = match entry.location {
            FileLocation::Contiguous { start, sectors } => (start, sectors),
            _ => return Err(DecodeError::unreadable("TR-DOS file without a sector run")),
        };
        if !run_fits(geometry, start, sectors) {
            return Err(DecodeError::unreadable(format!(
                "{} sectors at {} lie outside the disk",
                sectors, start
            )));
        }

        let mut data = Vec::with_capacity(sectors as usize * TRD_SECTOR_SIZE);
        for n in 0..sectors as usize {
            let location = sector_after(start, n);
            check_payload_sector(raw, geometry, location);
            let range = address_to_offset(geometry, location)?;
            let bytes = raw
                .get(range)
                .ok_or_else(|| DecodeError::unreadable(format!("sector {} is missing", location)))?;
            data.extend_from_slice(bytes);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{resolve, ContainerBase, ContainerKind, TrdDiskType, VariantInfo};

    fn blank_disk() -> (Vec<u8>, Geometry) {
        let kind = ContainerKind::new(ContainerBase::Trd)
            .with_variant(VariantInfo::Trd(TrdDiskType::SingleSided40));
        let len = 40 * 16 * 256;
        let geometry = resolve(&kind, len).unwrap();
        let mut raw = vec![0u8; len];
        raw[TRD_ID_OFFSET] = TRD_ID;
        raw[0x800 + LABEL_OFFSET..0x800 + LABEL_OFFSET + 8].copy_from_slice(b"MYDISK  ");
        (raw, geometry)
    }

    fn put_entry(raw: &mut [u8], slot: usize, name: &[u8; 8], kind: u8, start: Location, sectors: u8) {
        let entry = slot * ENTRY_SIZE;
        raw[entry..entry + 8].copy_from_slice(name);
        raw[entry + 8] = kind;
        raw[entry + 13] = sectors;
        raw[entry + 14] = start.sector;
        raw[entry + 15] = start.track;
    }

    #[test]
    fn test_read_directory() {
        let (mut raw, geometry) = blank_disk();
        put_entry(&mut raw, 0, b"hello   ", TYPE_BASIC, Location::new(1, 0), 1);
        put_entry(&mut raw, 1, b"\x01ead    ", TYPE_CODE, Location::new(1, 1), 2);
        put_entry(&mut raw, 2, b"screen  ", TYPE_CODE, Location::new(1, 3), 27);

        let catalog = TrdosReader
            .read_catalog(&raw, &geometry, &ReadOptions::default())
            .unwrap();
        assert_eq!(catalog.entries.len(), 2);
        assert_eq!(catalog.skipped, 1);
        assert_eq!(catalog.entries[1].index, 2);
        assert_eq!(catalog.entries[0].display_name(), "hello");
        assert_eq!(catalog.label_text().as_deref(), Some("MYDISK"));
    }

    #[test]
    fn test_run_outside_disk_is_problem() {
        let (mut raw, geometry) = blank_disk();
        put_entry(&mut raw, 0, b"huge    ", TYPE_CODE, Location::new(39, 15), 2);
        let catalog = TrdosReader
            .read_catalog(&raw, &geometry, &ReadOptions::default())
            .unwrap();
        assert!(catalog.entries.is_empty());
        assert_eq!(catalog.problems.len(), 1);
    }

    #[test]
    fn test_file_data_crosses_tracks() {
        let (mut raw, geometry) = blank_disk();
        put_entry(&mut raw, 0, b"code    ", TYPE_CODE, Location::new(1, 15), 2);
        raw[(16 + 15) * 256] = 0xAA;
        raw[32 * 256] = 0xBB;
        let catalog = TrdosReader
            .read_catalog(&raw, &geometry, &ReadOptions::default())
            .unwrap();
        let data = TrdosReader
            .file_data(&raw, &geometry, &catalog.entries[0], &ReadOptions::default())
            .unwrap();
        assert_eq!(data.len(), 512);
        assert_eq!(data[0], 0xAA);
        assert_eq!(data[256], 0xBB);
    }

    #[test]
    fn test_sector_after() {
        assert_eq!(sector_after(Location::new(1, 15), 1), Location::new(2, 0));
        assert_eq!(sector_after(Location::new(0, 3), 0), Location::new(0, 3));
    }
}
