/// Amstrad CP/M directory on DSK images

use crate::body::{AmsdosHeader, TAG_HEADERLESS};
use crate::error::{CatalogError, DecodeError};
use crate::filesystem::{
    check_directory_sector, check_payload_sector, Catalog, CatalogReader, DirectoryEntry,
    EntryParams, FileLocation,
};
use crate::format::Geometry;
use crate::image::address::{sector_by_id, sector_data, Location};
use crate::image::ReadOptions;

/// Allocation block size used by every Amstrad format
const BLOCK_SIZE: usize = 1024;

/// Directory entry size
const ENTRY_SIZE: usize = 32;

/// Directory entries on Amstrad formats
const DIRECTORY_ENTRIES: usize = 64;

/// User byte of an empty or deleted entry
const EMPTY_USER: u8 = 0xE5;

/// Highest real user number
const MAX_USER: u8 = 15;

/// Bytes per CP/M record
const RECORD_SIZE: usize = 128;

/// Amstrad disk formats, named by their first sector ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpmFormat {
    /// DATA format, sector IDs 0xC1-0xC9, no reserved tracks
    Data,
    /// SYSTEM format, sector IDs 0x41-0x49, two reserved tracks
    System,
    /// IBM/vendor format, sector IDs 0x01-0x08, one reserved track
    Vendor,
}

impl CpmFormat {
    /// Recognise a format from the lowest sector ID on track 0
    pub fn from_first_sector(id: u8) -> Option<Self> {
        match id {
            0xC1 => Some(CpmFormat::Data),
            0x41 => Some(CpmFormat::System),
            0x01 => Some(CpmFormat::Vendor),
            _ => None,
        }
    }

    /// Tracks before the directory
    pub fn reserved_tracks(&self) -> u8 {
        match self {
            CpmFormat::Data => 0,
            CpmFormat::System => 2,
            CpmFormat::Vendor => 1,
        }
    }
}

/// Disk parameters derived from the format and geometry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskParameterBlock {
    /// Detected format
    pub format: CpmFormat,
    /// Lowest sector ID on each track
    pub first_sector_id: u8,
    /// Sectors per track
    pub sectors_per_track: usize,
    /// Bytes per sector
    pub sector_size: usize,
    /// Tracks before the directory
    pub reserved_tracks: u8,
    /// Allocation blocks in the data area
    pub total_blocks: usize,
}

impl DiskParameterBlock {
    /// Work out the parameters for a resolved DSK geometry
    pub fn detect(geometry: &Geometry) -> Result<Self, CatalogError> {
        let first = geometry
            .track(0)
            .and_then(|track| track.sector_ids.iter().min().copied())
            .ok_or_else(|| CatalogError::header("track 0 is unformatted"))?;
        let format = CpmFormat::from_first_sector(first).ok_or_else(|| {
            CatalogError::header(format!("no CP/M format starts at sector ID 0x{:02X}", first))
        })?;

        let sector_size = geometry.sector_size;
        if sector_size == 0 || BLOCK_SIZE % sector_size != 0 {
            return Err(CatalogError::header(format!(
                "{}-byte sectors do not divide a CP/M block",
                sector_size
            )));
        }
        let sectors_per_track = geometry.tracks[0].sectors as usize;
        let reserved_tracks = format.reserved_tracks();
        let data_tracks = geometry.tracks.len().saturating_sub(reserved_tracks as usize);

        Ok(Self {
            format,
            first_sector_id: first,
            sectors_per_track,
            sector_size,
            reserved_tracks,
            total_blocks: data_tracks * sectors_per_track * sector_size / BLOCK_SIZE,
        })
    }

    /// Block size in bytes
    pub fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    /// Sectors per allocation block
    pub fn sectors_per_block(&self) -> usize {
        BLOCK_SIZE / self.sector_size
    }

    /// Allocation numbers are 16-bit once there are more than 255 blocks
    pub fn wide_allocation(&self) -> bool {
        self.total_blocks > 255
    }

    /// Physical location of the `n`th sector after the reserved tracks
    fn data_sector(&self, geometry: &Geometry, n: usize) -> Option<Location> {
        let linear = self.reserved_tracks as usize * self.sectors_per_track + n;
        let track = u8::try_from(linear / self.sectors_per_track).ok()?;
        let id = self.first_sector_id + (linear % self.sectors_per_track) as u8;
        sector_by_id(geometry, track, id)
    }

    /// Sector locations backing an allocation block
    fn block_sectors(&self, geometry: &Geometry, block: u16) -> Option<Vec<Location>> {
        let first = block as usize * self.sectors_per_block();
        (first..first + self.sectors_per_block())
            .map(|n| self.data_sector(geometry, n))
            .collect()
    }
}

/// One 32-byte directory slot
#[derive(Debug, Clone)]
struct CpmDirEntry {
    index: usize,
    user: u8,
    name: [u8; 11],
    extent_low: u8,
    extent_high: u8,
    record_count: u8,
    allocation: [u8; 16],
}

impl CpmDirEntry {
    fn parse(data: &[u8], index: usize) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&data[1..12]);
        let mut allocation = [0u8; 16];
        allocation.copy_from_slice(&data[16..32]);
        Self {
            index,
            user: data[0],
            name,
            extent_low: data[12],
            extent_high: data[14],
            record_count: data[15],
            allocation,
        }
    }

    /// Name with attribute bits cleared, used to group extents
    fn plain_name(&self) -> [u8; 11] {
        self.name.map(|b| b & 0x7F)
    }

    fn extent_number(&self) -> u16 {
        ((self.extent_high as u16) << 5) | (self.extent_low as u16 & 0x1F)
    }

    fn blocks(&self, wide: bool) -> Vec<u16> {
        if wide {
            self.allocation
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .filter(|&block| block != 0)
                .collect()
        } else {
            self.allocation
                .iter()
                .filter(|&&block| block != 0)
                .map(|&block| block as u16)
                .collect()
        }
    }
}

/// Extents of one file, in extent order
struct CpmFile {
    extents: Vec<CpmDirEntry>,
}

impl CpmFile {
    /// Slot where the file first appears
    fn index(&self) -> usize {
        self.extents.iter().map(|e| e.index).min().unwrap_or(0)
    }
}

/// Group extents by user and name, keeping first-appearance order
fn merge_extents(entries: Vec<CpmDirEntry>) -> Vec<CpmFile> {
    let mut files: Vec<CpmFile> = Vec::new();
    for entry in entries {
        let key = (entry.user, entry.plain_name());
        match files
            .iter_mut()
            .find(|f| (f.extents[0].user, f.extents[0].plain_name()) == key)
        {
            Some(file) => file.extents.push(entry),
            None => files.push(CpmFile {
                extents: vec![entry],
            }),
        }
    }
    for file in &mut files {
        file.extents.sort_by_key(|e| e.extent_number());
    }
    files
}

/// CP/M directory reader
#[derive(Debug, Clone, Copy, Default)]
pub struct CpmReader;

impl CpmReader {
    fn read_block(
        raw: &[u8],
        geometry: &Geometry,
        dpb: &DiskParameterBlock,
        block: u16,
    ) -> Result<Vec<u8>, DecodeError> {
        let sectors = dpb
            .block_sectors(geometry, block)
            .ok_or_else(|| DecodeError::unreadable(format!("block {} is not on the disk", block)))?;
        let mut data = Vec::with_capacity(BLOCK_SIZE);
        for location in sectors {
            check_payload_sector(raw, geometry, location);
            data.extend_from_slice(sector_data(raw, geometry, location)?);
        }
        Ok(data)
    }

    fn build_entry(
        raw: &[u8],
        geometry: &Geometry,
        dpb: &DiskParameterBlock,
        file: &CpmFile,
    ) -> Result<DirectoryEntry, String> {
        let first = &file.extents[0];
        let wide = dpb.wide_allocation();
        let blocks: Vec<u16> = file.extents.iter().flat_map(|e| e.blocks(wide)).collect();
        if let Some(bad) = blocks.iter().find(|&&b| b as usize >= dpb.total_blocks) {
            return Err(format!("block {} is past the end of the disk", bad));
        }

        let (type_tag, params) = match blocks.first() {
            Some(&block) => match Self::read_block(raw, geometry, dpb, block) {
                Ok(data) => match AmsdosHeader::parse(&data) {
                    Some(header) => (header.file_type, header.params()),
                    None => (TAG_HEADERLESS, EntryParams::default()),
                },
                Err(e) => return Err(e.to_string()),
            },
            None => (TAG_HEADERLESS, EntryParams::default()),
        };

        Ok(DirectoryEntry {
            index: file.index(),
            name: first.name.to_vec(),
            type_tag,
            location: FileLocation::Blocks(blocks),
            declared_size: file
                .extents
                .iter()
                .map(|e| e.record_count as usize * RECORD_SIZE)
                .sum(),
            params,
        })
    }
}

impl CatalogReader for CpmReader {
    fn read_catalog(
        &self,
        raw: &[u8],
        geometry: &Geometry,
        options: &ReadOptions,
    ) -> Result<Catalog, CatalogError> {
        let dpb = DiskParameterBlock::detect(geometry)?;
        log::debug!("CP/M {:?} format, {} blocks", dpb.format, dpb.total_blocks);

        let mut catalog = Catalog::default();
        let directory_sectors = DIRECTORY_ENTRIES * ENTRY_SIZE / dpb.sector_size;
        let mut slots = Vec::new();
        let mut index = 0;

        for n in 0..directory_sectors {
            let location = dpb.data_sector(geometry, n).ok_or_else(|| {
                CatalogError::UnreadableSector(format!("directory sector {} is missing", n))
            })?;
            check_directory_sector(raw, geometry, location, index, options, &mut catalog)?;
            let data = sector_data(raw, geometry, location)?;

            for slot in data.chunks_exact(ENTRY_SIZE) {
                match slot[0] {
                    EMPTY_USER => catalog.skipped += 1,
                    user if user > MAX_USER => catalog.skipped += 1,
                    _ => slots.push(CpmDirEntry::parse(slot, index)),
                }
                index += 1;
            }
        }

        for file in merge_extents(slots) {
            match Self::build_entry(raw, geometry, &dpb, &file) {
                Ok(entry) => catalog.entries.push(entry),
                Err(reason) => catalog.problem(file.index(), reason),
            }
        }

        log::debug!(
            "CP/M directory: {} files, {} empty slots",
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
        let blocks = match &entry.location {
            FileLocation::Blocks(blocks) => blocks,
            _ => return Err(DecodeError::unreadable("CP/M file without allocation blocks")),
        };
        let dpb = DiskParameterBlock::detect(geometry).map_err(|e| DecodeError::unreadable(e.to_string()))?;

        let mut data = Vec::with_capacity(blocks.len() * BLOCK_SIZE);
        for &block in blocks {
            data.extend(Self::read_block(raw, geometry, &dpb, block)?);
        }
        data.truncate(entry.declared_size);
        Ok(data)
    }
}
