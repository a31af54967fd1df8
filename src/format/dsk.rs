/// CPCEMU disk-info and track-info block parsing

use crate::error::GeometryError;
use crate::fdc::SectorStatus;
use crate::format::constants::*;

/// DSK file format flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DskFormat {
    /// Standard format (fixed track size)
    Standard,
    /// Extended format (per-track size table)
    Extended,
}

impl DskFormat {
    /// Detect the format from the disk info block signature
    pub fn detect(disk_info: &[u8]) -> Option<Self> {
        if disk_info.starts_with(&EXTENDED_DSK_SIGNATURE[..8]) {
            Some(DskFormat::Extended)
        } else if disk_info.starts_with(&STANDARD_DSK_SIGNATURE[..8]) {
            Some(DskFormat::Standard)
        } else {
            None
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            DskFormat::Standard => "standard",
            DskFormat::Extended => "extended",
        }
    }
}

/// One sector info entry (CHRN plus FDC status and stored size)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DskSectorInfo {
    /// R - sector ID
    pub id: u8,
    /// N - size code
    pub size_code: u8,
    /// Stored FDC status
    pub status: SectorStatus,
    /// Absolute offset of the sector data
    pub data_offset: usize,
    /// Stored data length
    pub data_len: usize,
}

/// One track info block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DskTrackInfo {
    /// Physical cylinder
    pub cylinder: u8,
    /// Physical side
    pub side: u8,
    /// Absolute offset of the Track-Info block, `None` when unformatted
    pub offset: Option<usize>,
    /// Track size in bytes including the info block
    pub size: usize,
    /// Sectors in stored order
    pub sectors: Vec<DskSectorInfo>,
}

impl DskTrackInfo {
    /// Offset of the first sector's data
    pub fn data_offset(&self) -> usize {
        self.sectors
            .first()
            .map(|s| s.data_offset)
            .or(self.offset.map(|o| o + TRACK_INFO_BLOCK_SIZE))
            .unwrap_or(0)
    }
}

/// Parsed DSK track table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DskLayout {
    /// Standard or extended
    pub format: DskFormat,
    /// Tracks per side
    pub tracks_per_side: u8,
    /// Number of sides
    pub sides: u8,
    /// Track info in logical order (cylinder-major, sides interleaved)
    pub tracks: Vec<DskTrackInfo>,
    /// Bytes covered by the info blocks and every stored track
    pub image_len: usize,
}

impl DskLayout {
    /// Parse the disk info block and every Track-Info block
    pub fn parse(raw: &[u8]) -> Result<Self, GeometryError> {
        if raw.len() < DISK_INFO_BLOCK_SIZE {
            return Err(GeometryError::TruncatedBuffer {
                expected: DISK_INFO_BLOCK_SIZE,
                actual: raw.len(),
            });
        }

        let format = DskFormat::detect(raw)
            .ok_or_else(|| GeometryError::unsupported("unrecognised DSK signature"))?;
        let tracks_per_side = raw[DISK_INFO_TRACK_COUNT_OFFSET];
        let sides = raw[DISK_INFO_SIDE_COUNT_OFFSET];

        if sides == 0 || sides > 2 {
            return Err(GeometryError::unsupported(format!("{} sides", sides)));
        }
        let track_count = tracks_per_side as usize * sides as usize;
        if track_count > MAX_DSK_TRACKS {
            return Err(GeometryError::unsupported(format!(
                "{} tracks on {} sides",
                tracks_per_side, sides
            )));
        }
        let track_sizes: Vec<usize> = match format {
            DskFormat::Standard => {
                let size = u16::from_le_bytes([
                    raw[DISK_INFO_TRACK_SIZE_OFFSET],
                    raw[DISK_INFO_TRACK_SIZE_OFFSET + 1],
                ]) as usize;
                vec![size; track_count]
            }
            DskFormat::Extended => (0..track_count)
                .map(|i| raw[DISK_INFO_EXT_TRACK_SIZE_OFFSET + i] as usize * 256)
                .collect(),
        };

        let mut tracks = Vec::with_capacity(track_count);
        let mut offset = DISK_INFO_BLOCK_SIZE;

        for (index, &size) in track_sizes.iter().enumerate() {
            let cylinder = (index / sides as usize) as u8;
            let side = (index % sides as usize) as u8;

            if size == 0 {
                tracks.push(DskTrackInfo {
                    cylinder,
                    side,
                    offset: None,
                    size: 0,
                    sectors: Vec::new(),
                });
                continue;
            }

            if offset + size > raw.len() {
                return Err(GeometryError::TruncatedBuffer {
                    expected: offset + size,
                    actual: raw.len(),
                });
            }

            let track = parse_track(&raw[offset..offset + size], offset, cylinder, side)?;
            log::trace!(
                "DSK track {}/{}: {} sectors at 0x{:X}",
                cylinder,
                side,
                track.sectors.len(),
                offset
            );
            tracks.push(track);
            offset += size;
        }

        Ok(Self {
            format,
            tracks_per_side,
            sides,
            tracks,
            image_len: offset,
        })
    }

    /// Lowest sector ID on the first formatted track
    pub fn first_sector_id(&self) -> Option<u8> {
        self.tracks
            .iter()
            .find(|t| !t.sectors.is_empty())
            .and_then(|t| t.sectors.iter().map(|s| s.id).min())
    }
}

fn parse_track(
    block: &[u8],
    offset: usize,
    cylinder: u8,
    side: u8,
) -> Result<DskTrackInfo, GeometryError> {
    if block.len() < TRACK_INFO_BLOCK_SIZE || !block.starts_with(TRACK_INFO_MARKER) {
        return Err(GeometryError::unsupported(format!(
            "missing Track-Info block for track {} side {}",
            cylinder, side
        )));
    }

    let num_sectors = block[0x15] as usize;
    let max_sectors = (TRACK_INFO_BLOCK_SIZE - TRACK_INFO_SECTOR_LIST_OFFSET) / SECTOR_INFO_SIZE;
    if num_sectors > max_sectors {
        return Err(GeometryError::unsupported(format!(
            "{} sectors on track {} side {}",
            num_sectors, cylinder, side
        )));
    }

    let mut sectors = Vec::with_capacity(num_sectors);
    let mut data_offset = TRACK_INFO_BLOCK_SIZE;

    for i in 0..num_sectors {
        let sib_offset = TRACK_INFO_SECTOR_LIST_OFFSET + i * SECTOR_INFO_SIZE;
        let sib = &block[sib_offset..sib_offset + SECTOR_INFO_SIZE];
        let size_code = sib[3];
        let stored = u16::from_le_bytes([sib[6], sib[7]]) as usize;

        // Standard images leave the stored length at zero
        let data_len = if stored > 0 {
            stored
        } else {
            fdc_size_to_bytes(size_code).ok_or_else(|| {
                GeometryError::unsupported(format!("sector size code {}", size_code))
            })?
        };

        if data_offset + data_len > block.len() {
            return Err(GeometryError::Inconsistent(format!(
                "sector data overruns track {} side {}",
                cylinder, side
            )));
        }

        sectors.push(DskSectorInfo {
            id: sib[2],
            size_code,
            status: SectorStatus::new(sib[4], sib[5]),
            data_offset: offset + data_offset,
            data_len,
        });
        data_offset += data_len;
    }

    Ok(DskTrackInfo {
        cylinder,
        side,
        offset: Some(offset),
        size: block.len(),
        sectors,
    })
}
