/// Track/sector addressing over a resolved geometry

use crate::error::AddressError;
use crate::format::{Geometry, SectorChecks};
use std::fmt;
use std::ops::Range;

/// D64 error table codes that mean "read OK"
const ERROR_TABLE_OK: [u8; 2] = [0x00, 0x01];

/// Logical sector address: platform track number and 0-based sector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    /// Track number as the platform counts it
    pub track: u8,
    /// Sector index within the track
    pub sector: u8,
}

impl Location {
    /// Create a location
    pub fn new(track: u8, sector: u8) -> Self {
        Self { track, sector }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.track, self.sector)
    }
}

/// Byte range of a sector inside the image
pub fn address_to_offset(geometry: &Geometry, location: Location) -> Result<Range<usize>, AddressError> {
    let out_of_range = AddressError::OutOfRange {
        track: location.track,
        sector: location.sector,
    };
    let track = geometry.track(location.track).ok_or(out_of_range.clone())?;
    if location.sector >= track.sectors {
        return Err(out_of_range);
    }
    let start = track.data_offset + location.sector as usize * geometry.sector_size;
    Ok(start..start + geometry.sector_size)
}

/// Location of the sector holding a byte offset
pub fn offset_to_address(geometry: &Geometry, offset: usize) -> Result<Location, AddressError> {
    if geometry.sector_size == 0 {
        return Err(AddressError::OffsetOutOfRange(offset));
    }
    geometry
        .tracks
        .iter()
        .enumerate()
        .find_map(|(index, track)| {
            let end = track.data_offset + track.sectors as usize * geometry.sector_size;
            (offset >= track.data_offset && offset < end).then(|| {
                Location::new(
                    geometry.first_track + index as u8,
                    ((offset - track.data_offset) / geometry.sector_size) as u8,
                )
            })
        })
        .ok_or(AddressError::OffsetOutOfRange(offset))
}

/// Borrow a sector's bytes from the image buffer
pub fn sector_data<'a>(
    raw: &'a [u8],
    geometry: &Geometry,
    location: Location,
) -> Result<&'a [u8], AddressError> {
    let range = address_to_offset(geometry, location)?;
    raw.get(range.clone())
        .ok_or(AddressError::OffsetOutOfRange(range.start))
}

/// Find a sector by its physical ID on a track
pub fn sector_by_id(geometry: &Geometry, track: u8, id: u8) -> Option<Location> {
    geometry.track(track).and_then(|layout| {
        layout
            .sector_ids
            .iter()
            .position(|&sid| sid == id)
            .map(|index| Location::new(track, index as u8))
    })
}

/// Check the container's recorded status for a sector
///
/// Formats without per-sector status always verify.
pub fn verify(raw: &[u8], geometry: &Geometry, location: Location) -> Result<bool, AddressError> {
    address_to_offset(geometry, location)?;
    match &geometry.checks {
        SectorChecks::None => Ok(true),
        SectorChecks::ErrorTable { offset } => {
            let index = offset + geometry.sectors_before(location.track) + location.sector as usize;
            raw.get(index)
                .map(|code| ERROR_TABLE_OK.contains(code))
                .ok_or(AddressError::OffsetOutOfRange(index))
        }
        SectorChecks::FdcStatus(table) => {
            let track_index = (location.track - geometry.first_track) as usize;
            Ok(table
                .get(track_index)
                .and_then(|statuses| statuses.get(location.sector as usize))
                .map_or(true, |status| status.is_readable()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fdc::SectorStatus;
    use crate::format::{resolve, ContainerBase, ContainerKind, TrackLayout, D64_SIZE_35};

    fn d64_geometry() -> Geometry {
        resolve(&ContainerKind::new(ContainerBase::D64), D64_SIZE_35).unwrap()
    }

    #[test]
    fn test_address_to_offset_d64() {
        let geometry = d64_geometry();
        assert_eq!(address_to_offset(&geometry, Location::new(1, 0)).unwrap(), 0..256);
        assert_eq!(
            address_to_offset(&geometry, Location::new(18, 1)).unwrap(),
            0x16600..0x16700
        );
    }

    #[test]
    fn test_address_out_of_range() {
        let geometry = d64_geometry();
        assert_eq!(
            address_to_offset(&geometry, Location::new(36, 0)),
            Err(AddressError::OutOfRange { track: 36, sector: 0 })
        );
        assert_eq!(
            address_to_offset(&geometry, Location::new(18, 19)),
            Err(AddressError::OutOfRange { track: 18, sector: 19 })
        );
        assert!(address_to_offset(&geometry, Location::new(0, 0)).is_err());
    }

    #[test]
    fn test_offset_to_address() {
        let geometry = d64_geometry();
        assert_eq!(offset_to_address(&geometry, 0x16600 + 17).unwrap(), Location::new(18, 1));
        assert_eq!(
            offset_to_address(&geometry, D64_SIZE_35),
            Err(AddressError::OffsetOutOfRange(D64_SIZE_35))
        );
    }

    #[test]
    fn test_verify_error_table() {
        let geometry = resolve(&ContainerKind::new(ContainerBase::D64), 175_531).unwrap();
        let mut raw = vec![0u8; 175_531];
        raw[D64_SIZE_35 + 1] = 0x01;
        raw[D64_SIZE_35 + 2] = 0x05;
        assert!(verify(&raw, &geometry, Location::new(1, 0)).unwrap());
        assert!(verify(&raw, &geometry, Location::new(1, 1)).unwrap());
        assert!(!verify(&raw, &geometry, Location::new(1, 2)).unwrap());
    }

    #[test]
    fn test_verify_fdc_status() {
        let geometry = Geometry {
            first_track: 0,
            tracks: vec![TrackLayout {
                sectors: 2,
                data_offset: 0,
                sector_ids: vec![0xC1, 0xC2],
            }],
            sector_size: 512,
            total_capacity: 1024,
            image_len: 1024,
            checks: SectorChecks::FdcStatus(vec![vec![
                SectorStatus::new(0, 0),
                SectorStatus::new(0x20, 0x20),
            ]]),
        };
        let raw = vec![0u8; 1024];
        assert!(verify(&raw, &geometry, Location::new(0, 0)).unwrap());
        assert!(!verify(&raw, &geometry, Location::new(0, 1)).unwrap());
        assert_eq!(sector_by_id(&geometry, 0, 0xC2), Some(Location::new(0, 1)));
        assert_eq!(sector_by_id(&geometry, 0, 0xC9), None);
    }

    #[test]
    fn test_sector_data_short_buffer() {
        let geometry = d64_geometry();
        let raw = vec![0u8; 100];
        assert_eq!(
            sector_data(&raw, &geometry, Location::new(1, 0)),
            Err(AddressError::OffsetOutOfRange(0))
        );
    }
}
