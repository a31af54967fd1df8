/// Physical layout resolution

use crate::error::GeometryError;
use crate::fdc::SectorStatus;
use crate::format::constants::*;
use crate::format::{ContainerBase, ContainerKind, DskLayout, TrackCount, TrdDiskType, VariantInfo};

/// Layout of a single logical track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackLayout {
    /// Number of sectors on the track
    pub sectors: u8,
    /// Absolute offset of the first sector's data
    pub data_offset: usize,
    /// Physical sector IDs in stored order
    pub sector_ids: Vec<u8>,
}

/// Source of per-sector verification data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectorChecks {
    /// Container records no per-sector status
    None,
    /// D64 error table, one byte per sector starting at `offset`
    ErrorTable {
        /// Offset of the table in the image
        offset: usize,
    },
    /// DSK FDC status, indexed by logical track then sector index
    FdcStatus(Vec<Vec<SectorStatus>>),
}

/// Verified physical layout of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    /// Number of the first track (1 on Commodore disks, 0 elsewhere)
    pub first_track: u8,
    /// Track table in logical order
    pub tracks: Vec<TrackLayout>,
    /// Bytes per sector
    pub sector_size: usize,
    /// Sum of every sector's size
    pub total_capacity: usize,
    /// Bytes the container occupies, overhead included
    pub image_len: usize,
    /// Per-sector verification source
    pub checks: SectorChecks,
}

impl Geometry {
    /// Layout of a track by its platform track number
    pub fn track(&self, track: u8) -> Option<&TrackLayout> {
        track
            .checked_sub(self.first_track)
            .and_then(|index| self.tracks.get(index as usize))
    }

    /// Number of the last track
    pub fn last_track(&self) -> u8 {
        self.first_track
            .saturating_add(self.tracks.len().saturating_sub(1) as u8)
    }

    /// Total number of sectors
    pub fn sector_count(&self) -> usize {
        self.tracks.iter().map(|t| t.sectors as usize).sum()
    }

    /// Sectors preceding a track, used to index linear tables
    pub fn sectors_before(&self, track: u8) -> usize {
        let index = track.saturating_sub(self.first_track) as usize;
        self.tracks
            .iter()
            .take(index)
            .map(|t| t.sectors as usize)
            .sum()
    }

    /// Single-sector layout spanning a tape payload
    pub fn linear(data_offset: usize, payload_len: usize, image_len: usize) -> Self {
        Self {
            first_track: 0,
            tracks: vec![TrackLayout {
                sectors: 1,
                data_offset,
                sector_ids: vec![0],
            }],
            sector_size: payload_len,
            total_capacity: payload_len,
            image_len,
            checks: SectorChecks::None,
        }
    }

    /// Check the capacity invariant and that every track lies inside the image
    pub fn validate(&self) -> Result<(), GeometryError> {
        let sum = self.sector_count() * self.sector_size;
        if sum != self.total_capacity {
            return Err(GeometryError::Inconsistent(format!(
                "track table holds {} bytes, capacity is {}",
                sum, self.total_capacity
            )));
        }
        for (index, track) in self.tracks.iter().enumerate() {
            let end = track.data_offset + track.sectors as usize * self.sector_size;
            if end > self.image_len {
                return Err(GeometryError::Inconsistent(format!(
                    "track {} ends at {} past image length {}",
                    index + self.first_track as usize,
                    end,
                    self.image_len
                )));
            }
            if track.sector_ids.len() != track.sectors as usize {
                return Err(GeometryError::Inconsistent(format!(
                    "track {} lists {} sector IDs for {} sectors",
                    index + self.first_track as usize,
                    track.sector_ids.len(),
                    track.sectors
                )));
            }
        }
        Ok(())
    }
}

/// Sectors on a 1541 track (1-based)
pub fn d64_sectors_per_track(track: u8) -> u8 {
    match track {
        1..=17 => 21,
        18..=24 => 19,
        25..=30 => 18,
        _ => 17,
    }
}

/// Plain image size for a D64 track count
pub fn d64_size(tracks: TrackCount) -> usize {
    match tracks {
        TrackCount::Tracks35 => D64_SIZE_35,
        TrackCount::Tracks40 => D64_SIZE_40,
        TrackCount::Tracks42 => D64_SIZE_42,
    }
}

/// Resolve the geometry of a container from its kind and buffer length
pub fn resolve(kind: &ContainerKind, len: usize) -> Result<Geometry, GeometryError> {
    let geometry = match (kind.base, &kind.variant) {
        (ContainerBase::D64, Some(VariantInfo::D64 { tracks, .. })) => resolve_d64_declared(*tracks, len)?,
        (ContainerBase::D64, None) => resolve_d64_by_length(len)?,
        (ContainerBase::Trd, Some(VariantInfo::Trd(disk_type))) => resolve_trd(*disk_type, len)?,
        (ContainerBase::Trd, None) => resolve_trd_by_length(len)?,
        (ContainerBase::Dsk, Some(VariantInfo::Dsk(layout))) => resolve_dsk(layout, len)?,
        (ContainerBase::Tap, Some(VariantInfo::Tap { version, data_len })) => {
            resolve_tap(*version, *data_len as usize, len)?
        }
        (ContainerBase::T64, None) => {
            if len < T64_HEADER_SIZE {
                return Err(GeometryError::TruncatedBuffer {
                    expected: T64_HEADER_SIZE,
                    actual: len,
                });
            }
            Geometry::linear(0, len, len)
        }
        (ContainerBase::Dsk, None) | (ContainerBase::Tap, None) => {
            return Err(GeometryError::unsupported(format!(
                "{} variant must be read from its header",
                kind.base.name()
            )))
        }
        (base, Some(variant)) => {
            return Err(GeometryError::unsupported(format!(
                "{:?} does not describe a {}",
                variant,
                base.name()
            )))
        }
    };

    geometry.validate()?;
    log::debug!(
        "Resolved {}: {} tracks, {} sectors of {} bytes",
        kind,
        geometry.tracks.len(),
        geometry.sector_count(),
        geometry.sector_size
    );
    Ok(geometry)
}

fn d64_geometry(tracks: TrackCount, error_table: bool) -> Geometry {
    let mut layout = Vec::with_capacity(tracks.tracks() as usize);
    let mut offset = 0;
    for track in 1..=tracks.tracks() {
        let sectors = d64_sectors_per_track(track);
        layout.push(TrackLayout {
            sectors,
            data_offset: offset,
            sector_ids: (0..sectors).collect(),
        });
        offset += sectors as usize * CBM_BLOCK_SIZE;
    }
    let sector_count = offset / CBM_BLOCK_SIZE;
    Geometry {
        first_track: 1,
        tracks: layout,
        sector_size: CBM_BLOCK_SIZE,
        total_capacity: offset,
        image_len: if error_table { offset + sector_count } else { offset },
        checks: if error_table {
            SectorChecks::ErrorTable { offset }
        } else {
            SectorChecks::None
        },
    }
}

fn resolve_d64_declared(tracks: TrackCount, len: usize) -> Result<Geometry, GeometryError> {
    let plain = d64_size(tracks);
    let with_errors = plain + plain / CBM_BLOCK_SIZE;
    if len == plain {
        Ok(d64_geometry(tracks, false))
    } else if len == with_errors {
        Ok(d64_geometry(tracks, true))
    } else if len < plain {
        Err(GeometryError::TruncatedBuffer {
            expected: plain,
            actual: len,
        })
    } else {
        Err(GeometryError::unsupported(format!(
            "{} bytes for a {} track D64",
            len,
            tracks.tracks()
        )))
    }
}

fn resolve_d64_by_length(len: usize) -> Result<Geometry, GeometryError> {
    for tracks in TrackCount::ALL {
        let plain = d64_size(tracks);
        if len == plain {
            return Ok(d64_geometry(tracks, false));
        }
        if len == plain + plain / CBM_BLOCK_SIZE {
            return Ok(d64_geometry(tracks, true));
        }
    }
    if len < D64_SIZE_35 {
        Err(GeometryError::TruncatedBuffer {
            expected: D64_SIZE_35,
            actual: len,
        })
    } else {
        Err(GeometryError::unsupported(format!("{} bytes matches no D64 layout", len)))
    }
}

fn resolve_trd(disk_type: TrdDiskType, len: usize) -> Result<Geometry, GeometryError> {
    let tracks = disk_type.logical_tracks() as usize;
    let track_bytes = TRD_SECTORS_PER_TRACK as usize * TRD_SECTOR_SIZE;
    let expected = tracks * track_bytes;
    if len < expected {
        return Err(GeometryError::TruncatedBuffer {
            expected,
            actual: len,
        });
    }
    if len > expected {
        return Err(GeometryError::unsupported(format!(
            "{} bytes for a {} track TR-DOS disk",
            len, tracks
        )));
    }
    Ok(Geometry {
        first_track: 0,
        tracks: (0..tracks)
            .map(|track| TrackLayout {
                sectors: TRD_SECTORS_PER_TRACK,
                data_offset: track * track_bytes,
                sector_ids: (1..=TRD_SECTORS_PER_TRACK).collect(),
            })
            .collect(),
        sector_size: TRD_SECTOR_SIZE,
        total_capacity: expected,
        image_len: expected,
        checks: SectorChecks::None,
    })
}

fn resolve_trd_by_length(len: usize) -> Result<Geometry, GeometryError> {
    let track_bytes = TRD_SECTORS_PER_TRACK as usize * TRD_SECTOR_SIZE;
    match len / track_bytes {
        _ if len % track_bytes != 0 => Err(GeometryError::unsupported(format!(
            "{} bytes is not a whole number of TR-DOS tracks",
            len
        ))),
        160 => resolve_trd(TrdDiskType::DoubleSided80, len),
        40 => resolve_trd(TrdDiskType::SingleSided40, len),
        80 => Err(GeometryError::unsupported(
            "80 logical tracks is ambiguous without the disk type byte",
        )),
        tracks if tracks < 40 => Err(GeometryError::TruncatedBuffer {
            expected: 40 * track_bytes,
            actual: len,
        }),
        tracks => Err(GeometryError::unsupported(format!("{} TR-DOS tracks", tracks))),
    }
}

fn resolve_dsk(layout: &DskLayout, len: usize) -> Result<Geometry, GeometryError> {
    if len < layout.image_len {
        return Err(GeometryError::TruncatedBuffer {
            expected: layout.image_len,
            actual: len,
        });
    }
    if len > layout.image_len {
        log::warn!(
            "DSK image has {} trailing bytes after the last track",
            len - layout.image_len
        );
    }

    let mut sizes = layout
        .tracks
        .iter()
        .flat_map(|t| t.sectors.iter().map(|s| s.data_len));
    let sector_size = sizes.next().unwrap_or(0);
    if let Some(other) = sizes.find(|&size| size != sector_size) {
        return Err(GeometryError::unsupported(format!(
            "mixed sector sizes {} and {}",
            sector_size, other
        )));
    }

    let tracks: Vec<TrackLayout> = layout
        .tracks
        .iter()
        .map(|t| TrackLayout {
            sectors: t.sectors.len() as u8,
            data_offset: t.data_offset(),
            sector_ids: t.sectors.iter().map(|s| s.id).collect(),
        })
        .collect();
    let status = layout
        .tracks
        .iter()
        .map(|t| t.sectors.iter().map(|s| s.status).collect())
        .collect();
    let sector_count: usize = tracks.iter().map(|t| t.sectors as usize).sum();

    Ok(Geometry {
        first_track: 0,
        tracks,
        sector_size,
        total_capacity: sector_count * sector_size,
        image_len: layout.image_len,
        checks: SectorChecks::FdcStatus(status),
    })
}

fn resolve_tap(version: u8, data_len: usize, len: usize) -> Result<Geometry, GeometryError> {
    if version > 2 {
        return Err(GeometryError::unsupported(format!("TAP version {}", version)));
    }
    let expected = TAP_HEADER_SIZE + data_len;
    if len < expected {
        return Err(GeometryError::TruncatedBuffer {
            expected,
            actual: len,
        });
    }
    if len > expected {
        return Err(GeometryError::unsupported(format!(
            "TAP declares {} data bytes but holds {}",
            data_len,
            len - TAP_HEADER_SIZE
        )));
    }
    Ok(Geometry::linear(TAP_HEADER_SIZE, data_len, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d64() -> ContainerKind {
        ContainerKind::new(ContainerBase::D64)
    }

    #[test]
    fn test_d64_sizes_by_length() {
        for (len, tracks, table) in [
            (174_848, 35, false),
            (175_531, 35, true),
            (196_608, 40, false),
            (197_376, 40, true),
            (205_312, 42, false),
            (206_114, 42, true),
        ] {
            let geometry = resolve(&d64(), len).unwrap();
            assert_eq!(geometry.tracks.len(), tracks);
            assert_eq!(geometry.image_len, len);
            assert_eq!(
                matches!(geometry.checks, SectorChecks::ErrorTable { .. }),
                table
            );
        }
    }

    #[test]
    fn test_d64_track_table() {
        let geometry = resolve(&d64(), D64_SIZE_35).unwrap();
        assert_eq!(geometry.first_track, 1);
        assert_eq!(geometry.track(1).unwrap().sectors, 21);
        assert_eq!(geometry.track(18).unwrap().sectors, 19);
        assert_eq!(geometry.track(25).unwrap().sectors, 18);
        assert_eq!(geometry.track(35).unwrap().sectors, 17);
        assert_eq!(geometry.track(18).unwrap().data_offset, 0x16500);
        assert_eq!(geometry.sector_count(), 683);
        assert_eq!(geometry.total_capacity, D64_SIZE_35);
        assert!(geometry.track(0).is_none());
        assert!(geometry.track(36).is_none());
    }

    #[test]
    fn test_d64_truncated() {
        let result = resolve(&d64(), D64_SIZE_35 / 2);
        assert_eq!(
            result,
            Err(GeometryError::TruncatedBuffer {
                expected: D64_SIZE_35,
                actual: D64_SIZE_35 / 2
            })
        );
    }

    #[test]
    fn test_d64_unknown_length() {
        assert!(matches!(
            resolve(&d64(), D64_SIZE_35 + 1),
            Err(GeometryError::UnsupportedVariant(_))
        ));
    }

    #[test]
    fn test_d64_declared_variant_wins() {
        let kind = ContainerKind::d64(TrackCount::Tracks40);
        assert!(matches!(
            resolve(&kind, D64_SIZE_35),
            Err(GeometryError::TruncatedBuffer { expected: D64_SIZE_40, .. })
        ));
        assert_eq!(resolve(&kind, 197_376).unwrap().tracks.len(), 40);
    }

    #[test]
    fn test_trd_geometry() {
        let kind = ContainerKind::new(ContainerBase::Trd)
            .with_variant(VariantInfo::Trd(TrdDiskType::DoubleSided80));
        let geometry = resolve(&kind, 655_360).unwrap();
        assert_eq!(geometry.first_track, 0);
        assert_eq!(geometry.tracks.len(), 160);
        assert_eq!(geometry.total_capacity, 655_360);
        assert_eq!(geometry.tracks[0].sector_ids[0], 1);
        assert!(matches!(
            resolve(&kind, 327_680),
            Err(GeometryError::TruncatedBuffer { .. })
        ));
    }

    #[test]
    fn test_trd_by_length() {
        let kind = ContainerKind::new(ContainerBase::Trd);
        assert_eq!(resolve(&kind, 163_840).unwrap().tracks.len(), 40);
        assert!(matches!(
            resolve(&kind, 327_680),
            Err(GeometryError::UnsupportedVariant(_))
        ));
    }

    #[test]
    fn test_tap_length_must_match() {
        let kind = ContainerKind::new(ContainerBase::Tap).with_variant(VariantInfo::Tap {
            version: 1,
            data_len: 100,
        });
        let geometry = resolve(&kind, 120).unwrap();
        assert_eq!(geometry.tracks[0].data_offset, TAP_HEADER_SIZE);
        assert_eq!(geometry.sector_size, 100);
        assert_eq!(geometry.image_len, 120);
        assert!(matches!(
            resolve(&kind, 60),
            Err(GeometryError::TruncatedBuffer { expected: 120, .. })
        ));
        assert!(matches!(
            resolve(&kind, 121),
            Err(GeometryError::UnsupportedVariant(_))
        ));
    }

    #[test]
    fn test_t64_linear() {
        let kind = ContainerKind::new(ContainerBase::T64);
        let geometry = resolve(&kind, 1000).unwrap();
        assert_eq!(geometry.sector_count(), 1);
        assert_eq!(geometry.total_capacity, 1000);
        assert!(matches!(
            resolve(&kind, 10),
            Err(GeometryError::TruncatedBuffer { .. })
        ));
    }

    #[test]
    fn test_mismatched_variant() {
        let kind = ContainerKind::new(ContainerBase::Trd).with_variant(VariantInfo::D64 {
            tracks: TrackCount::Tracks35,
            error_table: false,
        });
        assert!(matches!(
            resolve(&kind, D64_SIZE_35),
            Err(GeometryError::UnsupportedVariant(_))
        ));
    }

    #[test]
    fn test_validate_detects_inconsistent_capacity() {
        let mut geometry = resolve(&d64(), D64_SIZE_35).unwrap();
        geometry.total_capacity -= 1;
        assert!(matches!(
            geometry.validate(),
            Err(GeometryError::Inconsistent(_))
        ));
    }
}
