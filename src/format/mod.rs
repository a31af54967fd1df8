/// Container kinds, variant probing and geometry resolution

/// Format constants
pub mod constants;
/// CPC DSK header parsing
pub mod dsk;
/// Geometry resolution
pub mod geometry;

pub use constants::*;
pub use dsk::{DskFormat, DskLayout, DskSectorInfo, DskTrackInfo};
pub use geometry::{resolve, Geometry, SectorChecks, TrackLayout};

use crate::error::GeometryError;
use std::fmt;
use std::str::FromStr;

/// Computer family an image belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Commodore 64 and relatives
    Commodore,
    /// Amstrad CPC
    Amstrad,
    /// Sinclair ZX Spectrum
    Sinclair,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Commodore => write!(f, "Commodore"),
            Platform::Amstrad => write!(f, "Amstrad"),
            Platform::Sinclair => write!(f, "Sinclair"),
        }
    }
}

/// Base container format, independent of revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerBase {
    /// Commodore tape archive
    T64,
    /// Commodore raw tape pulses
    Tap,
    /// Commodore 1541 disk
    D64,
    /// Sinclair TR-DOS disk
    Trd,
    /// Amstrad CPCEMU disk (standard or extended)
    Dsk,
}

impl ContainerBase {
    /// Platform this container belongs to
    pub fn platform(&self) -> Platform {
        match self {
            ContainerBase::T64 | ContainerBase::Tap | ContainerBase::D64 => Platform::Commodore,
            ContainerBase::Trd => Platform::Sinclair,
            ContainerBase::Dsk => Platform::Amstrad,
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            ContainerBase::T64 => "T64 tape archive",
            ContainerBase::Tap => "C64 raw tape",
            ContainerBase::D64 => "D64 disk",
            ContainerBase::Trd => "TR-DOS disk",
            ContainerBase::Dsk => "CPC DSK disk",
        }
    }

    /// Whether the container is a tape (linear geometry)
    pub fn is_tape(&self) -> bool {
        matches!(self, ContainerBase::T64 | ContainerBase::Tap)
    }
}

impl FromStr for ContainerBase {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('.').to_ascii_lowercase();
        match name.as_str() {
            "t64" => Ok(ContainerBase::T64),
            "tap" => Ok(ContainerBase::Tap),
            "d64" => Ok(ContainerBase::D64),
            "trd" => Ok(ContainerBase::Trd),
            "dsk" => Ok(ContainerBase::Dsk),
            _ => Err(GeometryError::UnknownContainerKind(s.to_string())),
        }
    }
}

/// Track count revisions of the D64 format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackCount {
    /// Standard 35 tracks
    Tracks35,
    /// Extended 40 tracks
    Tracks40,
    /// Extended 42 tracks
    Tracks42,
}

impl TrackCount {
    /// All known revisions, smallest first
    pub const ALL: [TrackCount; 3] = [TrackCount::Tracks35, TrackCount::Tracks40, TrackCount::Tracks42];

    /// Number of tracks
    pub fn tracks(&self) -> u8 {
        match self {
            TrackCount::Tracks35 => 35,
            TrackCount::Tracks40 => 40,
            TrackCount::Tracks42 => 42,
        }
    }

    /// Parse a track count
    pub fn from_tracks(tracks: u8) -> Option<Self> {
        match tracks {
            35 => Some(TrackCount::Tracks35),
            40 => Some(TrackCount::Tracks40),
            42 => Some(TrackCount::Tracks42),
            _ => None,
        }
    }
}

/// TR-DOS disk type byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrdDiskType {
    /// 0x16: 80 tracks, double sided
    DoubleSided80,
    /// 0x17: 40 tracks, double sided
    DoubleSided40,
    /// 0x18: 80 tracks, single sided
    SingleSided80,
    /// 0x19: 40 tracks, single sided
    SingleSided40,
}

impl TrdDiskType {
    /// Parse the disk type byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x16 => Some(TrdDiskType::DoubleSided80),
            0x17 => Some(TrdDiskType::DoubleSided40),
            0x18 => Some(TrdDiskType::SingleSided80),
            0x19 => Some(TrdDiskType::SingleSided40),
            _ => None,
        }
    }

    /// Disk type byte
    pub fn to_byte(&self) -> u8 {
        match self {
            TrdDiskType::DoubleSided80 => 0x16,
            TrdDiskType::DoubleSided40 => 0x17,
            TrdDiskType::SingleSided80 => 0x18,
            TrdDiskType::SingleSided40 => 0x19,
        }
    }

    /// Logical tracks (cylinders times sides)
    pub fn logical_tracks(&self) -> u8 {
        match self {
            TrdDiskType::DoubleSided80 => 160,
            TrdDiskType::DoubleSided40 | TrdDiskType::SingleSided80 => 80,
            TrdDiskType::SingleSided40 => 40,
        }
    }

    /// Number of sides
    pub fn sides(&self) -> u8 {
        match self {
            TrdDiskType::DoubleSided80 | TrdDiskType::DoubleSided40 => 2,
            TrdDiskType::SingleSided80 | TrdDiskType::SingleSided40 => 1,
        }
    }
}

/// Revision information that refines a container base
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantInfo {
    /// D64 track count, with or without a trailing error table
    D64 {
        /// Track count revision
        tracks: TrackCount,
        /// Error table present
        error_table: bool,
    },
    /// TAP header fields
    Tap {
        /// Format version (0, 1 or 2)
        version: u8,
        /// Declared pulse data length
        data_len: u32,
    },
    /// TR-DOS disk type
    Trd(TrdDiskType),
    /// Parsed DSK track layout
    Dsk(DskLayout),
}

/// Container selected by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerKind {
    /// Base format
    pub base: ContainerBase,
    /// Declared or probed revision
    pub variant: Option<VariantInfo>,
}

impl ContainerKind {
    /// Container with no declared variant
    pub fn new(base: ContainerBase) -> Self {
        Self {
            base,
            variant: None,
        }
    }

    /// Declare the variant explicitly
    pub fn with_variant(mut self, variant: VariantInfo) -> Self {
        self.variant = Some(variant);
        self
    }

    /// D64 with a declared track count
    pub fn d64(tracks: TrackCount) -> Self {
        Self::new(ContainerBase::D64).with_variant(VariantInfo::D64 {
            tracks,
            error_table: false,
        })
    }

    /// Select a container from a file name's extension
    pub fn from_extension(path: &str) -> Result<Self, GeometryError> {
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .ok_or_else(|| GeometryError::UnknownContainerKind(path.to_string()))?;
        Ok(Self::new(ext.parse()?))
    }

    /// Platform of the container
    pub fn platform(&self) -> Platform {
        self.base.platform()
    }
}

impl FromStr for ContainerKind {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.parse()?))
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base.name())?;
        match &self.variant {
            Some(VariantInfo::D64 { tracks, error_table }) => {
                write!(f, " ({} tracks", tracks.tracks())?;
                if *error_table {
                    write!(f, ", error table")?;
                }
                write!(f, ")")
            }
            Some(VariantInfo::Tap { version, .. }) => write!(f, " (version {})", version),
            Some(VariantInfo::Trd(disk_type)) => write!(
                f,
                " ({} tracks, {} sides)",
                disk_type.logical_tracks() / disk_type.sides(),
                disk_type.sides()
            ),
            Some(VariantInfo::Dsk(layout)) => write!(f, " ({})", layout.format.name()),
            None => Ok(()),
        }
    }
}

/// Read explicit header fields that select a variant
///
/// Returns `Ok(None)` for containers whose variant follows from the buffer
/// length alone (D64, T64).
pub fn probe(base: ContainerBase, raw: &[u8]) -> Result<Option<VariantInfo>, GeometryError> {
    match base {
        ContainerBase::D64 | ContainerBase::T64 => Ok(None),
        ContainerBase::Tap => {
            if raw.len() < TAP_HEADER_SIZE {
                return Err(GeometryError::TruncatedBuffer {
                    expected: TAP_HEADER_SIZE,
                    actual: raw.len(),
                });
            }
            let version = raw[0x0C];
            let data_len = u32::from_le_bytes([raw[0x10], raw[0x11], raw[0x12], raw[0x13]]);
            Ok(Some(VariantInfo::Tap { version, data_len }))
        }
        ContainerBase::Trd => {
            if raw.len() <= TRD_ID_OFFSET {
                return Err(GeometryError::TruncatedBuffer {
                    expected: TRD_ID_OFFSET + 1,
                    actual: raw.len(),
                });
            }
            let byte = raw[TRD_DISK_TYPE_OFFSET];
            TrdDiskType::from_byte(byte)
                .map(|disk_type| Some(VariantInfo::Trd(disk_type)))
                .ok_or_else(|| GeometryError::unsupported(format!("TR-DOS disk type 0x{:02X}", byte)))
        }
        ContainerBase::Dsk => Ok(Some(VariantInfo::Dsk(DskLayout::parse(raw)?))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_container_base() {
        assert_eq!("d64".parse::<ContainerBase>(), Ok(ContainerBase::D64));
        assert_eq!(".TRD".parse::<ContainerBase>(), Ok(ContainerBase::Trd));
        assert!(matches!(
            "adf".parse::<ContainerBase>(),
            Err(GeometryError::UnknownContainerKind(_))
        ));
    }

    #[test]
    fn test_from_extension() {
        let kind = ContainerKind::from_extension("games/elite.t64").unwrap();
        assert_eq!(kind.base, ContainerBase::T64);
        assert_eq!(kind.platform(), Platform::Commodore);
        assert!(ContainerKind::from_extension("README").is_err());
    }

    #[test]
    fn test_platforms() {
        assert_eq!(ContainerBase::Trd.platform(), Platform::Sinclair);
        assert_eq!(ContainerBase::Dsk.platform(), Platform::Amstrad);
        assert!(ContainerBase::Tap.is_tape());
        assert!(!ContainerBase::D64.is_tape());
    }

    #[test]
    fn test_trd_disk_types() {
        for byte in 0x16..=0x19 {
            let disk_type = TrdDiskType::from_byte(byte).unwrap();
            assert_eq!(disk_type.to_byte(), byte);
        }
        assert_eq!(TrdDiskType::from_byte(0x20), None);
        assert_eq!(TrdDiskType::DoubleSided80.logical_tracks(), 160);
    }

    #[test]
    fn test_probe_tap_header() {
        let mut raw = b"C64-TAPE-RAW".to_vec();
        raw.extend_from_slice(&[1, 0, 0, 0, 4, 0, 0, 0, 1, 2, 3, 4]);
        let variant = probe(ContainerBase::Tap, &raw).unwrap();
        assert_eq!(variant, Some(VariantInfo::Tap { version: 1, data_len: 4 }));
    }

    #[test]
    fn test_probe_trd_truncated() {
        let result = probe(ContainerBase::Trd, &[0u8; 100]);
        assert_eq!(
            result,
            Err(GeometryError::TruncatedBuffer {
                expected: TRD_ID_OFFSET + 1,
                actual: 100,
            })
        );
        assert!(probe(ContainerBase::Trd, &vec![0x19; TRD_ID_OFFSET + 1]).is_ok());
    }

    #[test]
    fn test_display_kind() {
        let kind = ContainerKind::d64(TrackCount::Tracks40);
        assert_eq!(kind.to_string(), "D64 disk (40 tracks)");
    }
}
