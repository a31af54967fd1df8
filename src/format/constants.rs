/// Container signatures, sizes and offsets

/// Standard DSK format signature
pub const STANDARD_DSK_SIGNATURE: &[u8] = b"MV - CPCEMU Disk-File\r\nDisk-Info\r\n";

/// Extended DSK format signature
pub const EXTENDED_DSK_SIGNATURE: &[u8] = b"EXTENDED CPC DSK File\r\nDisk-Info\r\n";

/// Track-Info block marker
pub const TRACK_INFO_MARKER: &[u8] = b"Track-Info";

/// Size of the DSK disk info block
pub const DISK_INFO_BLOCK_SIZE: usize = 256;

/// Size of a DSK track info block
pub const TRACK_INFO_BLOCK_SIZE: usize = 256;

/// Size of a DSK sector info entry
pub const SECTOR_INFO_SIZE: usize = 8;

/// Offset of the sector info list inside a track info block
pub const TRACK_INFO_SECTOR_LIST_OFFSET: usize = 0x18;

/// Offset of track count in disk info block
pub const DISK_INFO_TRACK_COUNT_OFFSET: usize = 0x30;

/// Offset of side count in disk info block
pub const DISK_INFO_SIDE_COUNT_OFFSET: usize = 0x31;

/// Offset of track size in disk info block (standard format)
pub const DISK_INFO_TRACK_SIZE_OFFSET: usize = 0x32;

/// Offset of extended track size table in disk info block (extended format)
pub const DISK_INFO_EXT_TRACK_SIZE_OFFSET: usize = 0x34;

/// Maximum number of tracks (all sides) the extended size table can describe
pub const MAX_DSK_TRACKS: usize = 204;

/// FDC sector size code to byte size mapping
pub const FDC_SECTOR_SIZES: [usize; 9] = [128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768];

/// Convert an FDC size code to a byte size, `None` for illegal codes
#[inline]
pub fn fdc_size_to_bytes(size_code: u8) -> Option<usize> {
    FDC_SECTOR_SIZES.get(size_code as usize).copied()
}

/// Commodore disk block size
pub const CBM_BLOCK_SIZE: usize = 256;

/// Plain D64 sizes by track count
pub const D64_SIZE_35: usize = 174_848;
/// 40 track D64 size
pub const D64_SIZE_40: usize = 196_608;
/// 42 track D64 size
pub const D64_SIZE_42: usize = 205_312;

/// T64 header size
pub const T64_HEADER_SIZE: usize = 64;

/// T64 directory record size
pub const T64_RECORD_SIZE: usize = 32;

/// TAP header size ("C64-TAPE-RAW", version, 3 reserved bytes, data length)
pub const TAP_HEADER_SIZE: usize = 20;

/// TAP signature
pub const TAP_SIGNATURE: &[u8] = b"C64-TAPE-RAW";

/// TR-DOS sector size
pub const TRD_SECTOR_SIZE: usize = 256;

/// TR-DOS sectors per logical track
pub const TRD_SECTORS_PER_TRACK: u8 = 16;

/// Offset of the disk type byte (track 0, sector 8, byte 0xE3)
pub const TRD_DISK_TYPE_OFFSET: usize = 8 * TRD_SECTOR_SIZE + 0xE3;

/// Offset of the TR-DOS identification byte (always 0x10)
pub const TRD_ID_OFFSET: usize = 8 * TRD_SECTOR_SIZE + 0xE7;

/// TR-DOS identification byte value
pub const TRD_ID: u8 = 0x10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fdc_size_to_bytes() {
        assert_eq!(fdc_size_to_bytes(0), Some(128));
        assert_eq!(fdc_size_to_bytes(2), Some(512));
        assert_eq!(fdc_size_to_bytes(8), Some(32768));
    }

    #[test]
    fn test_fdc_size_to_bytes_invalid() {
        assert_eq!(fdc_size_to_bytes(9), None);
        assert_eq!(fdc_size_to_bytes(255), None);
    }

    #[test]
    fn test_trd_info_offsets() {
        assert_eq!(TRD_DISK_TYPE_OFFSET, 0x8E3);
        assert_eq!(TRD_ID_OFFSET, 0x8E7);
    }
}
