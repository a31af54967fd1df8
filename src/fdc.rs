/// uPD765 status registers recorded per sector in DSK images

use std::fmt;

/// FDC Status Register 1 (ST1)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FdcStatus1(pub u8);

impl FdcStatus1 {
    /// End of Cylinder (EN) - Bit 7
    pub const EN: u8 = 0x80;

    /// Data Error (DE) - Bit 5
    /// CRC error in the ID or data field
    pub const DE: u8 = 0x20;

    /// No Data (ND) - Bit 2
    pub const ND: u8 = 0x04;

    /// Missing Address Mark (MA) - Bit 0
    pub const MA: u8 = 0x01;

    /// Check if data error bit is set
    #[inline]
    pub fn data_error(&self) -> bool {
        (self.0 & Self::DE) != 0
    }

    /// Check if no data bit is set
    #[inline]
    pub fn no_data(&self) -> bool {
        (self.0 & Self::ND) != 0
    }

    /// Check if missing address mark bit is set
    #[inline]
    pub fn missing_address_mark(&self) -> bool {
        (self.0 & Self::MA) != 0
    }

    /// Bits that make the sector contents untrustworthy
    #[inline]
    pub fn is_bad(&self) -> bool {
        self.0 & (Self::DE | Self::ND | Self::MA) != 0
    }
}

/// FDC Status Register 2 (ST2)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FdcStatus2(pub u8);

impl FdcStatus2 {
    /// Control Mark (CM) - Bit 6
    /// Deleted data address mark
    pub const CM: u8 = 0x40;

    /// Data Error in Data Field (DD) - Bit 5
    pub const DD: u8 = 0x20;

    /// Missing Address Mark in Data Field (MD) - Bit 0
    pub const MD: u8 = 0x01;

    /// Check if control mark (deleted data) bit is set
    #[inline]
    pub fn is_deleted(&self) -> bool {
        (self.0 & Self::CM) != 0
    }

    /// Check if data field CRC error bit is set
    #[inline]
    pub fn data_field_error(&self) -> bool {
        (self.0 & Self::DD) != 0
    }

    /// Check if missing data address mark bit is set
    #[inline]
    pub fn missing_data_mark(&self) -> bool {
        (self.0 & Self::MD) != 0
    }

    /// Bits that make the sector contents untrustworthy
    #[inline]
    pub fn is_bad(&self) -> bool {
        self.0 & (Self::DD | Self::MD) != 0
    }
}

/// Combined status captured for one sector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SectorStatus {
    /// ST1 as stored in the sector info block
    pub st1: FdcStatus1,
    /// ST2 as stored in the sector info block
    pub st2: FdcStatus2,
}

impl SectorStatus {
    /// Build from the two raw register bytes
    pub fn new(st1: u8, st2: u8) -> Self {
        Self {
            st1: FdcStatus1(st1),
            st2: FdcStatus2(st2),
        }
    }

    /// Sector read back without data or address mark errors
    pub fn is_readable(&self) -> bool {
        !self.st1.is_bad() && !self.st2.is_bad()
    }
}

impl fmt::Display for SectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.st1.data_error() {
            flags.push("DE");
        }
        if self.st1.no_data() {
            flags.push("ND");
        }
        if self.st1.missing_address_mark() {
            flags.push("MA");
        }
        if self.st2.is_deleted() {
            flags.push("CM");
        }
        if self.st2.data_field_error() {
            flags.push("DD");
        }
        if self.st2.missing_data_mark() {
            flags.push("MD");
        }
        if flags.is_empty() {
            write!(f, "OK")
        } else {
            write!(f, "{}", flags.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_status() {
        let status = SectorStatus::new(0, 0);
        assert!(status.is_readable());
        assert_eq!(status.to_string(), "OK");
    }

    #[test]
    fn test_crc_error() {
        let status = SectorStatus::new(FdcStatus1::DE, FdcStatus2::DD);
        assert!(!status.is_readable());
        assert_eq!(status.to_string(), "DE|DD");
    }

    #[test]
    fn test_deleted_data_is_readable() {
        let status = SectorStatus::new(0, FdcStatus2::CM);
        assert!(status.st2.is_deleted());
        assert!(status.is_readable());
    }

    #[test]
    fn test_end_of_cylinder_alone_is_readable() {
        assert!(SectorStatus::new(FdcStatus1::EN, 0).is_readable());
        assert!(!SectorStatus::new(FdcStatus1::MA, 0).is_readable());
    }
}
