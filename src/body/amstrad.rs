/// AMSDOS headers and Amstrad file bodies

use crate::body::{CodeBlock, Cpu, FileBody};
use crate::error::DecodeError;
use crate::filesystem::EntryParams;

/// Size of an AMSDOS header
pub const HEADER_SIZE: usize = 128;

/// Tag for files without a valid AMSDOS header
pub const TAG_HEADERLESS: u8 = 0xFF;

/// AMSDOS file types
pub const TYPE_BASIC: u8 = 0;
/// Protected BASIC
pub const TYPE_PROTECTED_BASIC: u8 = 1;
/// Binary
pub const TYPE_BINARY: u8 = 2;
/// Protected binary
pub const TYPE_PROTECTED_BINARY: u8 = 3;

/// Bytes covered by the checksum
const CHECKSUM_SPAN: usize = 67;

/// Parsed AMSDOS header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmsdosHeader {
    /// User number
    pub user: u8,
    /// Name and extension, space padded
    pub filename: [u8; 11],
    /// File type byte
    pub file_type: u8,
    /// Load address
    pub load_address: u16,
    /// Execution address
    pub entry_address: u16,
    /// Length from the 24-bit field
    pub file_length: usize,
    /// Stored checksum
    pub checksum: u16,
}

impl AmsdosHeader {
    /// Sum of bytes 0..=66
    pub fn compute_checksum(data: &[u8]) -> u16 {
        data[..CHECKSUM_SPAN]
            .iter()
            .fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
    }

    /// Parse a header, `None` unless the checksum holds
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE {
            return None;
        }
        let checksum = u16::from_le_bytes([data[67], data[68]]);
        // An all-zero block would pass the sum trivially
        if data[..CHECKSUM_SPAN].iter().all(|&b| b == 0) || Self::compute_checksum(data) != checksum {
            return None;
        }
        let mut filename = [0u8; 11];
        filename.copy_from_slice(&data[1..12]);
        Some(Self {
            user: data[0],
            filename,
            file_type: data[18],
            load_address: u16::from_le_bytes([data[21], data[22]]),
            entry_address: u16::from_le_bytes([data[26], data[27]]),
            file_length: u32::from_le_bytes([data[64], data[65], data[66], 0]) as usize,
            checksum,
        })
    }

    /// Header words carried in a directory entry
    pub fn params(&self) -> EntryParams {
        EntryParams {
            param1: self.load_address,
            param2: self.entry_address,
        }
    }
}

/// Locomotive BASIC program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmstradProgram {
    /// AMSDOS header
    pub header: AmsdosHeader,
    /// Tokenized program
    pub data: Vec<u8>,
    /// Saved with `SAVE "name",P`
    pub protected: bool,
}

/// Decode an Amstrad file body
pub fn decode(tag: u8, _params: EntryParams, payload: &[u8]) -> Result<FileBody, DecodeError> {
    if tag == TAG_HEADERLESS {
        return Ok(FileBody::Sequential(payload.to_vec()));
    }
    if !matches!(
        tag,
        TYPE_BASIC | TYPE_PROTECTED_BASIC | TYPE_BINARY | TYPE_PROTECTED_BINARY
    ) {
        return Err(DecodeError::UnknownType(tag));
    }

    DecodeError::require(payload, HEADER_SIZE)?;
    let header = AmsdosHeader::parse(payload).ok_or_else(|| {
        DecodeError::invalid("amsdos_checksum", u16::from_le_bytes([payload[67], payload[68]]))
    })?;
    let end = HEADER_SIZE + header.file_length;
    DecodeError::require(payload, end)?;
    let data = payload[HEADER_SIZE..end].to_vec();

    Ok(match tag {
        TYPE_BASIC | TYPE_PROTECTED_BASIC => FileBody::AmstradBasic(AmstradProgram {
            header,
            data,
            protected: tag == TYPE_PROTECTED_BASIC,
        }),
        _ => FileBody::Code(CodeBlock {
            cpu: Cpu::Z80,
            load_address: header.load_address,
            entry_address: Some(header.entry_address),
            data,
        }),
    })
}
