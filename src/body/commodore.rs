/// Commodore file bodies

use crate::body::{CodeBlock, Cpu, FileBody};
use crate::error::DecodeError;
use crate::filesystem::cbm::CbmFileType;
use crate::filesystem::EntryParams;

/// Where BASIC V2 programs load on a C64
pub const BASIC_START: u16 = 0x0801;

/// Program file: load address followed by memory contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrgFile {
    /// Little-endian address from the first two bytes
    pub load_address: u16,
    /// Bytes after the load address
    pub data: Vec<u8>,
}

impl PrgFile {
    /// Loads where BASIC programs live
    pub fn is_basic(&self) -> bool {
        self.load_address == BASIC_START
    }

    /// View as 6502 machine code
    pub fn as_code(&self) -> CodeBlock {
        CodeBlock {
            cpu: Cpu::Mos6502,
            load_address: self.load_address,
            entry_address: None,
            data: self.data.clone(),
        }
    }
}

/// Relative (record-oriented) file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeFile {
    /// Bytes per record
    pub record_length: u8,
    /// Record data
    pub data: Vec<u8>,
}

impl RelativeFile {
    /// Iterate over whole records
    pub fn records(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks(self.record_length as usize)
    }
}

/// Decode a Commodore file body
///
/// `params.param2` carries the REL record length.
pub fn decode(tag: u8, params: EntryParams, payload: &[u8]) -> Result<FileBody, DecodeError> {
    match CbmFileType::from_tag(tag).ok_or(DecodeError::UnknownType(tag))? {
        CbmFileType::Prg => {
            DecodeError::require(payload, 2)?;
            Ok(FileBody::Prg(PrgFile {
                load_address: u16::from_le_bytes([payload[0], payload[1]]),
                data: payload[2..].to_vec(),
            }))
        }
        CbmFileType::Rel => {
            let record_length = params.param2;
            if record_length == 0 || record_length > 254 {
                return Err(DecodeError::invalid("record_length", record_length));
            }
            Ok(FileBody::Relative(RelativeFile {
                record_length: record_length as u8,
                data: payload.to_vec(),
            }))
        }
        CbmFileType::Del | CbmFileType::Seq | CbmFileType::Usr => {
            Ok(FileBody::Sequential(payload.to_vec()))
        }
    }
}
