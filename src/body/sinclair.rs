/// TR-DOS file bodies: BASIC programs, arrays, code and streams

use crate::body::{CodeBlock, Cpu, FileBody};
use crate::error::DecodeError;
use crate::filesystem::trdos::{TYPE_BASIC, TYPE_CODE, TYPE_DATA, TYPE_STREAM};
use crate::filesystem::EntryParams;

/// Bytes TR-DOS writes after a program or array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator;

impl Indicator {
    /// The only accepted pair
    pub const BYTES: [u8; 2] = [0x80, 0xAA];

    /// Read and check the pair at the start of `bytes`
    pub fn read(bytes: &[u8]) -> Result<[u8; 2], DecodeError> {
        DecodeError::require(bytes, 2)?;
        let pair = [bytes[0], bytes[1]];
        if pair != Self::BYTES {
            return Err(DecodeError::invalid("indicator", u16::from_be_bytes(pair)));
        }
        Ok(pair)
    }
}

/// Highest line number Sinclair BASIC accepts
pub const MAX_LINE_NUMBER: u16 = 9999;

/// Autostart words with bit 15 set mean "no autostart"
const NO_AUTOSTART: u16 = 0x8000;

/// Array variable name packed into one byte
///
/// Bits 0-5 hold the letter (1 = `a` .. 26 = `z`), bit 6 marks a character
/// array. Bit 7 is set in stored names and ignored when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableName {
    /// Lower-case letter
    pub letter: char,
    /// Character array rather than numeric
    pub character: bool,
}

impl VariableName {
    const LETTER_MASK: u8 = 0x3F;
    const CHARACTER_FLAG: u8 = 0x40;
    const STORED_FLAG: u8 = 0x80;

    /// Unpack a stored name byte
    pub fn decode(byte: u8) -> Result<Self, DecodeError> {
        let code = byte & Self::LETTER_MASK;
        if !(1..=26).contains(&code) {
            return Err(DecodeError::invalid("variable_name", byte));
        }
        Ok(Self {
            letter: (b'a' + code - 1) as char,
            character: byte & Self::CHARACTER_FLAG != 0,
        })
    }

    /// Pack into a stored name byte
    pub fn encode(&self) -> Result<u8, DecodeError> {
        let letter = self.letter.to_ascii_lowercase();
        if !letter.is_ascii_lowercase() {
            return Err(DecodeError::invalid("variable_name", self.letter as u32));
        }
        let code = letter as u8 - b'a' + 1;
        let flag = if self.character { Self::CHARACTER_FLAG } else { 0 };
        Ok(Self::STORED_FLAG | flag | code)
    }
}

/// Sinclair BASIC program with its variables area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramListing {
    /// Program followed by variables
    pub data: Vec<u8>,
    /// Trailing indicator bytes
    pub indicator: [u8; 2],
    /// Line to run after loading
    pub autostart_line: Option<u16>,
    /// Where the variables area starts in `data`
    pub variables_offset: usize,
}

impl ProgramListing {
    /// Tokenized program lines
    pub fn program(&self) -> &[u8] {
        &self.data[..self.variables_offset]
    }

    /// Saved variables
    pub fn variables(&self) -> &[u8] {
        &self.data[self.variables_offset..]
    }
}

/// Saved array variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataArray {
    /// Array contents as stored
    pub data: Vec<u8>,
    /// Trailing indicator bytes
    pub indicator: [u8; 2],
    /// Low header byte, carried verbatim
    pub unused: u8,
    /// Variable the array was saved from
    pub variable_name: char,
}

/// Decode a TR-DOS file body
pub fn decode(tag: u8, params: EntryParams, payload: &[u8]) -> Result<FileBody, DecodeError> {
    match tag {
        TYPE_BASIC => decode_program(params, payload).map(FileBody::Program),
        TYPE_DATA => decode_array(params, payload),
        TYPE_CODE => {
            let length = params.param2 as usize;
            DecodeError::require(payload, length)?;
            Ok(FileBody::Code(CodeBlock {
                cpu: Cpu::Z80,
                load_address: params.param1,
                entry_address: None,
                data: payload[..length].to_vec(),
            }))
        }
        TYPE_STREAM => Ok(FileBody::Sequential(payload.to_vec())),
        other => Err(DecodeError::UnknownType(other)),
    }
}

fn decode_program(params: EntryParams, payload: &[u8]) -> Result<ProgramListing, DecodeError> {
    let total = params.param1 as usize;
    let program_len = params.param2 as usize;
    if program_len > total {
        return Err(DecodeError::invalid("program_length", params.param2));
    }
    DecodeError::require(payload, total + 4)?;

    let indicator = Indicator::read(&payload[total..])?;
    let autostart = u16::from_le_bytes([payload[total + 2], payload[total + 3]]);
    let autostart_line = match autostart {
        line if line >= NO_AUTOSTART => None,
        line if line <= MAX_LINE_NUMBER => Some(line),
        line => return Err(DecodeError::invalid("autostart_line", line)),
    };

    Ok(ProgramListing {
        data: payload[..total].to_vec(),
        indicator,
        autostart_line,
        variables_offset: program_len,
    })
}

fn decode_array(params: EntryParams, payload: &[u8]) -> Result<FileBody, DecodeError> {
    let [unused, name_byte] = params.param1.to_le_bytes();
    let name = VariableName::decode(name_byte)?;
    let length = params.param2 as usize;
    DecodeError::require(payload, length + 2)?;
    let indicator = Indicator::read(&payload[length..])?;

    let array = DataArray {
        data: payload[..length].to_vec(),
        indicator,
        unused,
        variable_name: name.letter,
    };
    Ok(if name.character {
        FileBody::CharacterArray(array)
    } else {
        FileBody::NumericArray(array)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_payload(body: &[u8], autostart: u16) -> Vec<u8> {
        let mut payload = body.to_vec();
        payload.extend_from_slice(&Indicator::BYTES);
        payload.extend_from_slice(&autostart.to_le_bytes());
        payload.resize(256, 0);
        payload
    }

    fn params(param1: u16, param2: u16) -> EntryParams {
        EntryParams { param1, param2 }
    }

    #[test]
    fn test_program_with_autostart() {
        let payload = program_payload(&[0, 10, 2, 0, 0xF5, 0x0D, 1, 2], 10);
        let body = decode(TYPE_BASIC, params(8, 6), &payload).unwrap();
        let FileBody::Program(listing) = body else {
            panic!("expected a program");
        };
        assert_eq!(listing.autostart_line, Some(10));
        assert_eq!(listing.indicator, [0x80, 0xAA]);
        assert_eq!(listing.program().len(), 6);
        assert_eq!(listing.variables(), &[1, 2]);
    }

    #[test]
    fn test_autostart_bounds() {
        let ok = program_payload(&[0; 4], 9999);
        assert!(decode(TYPE_BASIC, params(4, 4), &ok).is_ok());

        let none = program_payload(&[0; 4], 0x8000);
        let Ok(FileBody::Program(listing)) = decode(TYPE_BASIC, params(4, 4), &none) else {
            panic!("expected a program");
        };
        assert_eq!(listing.autostart_line, None);

        let bad = program_payload(&[0; 4], 10000);
        assert_eq!(
            decode(TYPE_BASIC, params(4, 4), &bad),
            Err(DecodeError::InvalidField {
                name: "autostart_line",
                value: 10000
            })
        );
    }

    #[test]
    fn test_bad_indicator() {
        let mut payload = program_payload(&[0; 4], 10);
        payload[4] = 0x81;
        assert_eq!(
            decode(TYPE_BASIC, params(4, 4), &payload),
            Err(DecodeError::InvalidField {
                name: "indicator",
                value: 0x81AA
            })
        );
    }

    #[test]
    fn test_program_truncated() {
        assert!(matches!(
            decode(TYPE_BASIC, params(300, 300), &[0u8; 256]),
            Err(DecodeError::Truncated { needed: 304, available: 256 })
        ));
    }

    #[test]
    fn test_variable_name_bits() {
        assert!(VariableName::decode(0x80).is_err());
        assert_eq!(VariableName::decode(0x81).unwrap().letter, 'a');
        assert_eq!(VariableName::decode(0x9A).unwrap().letter, 'z');
        assert!(VariableName::decode(0x9B).is_err());
        assert!(VariableName::decode(0xC3).unwrap().character);
        assert!(!VariableName::decode(0x83).unwrap().character);
    }

    #[test]
    fn test_variable_name_encode() {
        let name = VariableName {
            letter: 'q',
            character: true,
        };
        let byte = name.encode().unwrap();
        assert_eq!(byte, 0xD1);
        assert_eq!(VariableName::decode(byte).unwrap(), name);
        assert!(VariableName {
            letter: '1',
            character: false
        }
        .encode()
        .is_err());
    }

    #[test]
    fn test_arrays() {
        let mut payload = vec![1, 0, 5, 0, 0, 0, 0];
        payload.extend_from_slice(&Indicator::BYTES);
        let numeric = decode(TYPE_DATA, params(0x8107, 7), &payload).unwrap();
        let FileBody::NumericArray(array) = numeric else {
            panic!("expected a numeric array");
        };
        assert_eq!(array.variable_name, 'a');
        assert_eq!(array.unused, 0x07);

        let character = decode(TYPE_DATA, params(0xC200, 7), &payload).unwrap();
        assert!(matches!(character, FileBody::CharacterArray(DataArray { variable_name: 'b', .. })));

        assert!(matches!(
            decode(TYPE_DATA, params(0x8000, 7), &payload),
            Err(DecodeError::InvalidField { name: "variable_name", .. })
        ));
    }

    #[test]
    fn test_code_and_unknown() {
        let payload = vec![0xC9; 256];
        let FileBody::Code(code) = decode(TYPE_CODE, params(0x8000, 3), &payload).unwrap() else {
            panic!("expected code");
        };
        assert_eq!(code.load_address, 0x8000);
        assert_eq!(code.data, vec![0xC9; 3]);
        assert_eq!(decode(b'X', params(0, 0), &payload), Err(DecodeError::UnknownType(b'X')));
    }
}
