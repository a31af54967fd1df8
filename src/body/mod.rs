/// Typed file bodies and per-platform decoders

/// AMSDOS header and Amstrad file types
pub mod amstrad;
/// Commodore file types
pub mod commodore;
/// Z80 disassembly of code blocks
pub mod disasm;
/// TR-DOS file types
pub mod sinclair;

pub use amstrad::{AmsdosHeader, AmstradProgram, TAG_HEADERLESS};
pub use commodore::{PrgFile, RelativeFile};
pub use disasm::DisassembledLine;
pub use sinclair::{DataArray, Indicator, ProgramListing, VariableName};

use crate::error::DecodeError;
use crate::filesystem::DirectoryEntry;
use crate::format::Platform;
use std::fmt;

/// Processor a code block targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cpu {
    /// Zilog Z80 (Spectrum, CPC)
    Z80,
    /// MOS 6502/6510 (Commodore)
    Mos6502,
}

/// Machine code with its load address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Target processor
    pub cpu: Cpu,
    /// Address the block loads to
    pub load_address: u16,
    /// Execution address, when the header records one
    pub entry_address: Option<u16>,
    /// Code bytes
    pub data: Vec<u8>,
}

impl CodeBlock {
    /// Disassemble the block, `None` for processors without a disassembler
    pub fn disassemble(&self) -> Option<Vec<DisassembledLine>> {
        match self.cpu {
            Cpu::Z80 => Some(disasm::disassemble_z80(&self.data, self.load_address)),
            Cpu::Mos6502 => None,
        }
    }
}

/// Decoded file contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileBody {
    /// Sinclair BASIC program
    Program(ProgramListing),
    /// Sinclair numeric array
    NumericArray(DataArray),
    /// Sinclair character array
    CharacterArray(DataArray),
    /// Machine code
    Code(CodeBlock),
    /// Commodore program file
    Prg(PrgFile),
    /// Commodore relative file
    Relative(RelativeFile),
    /// Amstrad BASIC program
    AmstradBasic(AmstradProgram),
    /// Untyped bytes
    Sequential(Vec<u8>),
}

impl FileBody {
    /// Short type name
    pub fn kind_name(&self) -> &'static str {
        match self {
            FileBody::Program(_) => "Program",
            FileBody::NumericArray(_) => "Number array",
            FileBody::CharacterArray(_) => "Character array",
            FileBody::Code(_) => "Code",
            FileBody::Prg(_) => "PRG",
            FileBody::Relative(_) => "REL",
            FileBody::AmstradBasic(_) => "BASIC",
            FileBody::Sequential(_) => "Sequential",
        }
    }

    /// File contents without container headers
    pub fn data(&self) -> &[u8] {
        match self {
            FileBody::Program(p) => &p.data,
            FileBody::NumericArray(a) | FileBody::CharacterArray(a) => &a.data,
            FileBody::Code(c) => &c.data,
            FileBody::Prg(p) => &p.data,
            FileBody::Relative(r) => &r.data,
            FileBody::AmstradBasic(p) => &p.data,
            FileBody::Sequential(data) => data,
        }
    }
}

/// Decode a payload according to its platform's type tags
pub fn decode(platform: Platform, entry: &DirectoryEntry, payload: &[u8]) -> Result<FileBody, DecodeError> {
    match platform {
        Platform::Sinclair => sinclair::decode(entry.type_tag, entry.params, payload),
        Platform::Commodore => commodore::decode(entry.type_tag, entry.params, payload),
        Platform::Amstrad => amstrad::decode(entry.type_tag, entry.params, payload),
    }
}

/// One line of a detokenized BASIC program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicLine {
    /// Line number
    pub number: u16,
    /// Detokenized text
    pub text: String,
}

/// Detokenized BASIC program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicListing {
    /// Lines in stored order
    pub lines: Vec<BasicLine>,
}

impl BasicListing {
    /// Number of the first line
    pub fn first_line(&self) -> Option<u16> {
        self.lines.first().map(|l| l.number)
    }
}

impl fmt::Display for BasicListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{} {}", line.number, line.text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_display() {
        let listing = BasicListing {
            lines: vec![
                BasicLine {
                    number: 10,
                    text: "PRINT \"HI\"".to_string(),
                },
                BasicLine {
                    number: 20,
                    text: "GOTO 10".to_string(),
                },
            ],
        };
        assert_eq!(listing.first_line(), Some(10));
        assert_eq!(listing.to_string(), "10 PRINT \"HI\"\n20 GOTO 10\n");
    }

    #[test]
    fn test_code_block_cpu() {
        let block = CodeBlock {
            cpu: Cpu::Mos6502,
            load_address: 0xC000,
            entry_address: None,
            data: vec![0x60],
        };
        assert!(block.disassemble().is_none());
        assert_eq!(FileBody::Code(block).kind_name(), "Code");
    }
}
