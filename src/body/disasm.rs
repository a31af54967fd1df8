/// Z80 disassembly

use dez80::Instruction;
use std::fmt;

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassembledLine {
    /// Address of the first byte
    pub address: u16,
    /// Bytes the instruction occupies
    pub bytes: Vec<u8>,
    /// Mnemonic and operands
    pub text: String,
}

impl fmt::Display for DisassembledLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes: Vec<String> = self.bytes.iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "{:04X}  {:<12} {}", self.address, bytes.join(" "), self.text)
    }
}

/// Disassemble `data` as if loaded at `origin`
///
/// Bytes that do not start a valid instruction, including a truncated
/// instruction at the end, come out as `DB` lines.
pub fn disassemble_z80(data: &[u8], origin: u16) -> Vec<DisassembledLine> {
    let mut lines = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let address = origin.wrapping_add(pos as u16);
        let mut cursor: &[u8] = &data[pos..];
        let before = cursor.len();

        let consumed = match Instruction::decode_one(&mut cursor) {
            Ok(instruction) if before > cursor.len() => {
                let consumed = before - cursor.len();
                lines.push(DisassembledLine {
                    address,
                    bytes: data[pos..pos + consumed].to_vec(),
                    text: instruction.to_string(),
                });
                consumed
            }
            _ => {
                lines.push(DisassembledLine {
                    address,
                    bytes: vec![data[pos]],
                    text: format!("DB {:02X}h", data[pos]),
                });
                1
            }
        };
        pos += consumed;
    }

    lines
}
