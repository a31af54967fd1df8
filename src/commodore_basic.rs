/// Commodore BASIC V2 detokenizer

use crate::body::{BasicLine, BasicListing};

/// Keywords for tokens 0x80..=0xCB
const KEYWORDS: [&str; 76] = [
    "END", "FOR", "NEXT", "DATA", "INPUT#", "INPUT", "DIM", "READ", "LET", "GOTO", "RUN", "IF",
    "RESTORE", "GOSUB", "RETURN", "REM", "STOP", "ON", "WAIT", "LOAD", "SAVE", "VERIFY", "DEF",
    "POKE", "PRINT#", "PRINT", "CONT", "LIST", "CLR", "CMD", "SYS", "OPEN", "CLOSE", "GET", "NEW",
    "TAB(", "TO", "FN", "SPC(", "THEN", "NOT", "STEP", "+", "-", "*", "/", "^", "AND", "OR", ">",
    "=", "<", "SGN", "INT", "ABS", "USR", "FRE", "POS", "SQR", "RND", "LOG", "EXP", "COS", "SIN",
    "TAN", "ATN", "PEEK", "LEN", "STR$", "VAL", "ASC", "CHR$", "LEFT$", "RIGHT$", "MID$", "GO",
];

const FIRST_TOKEN: u8 = 0x80;
const PI_TOKEN: u8 = 0xFF;

/// List a program stored after its load address
///
/// Lines are linked: a two-byte pointer to the next line (zero at the end of
/// the program), a little-endian line number, then tokens and PETSCII text up
/// to a `0x00` terminator.
pub fn listing(program: &[u8]) -> BasicListing {
    let mut lines = Vec::new();
    let mut pos = 0;

    while pos + 4 <= program.len() {
        let next = u16::from_le_bytes([program[pos], program[pos + 1]]);
        if next == 0 {
            break;
        }
        let number = u16::from_le_bytes([program[pos + 2], program[pos + 3]]);
        let body = &program[pos + 4..];
        let end = body.iter().position(|&b| b == 0);

        lines.push(BasicLine {
            number,
            text: detokenize_line(&body[..end.unwrap_or(body.len())]),
        });
        match end {
            Some(end) => pos += 4 + end + 1,
            None => {
                log::debug!("BASIC line {} has no terminator", number);
                break;
            }
        }
    }

    BasicListing { lines }
}

fn petscii(byte: u8, text: &mut String) {
    match byte {
        0x5C => text.push('£'),
        0x5E => text.push('↑'),
        0x5F => text.push('←'),
        0x20..=0x5D => text.push(byte as char),
        _ => text.push_str(&format!("{{${:02x}}}", byte)),
    }
}

fn detokenize_line(data: &[u8]) -> String {
    let mut text = String::new();
    let mut in_quotes = false;

    for &byte in data {
        match byte {
            b'"' => {
                in_quotes = !in_quotes;
                text.push('"');
            }
            _ if in_quotes => petscii(byte, &mut text),
            PI_TOKEN => text.push('π'),
            FIRST_TOKEN..=0xCB => text.push_str(KEYWORDS[(byte - FIRST_TOKEN) as usize]),
            _ => petscii(byte, &mut text),
        }
    }
    text
}
