/// Sinclair BASIC detokenizer (ZX Spectrum 48K and 128K)

use crate::body::sinclair::MAX_LINE_NUMBER;
use crate::body::{BasicLine, BasicListing};

/// Which ROM's keyword set to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SinclairBasicMode {
    /// 48K ROM: 0xA3 and 0xA4 are user-defined graphics
    Mode48K,
    /// 128K ROM: 0xA3 is SPECTRUM and 0xA4 is PLAY
    #[default]
    Mode128K,
}

const END_OF_LINE: u8 = 0x0D;
const NUMBER_MARKER: u8 = 0x0E;
const HIDDEN_NUMBER_LEN: usize = 5;

/// Keywords for tokens 0xA5..=0xFF
const KEYWORDS: [&str; 91] = [
    "RND", "INKEY$", "PI", "FN", "POINT", "SCREEN$", "ATTR", "AT", "TAB", "VAL$", "CODE", "VAL",
    "LEN", "SIN", "COS", "TAN", "ASN", "ACS", "ATN", "LN", "EXP", "INT", "SQR", "SGN", "ABS",
    "PEEK", "IN", "USR", "STR$", "CHR$", "NOT", "BIN", "OR", "AND", "<=", ">=", "<>", "LINE",
    "THEN", "TO", "STEP", "DEF FN", "CAT", "FORMAT", "MOVE", "ERASE", "OPEN #", "CLOSE #",
    "MERGE", "VERIFY", "BEEP", "CIRCLE", "INK", "PAPER", "FLASH", "BRIGHT", "INVERSE", "OVER",
    "OUT", "LPRINT", "LLIST", "STOP", "READ", "DATA", "RESTORE", "NEW", "BORDER", "CONTINUE",
    "DIM", "REM", "FOR", "GO TO", "GO SUB", "INPUT", "LOAD", "LIST", "LET", "PAUSE", "NEXT",
    "POKE", "PRINT", "PLOT", "RUN", "SAVE", "RANDOMIZE", "IF", "CLS", "DRAW", "CLEAR", "RETURN",
    "COPY",
];

/// Block graphics 0x80..=0x8F as Unicode quadrants
const BLOCK_GRAPHICS: [char; 16] = [
    ' ', '▝', '▘', '▀', '▗', '▐', '▚', '▜', '▖', '▞', '▌', '▛', '▄', '▟', '▙', '█',
];

/// List a program using the 128K keyword set
///
/// A program is a run of lines, each stored as:
///
/// | Bytes | Contents                         |
/// |-------|----------------------------------|
/// | 2     | line number, big-endian          |
/// | 2     | length of the rest, little-endian|
/// | n     | tokens and text ending in `0x0D` |
///
/// Numeric literals appear twice: as typed digits and as a hidden five-byte
/// value after a `0x0E` marker. Only the typed digits are listed.
pub fn listing(program: &[u8]) -> BasicListing {
    listing_with_mode(program, SinclairBasicMode::default())
}

/// List a program
///
/// Stops at the end of the data, at a line number above 9999 (the start of
/// the variables area) or at a line whose length runs past the data.
pub fn listing_with_mode(program: &[u8], mode: SinclairBasicMode) -> BasicListing {
    let mut lines = Vec::new();
    let mut pos = 0;

    while pos + 4 <= program.len() {
        let number = u16::from_be_bytes([program[pos], program[pos + 1]]);
        if number > MAX_LINE_NUMBER {
            break;
        }
        let length = u16::from_le_bytes([program[pos + 2], program[pos + 3]]) as usize;
        let start = pos + 4;
        let end = start + length;
        let truncated = end > program.len();

        lines.push(BasicLine {
            number,
            text: detokenize_line(&program[start..end.min(program.len())], mode),
        });
        if truncated {
            log::debug!("BASIC line {} runs past the end of the program", number);
            break;
        }
        pos = end;
    }

    BasicListing { lines }
}

fn push_keyword(text: &mut String, keyword: &str) {
    if !text.is_empty() && !text.ends_with(' ') {
        text.push(' ');
    }
    text.push_str(keyword);
    text.push(' ');
}

fn detokenize_line(data: &[u8], mode: SinclairBasicMode) -> String {
    let mut text = String::new();
    let mut pos = 0;
    let mut in_quotes = false;

    while pos < data.len() {
        let byte = data[pos];
        pos += 1;
        match byte {
            END_OF_LINE => break,
            NUMBER_MARKER => pos += HIDDEN_NUMBER_LEN,
            // INK..OVER take one parameter byte, AT and TAB take two
            0x10..=0x15 => pos += 1,
            0x16 | 0x17 => pos += 2,
            b'"' => {
                in_quotes = !in_quotes;
                text.push('"');
            }
            0x60 => text.push('£'),
            0x5E => text.push('↑'),
            0x7F => text.push('©'),
            0x20..=0x7E => text.push(byte as char),
            0x80..=0x8F => text.push(BLOCK_GRAPHICS[(byte - 0x80) as usize]),
            0xA3 if mode == SinclairBasicMode::Mode128K => push_keyword(&mut text, "SPECTRUM"),
            0xA4 if mode == SinclairBasicMode::Mode128K => push_keyword(&mut text, "PLAY"),
            0x90..=0xA4 => {
                text.push_str("UDG-");
                text.push((b'A' + byte - 0x90) as char);
            }
            0xA5..=0xFF => push_keyword(&mut text, KEYWORDS[(byte - 0xA5) as usize]),
            _ => text.push('?'),
        }
    }

    if in_quotes {
        text
    } else {
        text.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(number: u16, body: &[u8]) -> Vec<u8> {
        let mut data = number.to_be_bytes().to_vec();
        data.extend_from_slice(&((body.len() + 1) as u16).to_le_bytes());
        data.extend_from_slice(body);
        data.push(END_OF_LINE);
        data
    }

    #[test]
    fn test_print_and_goto() {
        let mut program = line(10, b"\xF5\"HELLO\"");
        program.extend(line(20, b"\xEC10\x0E\x00\x00\x0A\x00\x00"));
        let listing = listing(&program);
        assert_eq!(listing.first_line(), Some(10));
        assert_eq!(listing.to_string(), "10 PRINT \"HELLO\"\n20 GO TO 10\n");
    }

    #[test]
    fn test_keyword_spacing() {
        let program = line(5, b"\xFAA\xC9B\xCB\xF7");
        assert_eq!(listing(&program).lines[0].text, "IF A <> B THEN RUN");
    }

    #[test]
    fn test_mode_specific_tokens() {
        let program = line(1, b"\xA4\"a\"");
        assert_eq!(listing(&program).lines[0].text, "PLAY \"a\"");
        let listing48 = listing_with_mode(&program, SinclairBasicMode::Mode48K);
        assert_eq!(listing48.lines[0].text, "UDG-U\"a\"");
    }

    #[test]
    fn test_colour_controls_are_skipped() {
        let program = line(1, b"\xF5\x10\x02\"X\"");
        assert_eq!(listing(&program).lines[0].text, "PRINT \"X\"");
    }

    #[test]
    fn test_stops_at_variables() {
        let mut program = line(10, b"\xFB");
        program.extend_from_slice(&[0x61, 0, 0, 0, 5, 0]);
        let listing = listing(&program);
        assert_eq!(listing.lines.len(), 1);
    }

    #[test]
    fn test_truncated_line() {
        let mut program = line(10, b"\xEA hello world");
        program.truncate(9);
        let listing = listing(&program);
        assert_eq!(listing.lines.len(), 1);
        assert_eq!(listing.lines[0].text, "REM  hel");
    }

    #[test]
    fn test_empty_program() {
        assert!(listing(&[]).lines.is_empty());
    }
}
