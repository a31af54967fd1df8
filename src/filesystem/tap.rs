/// Commodore raw tape (C64-TAPE-RAW) decoding

use crate::error::{CatalogError, DecodeError};
use crate::filesystem::{Catalog, CatalogReader, DirectoryEntry, EntryParams, FileLocation};
use crate::format::{Geometry, TAP_SIGNATURE};
use crate::image::{ChecksumPolicy, ReadOptions, TapTiming};

/// Header block types
const HEADER_RELOCATABLE: u8 = 1;
const HEADER_DATA_BLOCK: u8 = 2;
const HEADER_PROGRAM: u8 = 3;
const HEADER_SEQ: u8 = 4;
const HEADER_END_OF_TAPE: u8 = 5;

/// Type, start, end and 16 name bytes
const HEADER_MIN_LEN: usize = 21;

const COUNTDOWN_LEN: usize = 9;

/// Commodore type tags assigned to tape files
const TAG_SEQ: u8 = 1;
const TAG_PRG: u8 = 2;

/// Offset of the version byte in the file header
const VERSION_OFFSET: usize = 0x0C;

/// Format version recording every half-wave separately
const HALF_WAVE_VERSION: u8 = 2;

/// One pulse and where it starts in the pulse data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// Byte offset of the pulse in the pulse data
    pub offset: usize,
    /// Length in pulse units (8 clock cycles)
    pub length: u32,
}

/// Iterates pulse lengths out of TAP data
pub struct PulseIter<'a> {
    data: &'a [u8],
    pos: usize,
    version: u8,
}

impl<'a> PulseIter<'a> {
    /// Iterate pulses of a given format version
    pub fn new(data: &'a [u8], version: u8) -> Self {
        Self {
            data,
            pos: 0,
            version,
        }
    }
}

impl PulseIter<'_> {
    /// One stored length: a single byte, or zero plus a 24-bit cycle count
    fn stored_length(&mut self) -> Option<u32> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        if byte != 0 {
            return Some(byte as u32);
        }
        if self.version == 0 {
            // Version 0 overflow: longer than 255 units
            return Some(u32::MAX);
        }
        let cycles = self.data.get(self.pos..self.pos + 3)?;
        self.pos += 3;
        Some(u32::from_le_bytes([cycles[0], cycles[1], cycles[2], 0]) / 8)
    }
}

impl Iterator for PulseIter<'_> {
    type Item = Pulse;

    fn next(&mut self) -> Option<Pulse> {
        let offset = self.pos;
        let mut length = self.stored_length()?;
        // Version 2 stores half-waves; two make one pulse
        if self.version == HALF_WAVE_VERSION {
            length = length.saturating_add(self.stored_length()?);
        }
        Some(Pulse { offset, length })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PulseKind {
    Short,
    Medium,
    Long,
    Other,
}

fn classify(pulse: &Pulse, timing: &TapTiming) -> PulseKind {
    if pulse.length < timing.short_max {
        PulseKind::Short
    } else if pulse.length < timing.medium_max {
        PulseKind::Medium
    } else if pulse.length < timing.long_max {
        PulseKind::Long
    } else {
        PulseKind::Other
    }
}

/// Decode the 18 pulses after a byte marker; returns the byte and parity result
fn read_byte(kinds: &[PulseKind]) -> Option<(u8, bool)> {
    if kinds.len() < 18 {
        return None;
    }
    let mut value = 0u8;
    let mut bits = [0u8; 9];
    for (n, bit) in bits.iter_mut().enumerate() {
        *bit = match (kinds[n * 2], kinds[n * 2 + 1]) {
            (PulseKind::Short, PulseKind::Medium) => 0,
            (PulseKind::Medium, PulseKind::Short) => 1,
            _ => return None,
        };
    }
    for (n, bit) in bits[..8].iter().enumerate() {
        value |= bit << n;
    }
    let parity_ok = (value.count_ones() + bits[8] as u32) % 2 == 1;
    Some((value, parity_ok))
}

/// Byte run between a first byte marker and the end of the block
#[derive(Debug, Clone)]
struct RawBlock {
    pulse: usize,
    bytes: Vec<u8>,
    parity_errors: usize,
}

fn read_raw_blocks(pulses: &[Pulse], timing: &TapTiming) -> Vec<RawBlock> {
    let kinds: Vec<PulseKind> = pulses.iter().map(|p| classify(p, timing)).collect();
    let mut blocks = Vec::new();
    let mut current: Option<RawBlock> = None;
    let mut i = 0;

    while i + 1 < kinds.len() {
        match (kinds[i], kinds[i + 1]) {
            (PulseKind::Long, PulseKind::Medium) => {
                if let Some((byte, parity_ok)) = read_byte(&kinds[i + 2..]) {
                    let block = current.get_or_insert_with(|| RawBlock {
                        pulse: pulses[i].offset,
                        bytes: Vec::new(),
                        parity_errors: 0,
                    });
                    block.bytes.push(byte);
                    if !parity_ok {
                        block.parity_errors += 1;
                    }
                    i += 20;
                    continue;
                }
                blocks.extend(current.take());
                i += 1;
            }
            (PulseKind::Long, PulseKind::Short) => {
                blocks.extend(current.take());
                i += 2;
            }
            _ => {
                blocks.extend(current.take());
                i += 1;
            }
        }
    }
    blocks.extend(current.take());
    log::trace!("TAP: {} raw blocks from {} pulses", blocks.len(), pulses.len());
    blocks
}

/// A block with its countdown and checksum removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeBlock {
    /// Byte offset of the first pulse of the block
    pub pulse: usize,
    /// Second recording of the block
    pub repeat: bool,
    /// Payload bytes
    pub data: Vec<u8>,
    /// Checksum and parity both held
    pub valid: bool,
}

fn countdown(repeat: bool) -> [u8; COUNTDOWN_LEN] {
    let base = if repeat { 0x09 } else { 0x89 };
    std::array::from_fn(|i| base - i as u8)
}

fn parse_block(raw: RawBlock) -> Option<TapeBlock> {
    if raw.bytes.len() < COUNTDOWN_LEN + 1 {
        return None;
    }
    let repeat = if raw.bytes[..COUNTDOWN_LEN] == countdown(false) {
        false
    } else if raw.bytes[..COUNTDOWN_LEN] == countdown(true) {
        true
    } else {
        return None;
    };
    let (data, checksum) = raw.bytes[COUNTDOWN_LEN..].split_at(raw.bytes.len() - COUNTDOWN_LEN - 1);
    let xor = data.iter().fold(0u8, |acc, b| acc ^ b);
    Some(TapeBlock {
        pulse: raw.pulse,
        repeat,
        valid: xor == checksum[0] && raw.parity_errors == 0,
        data: data.to_vec(),
    })
}

/// Decode pulse data into logical blocks, merging each first copy with its repeat
///
/// `base` is added to every pulse offset so blocks decoded from a slice keep
/// offsets relative to the whole pulse stream.
pub fn decode_blocks(data: &[u8], version: u8, timing: &TapTiming, base: usize) -> Vec<TapeBlock> {
    let pulses: Vec<Pulse> = PulseIter::new(data, version)
        .map(|p| Pulse {
            offset: p.offset + base,
            length: p.length,
        })
        .collect();
    let copies: Vec<TapeBlock> = read_raw_blocks(&pulses, timing)
        .into_iter()
        .filter_map(parse_block)
        .collect();

    let mut logical = Vec::with_capacity(copies.len() / 2 + 1);
    let mut iter = copies.into_iter().peekable();
    while let Some(block) = iter.next() {
        if block.repeat {
            logical.push(block);
            continue;
        }
        match iter.next_if(|next| next.repeat) {
            Some(copy) if !block.valid && copy.valid => {
                log::warn!("TAP block at pulse {} is bad, using its repeat", block.pulse);
                logical.push(TapeBlock {
                    pulse: block.pulse,
                    ..copy
                });
            }
            _ => logical.push(block),
        }
    }
    logical
}

/// Commodore raw tape reader
///
/// Pulses are classified as short, medium or long and decoded the way the
/// kernal loader does: a byte starts with a long+medium marker, each bit is a
/// short+medium (0) or medium+short (1) pair, eight bits are followed by an
/// odd parity bit, and long+short ends a block. Every block is recorded
/// twice; the first copy opens with the countdown 0x89..0x81 and the repeat
/// with 0x09..0x01. A trailing byte holds the XOR of the block data.
/// Version 2 tapes store each half-wave separately.
#[derive(Debug, Clone, Copy, Default)]
pub struct TapReader;

fn pulse_data<'a>(raw: &'a [u8], geometry: &Geometry) -> &'a [u8] {
    let start = geometry.tracks[0].data_offset;
    raw.get(start..start + geometry.sector_size).unwrap_or(&[])
}

fn is_header(block: &TapeBlock) -> bool {
    block.data.len() >= HEADER_MIN_LEN
        && matches!(
            block.data[0],
            HEADER_RELOCATABLE | HEADER_PROGRAM | HEADER_SEQ | HEADER_END_OF_TAPE
        )
}

impl CatalogReader for TapReader {
    fn read_catalog(
        &self,
        raw: &[u8],
        geometry: &Geometry,
        options: &ReadOptions,
    ) -> Result<Catalog, CatalogError> {
        if !raw.starts_with(TAP_SIGNATURE) {
            return Err(CatalogError::header("missing C64-TAPE-RAW signature"));
        }
        let version = raw[VERSION_OFFSET];
        let blocks = decode_blocks(pulse_data(raw, geometry), version, &options.tap_timing, 0);
        let mut catalog = Catalog::default();
        let mut index = 0;
        let mut i = 0;

        while i < blocks.len() {
            let block = &blocks[i];
            if !is_header(block) {
                log::debug!("TAP: skipping headerless block at pulse {}", block.pulse);
                i += 1;
                continue;
            }
            if !block.valid {
                let reason = format!("tape header at pulse {} failed its checksum", block.pulse);
                match options.checksum_policy {
                    ChecksumPolicy::Fatal => return Err(CatalogError::UnreadableSector(reason)),
                    ChecksumPolicy::Advisory => catalog.problem(index, reason),
                }
                index += 1;
                i += 1;
                continue;
            }

            let header = &block.data;
            if header[0] == HEADER_END_OF_TAPE {
                log::debug!("TAP: end-of-tape marker at pulse {}", block.pulse);
                break;
            }

            let Some(data_block) = blocks.get(i + 1) else {
                catalog.problem(index, "header without a data block");
                break;
            };

            let start = u16::from_le_bytes([header[1], header[2]]);
            let end = u16::from_le_bytes([header[3], header[4]]);
            let (type_tag, declared_size, consumed) = if header[0] == HEADER_SEQ {
                let data_blocks = blocks[i + 1..]
                    .iter()
                    .take_while(|b| b.data.first() == Some(&HEADER_DATA_BLOCK))
                    .count();
                let size = blocks[i + 1..i + 1 + data_blocks]
                    .iter()
                    .map(|b| b.data.len() - 1)
                    .sum();
                (TAG_SEQ, size, 1 + data_blocks)
            } else {
                (TAG_PRG, end.saturating_sub(start) as usize, 2)
            };

            catalog.entries.push(DirectoryEntry {
                index,
                name: header[5..HEADER_MIN_LEN].to_vec(),
                type_tag,
                location: FileLocation::Tape {
                    pulse: data_block.pulse,
                },
                declared_size,
                params: EntryParams {
                    param1: start,
                    param2: end,
                },
            });
            index += 1;
            i += consumed;
        }

        log::debug!(
            "TAP: {} files in {} blocks",
            catalog.entries.len(),
            blocks.len()
        );
        Ok(catalog)
    }

    fn file_data(
        &self,
        raw: &[u8],
        geometry: &Geometry,
        entry: &DirectoryEntry,
        options: &ReadOptions,
    ) -> Result<Vec<u8>, DecodeError> {
        let pulse = match entry.location {
            FileLocation::Tape { pulse } => pulse,
            _ => return Err(DecodeError::unreadable("tape file without a pulse position")),
        };
        let data = pulse_data(raw, geometry);
        let tail = data
            .get(pulse..)
            .ok_or_else(|| DecodeError::unreadable(format!("pulse {} is past the tape end", pulse)))?;
        let version = raw.get(VERSION_OFFSET).copied().unwrap_or(0);
        let blocks = decode_blocks(tail, version, &options.tap_timing, pulse);

        let first = blocks
            .first()
            .filter(|b| b.pulse == pulse)
            .ok_or_else(|| DecodeError::unreadable(format!("no data block at pulse {}", pulse)))?;
        if !first.valid {
            log::warn!("TAP data block at pulse {} failed its checksum", pulse);
        }

        if entry.type_tag == TAG_SEQ {
            return Ok(blocks
                .iter()
                .take_while(|b| b.data.first() == Some(&HEADER_DATA_BLOCK))
                .flat_map(|b| b.data[1..].iter().copied())
                .collect());
        }

        let size = entry.declared_size;
        DecodeError::require(&first.data, size)?;
        let mut out = Vec::with_capacity(size + 2);
        out.extend_from_slice(&entry.params.param1.to_le_bytes());
        out.extend_from_slice(&first.data[..size]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{resolve, ContainerBase, ContainerKind, VariantInfo, TAP_HEADER_SIZE};

    const S: u8 = 0x30;
    const M: u8 = 0x42;
    const L: u8 = 0x56;

    fn encode_byte(out: &mut Vec<u8>, byte: u8) {
        out.extend_from_slice(&[L, M]);
        for n in 0..8 {
            if byte >> n & 1 == 1 {
                out.extend_from_slice(&[M, S]);
            } else {
                out.extend_from_slice(&[S, M]);
            }
        }
        if byte.count_ones() % 2 == 0 {
            out.extend_from_slice(&[M, S]);
        } else {
            out.extend_from_slice(&[S, M]);
        }
    }

    fn encode_block(out: &mut Vec<u8>, data: &[u8], repeat: bool, corrupt: bool) {
        out.extend(std::iter::repeat(S).take(32));
        for b in countdown(repeat) {
            encode_byte(out, b);
        }
        for &b in data {
            encode_byte(out, b);
        }
        let checksum = data.iter().fold(0u8, |acc, b| acc ^ b);
        encode_byte(out, if corrupt { !checksum } else { checksum });
        out.extend_from_slice(&[L, S]);
    }

    fn header(kind: u8, name: &[u8], start: u16, end: u16) -> Vec<u8> {
        let mut data = vec![kind];
        data.extend_from_slice(&start.to_le_bytes());
        data.extend_from_slice(&end.to_le_bytes());
        let mut padded = [0x20u8; 16];
        padded[..name.len()].copy_from_slice(name);
        data.extend_from_slice(&padded);
        data.resize(192, 0x20);
        data
    }

    fn tape(pulses: &[u8]) -> Vec<u8> {
        tape_version(pulses, 1)
    }

    fn tape_version(pulses: &[u8], version: u8) -> Vec<u8> {
        let mut raw = TAP_SIGNATURE.to_vec();
        raw.extend_from_slice(&[version, 0, 0, 0]);
        raw.extend_from_slice(&(pulses.len() as u32).to_le_bytes());
        raw.extend_from_slice(pulses);
        raw
    }

    fn program_pulses(corrupt_first_header: bool) -> Vec<u8> {
        let mut pulses = Vec::new();
        let hdr = header(HEADER_PROGRAM, b"HELLO", 0x0801, 0x0805);
        encode_block(&mut pulses, &hdr, false, corrupt_first_header);
        encode_block(&mut pulses, &hdr, true, false);
        encode_block(&mut pulses, &[1, 2, 3, 4], false, false);
        encode_block(&mut pulses, &[1, 2, 3, 4], true, false);
        pulses
    }

    fn program_tape(corrupt_first_header: bool) -> Vec<u8> {
        tape(&program_pulses(corrupt_first_header))
    }

    /// Split every pulse into two half-waves
    fn half_waves(pulses: &[u8]) -> Vec<u8> {
        pulses.iter().flat_map(|&p| [p / 2, p - p / 2]).collect()
    }

    fn geometry(raw: &[u8]) -> Geometry {
        let kind = ContainerKind::new(ContainerBase::Tap).with_variant(VariantInfo::Tap {
            version: raw[VERSION_OFFSET],
            data_len: (raw.len() - TAP_HEADER_SIZE) as u32,
        });
        resolve(&kind, raw.len()).unwrap()
    }

    #[test]
    fn test_pulse_iter_long_form() {
        let pulses: Vec<Pulse> = PulseIter::new(&[0x30, 0x00, 0x00, 0x08, 0x00, 0x42], 1).collect();
        assert_eq!(pulses.len(), 3);
        assert_eq!(pulses[1], Pulse { offset: 1, length: 0x100 });
        assert_eq!(pulses[2].offset, 5);
    }

    #[test]
    fn test_pulse_iter_half_waves() {
        let pulses: Vec<Pulse> =
            PulseIter::new(&[0x18, 0x18, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x04, 0x00, 0x21], 2).collect();
        assert_eq!(pulses.len(), 2);
        assert_eq!(pulses[0], Pulse { offset: 0, length: 0x30 });
        assert_eq!(pulses[1], Pulse { offset: 2, length: 0x100 });
    }

    #[test]
    fn test_read_half_wave_program() {
        let raw = tape_version(&half_waves(&program_pulses(false)), 2);
        let geometry = geometry(&raw);
        let options = ReadOptions::default();
        let catalog = TapReader.read_catalog(&raw, &geometry, &options).unwrap();
        assert_eq!(catalog.entries.len(), 1);
        assert_eq!(catalog.entries[0].display_name(), "HELLO");

        let data = TapReader
            .file_data(&raw, &geometry, &catalog.entries[0], &options)
            .unwrap();
        assert_eq!(data, vec![0x01, 0x08, 1, 2, 3, 4]);
    }

    #[test]
    fn test_read_byte_parity() {
        let mut pulses = Vec::new();
        encode_byte(&mut pulses, 0xA5);
        let timing = TapTiming::default();
        let kinds: Vec<PulseKind> = pulses
            .iter()
            .map(|&b| classify(&Pulse { offset: 0, length: b as u32 }, &timing))
            .collect();
        assert_eq!(read_byte(&kinds[2..]), Some((0xA5, true)));
    }

    #[test]
    fn test_read_program() {
        let raw = program_tape(false);
        let geometry = geometry(&raw);
        let catalog = TapReader
            .read_catalog(&raw, &geometry, &ReadOptions::default())
            .unwrap();
        assert_eq!(catalog.entries.len(), 1);
        let entry = &catalog.entries[0];
        assert_eq!(entry.display_name(), "HELLO");
        assert_eq!(entry.type_tag, TAG_PRG);
        assert_eq!(entry.declared_size, 4);

        let data = TapReader
            .file_data(&raw, &geometry, entry, &ReadOptions::default())
            .unwrap();
        assert_eq!(data, vec![0x01, 0x08, 1, 2, 3, 4]);
    }

    #[test]
    fn test_bad_first_copy_uses_repeat() {
        let raw = program_tape(true);
        let geometry = geometry(&raw);
        let catalog = TapReader
            .read_catalog(&raw, &geometry, &ReadOptions::default())
            .unwrap();
        assert_eq!(catalog.entries.len(), 1);
        assert!(catalog.problems.is_empty());
    }

    #[test]
    fn test_bad_header_policy() {
        let mut pulses = Vec::new();
        let hdr = header(HEADER_PROGRAM, b"BROKEN", 0x0801, 0x0802);
        encode_block(&mut pulses, &hdr, false, true);
        encode_block(&mut pulses, &[0], false, false);
        let raw = tape(&pulses);
        let geometry = geometry(&raw);

        let catalog = TapReader
            .read_catalog(&raw, &geometry, &ReadOptions::default())
            .unwrap();
        assert!(catalog.entries.is_empty());
        assert_eq!(catalog.problems.len(), 1);

        let fatal = ReadOptions::default().with_checksum_policy(ChecksumPolicy::Fatal);
        assert!(matches!(
            TapReader.read_catalog(&raw, &geometry, &fatal),
            Err(CatalogError::UnreadableSector(_))
        ));
    }

    #[test]
    fn test_missing_signature() {
        let mut raw = program_tape(false);
        raw[0] = b'X';
        let geometry = geometry(&raw);
        assert!(matches!(
            TapReader.read_catalog(&raw, &geometry, &ReadOptions::default()),
            Err(CatalogError::InvalidHeader(_))
        ));
    }
}
