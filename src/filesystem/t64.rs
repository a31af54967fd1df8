/// Commodore T64 tape archive directory

use crate::error::{CatalogError, DecodeError};
use crate::filesystem::{Catalog, CatalogReader, DirectoryEntry, EntryParams, FileLocation};
use crate::format::{Geometry, T64_HEADER_SIZE, T64_RECORD_SIZE};
use crate::image::ReadOptions;

/// Signature every T64 header starts with
const SIGNATURE: &[u8] = b"C64";

const MAX_ENTRIES_OFFSET: usize = 0x22;
const USED_ENTRIES_OFFSET: usize = 0x24;
const TAPE_NAME_OFFSET: usize = 0x28;

/// Entry type of a normal tape file
const ENTRY_NORMAL: u8 = 1;
/// Entry type of a memory snapshot
const ENTRY_SNAPSHOT: u8 = 3;

/// Commodore PRG type tag
const TAG_PRG: u8 = 2;

/// T64 directory reader
#[derive(Debug, Clone, Copy, Default)]
pub struct T64Reader;

fn read_u16(raw: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([raw[offset], raw[offset + 1]])
}

impl CatalogReader for T64Reader {
    fn read_catalog(
        &self,
        raw: &[u8],
        _geometry: &Geometry,
        _options: &ReadOptions,
    ) -> Result<Catalog, CatalogError> {
        if raw.len() < T64_HEADER_SIZE || !raw.starts_with(SIGNATURE) {
            return Err(CatalogError::header("missing C64 tape signature"));
        }

        let max_entries = read_u16(raw, MAX_ENTRIES_OFFSET) as usize;
        let used_entries = read_u16(raw, USED_ENTRIES_OFFSET) as usize;
        // Some writers leave the table size at zero
        let slots = if max_entries == 0 {
            log::warn!("T64 header declares no directory slots, using {}", used_entries);
            used_entries
        } else {
            max_entries
        };

        let needed = T64_HEADER_SIZE + slots * T64_RECORD_SIZE;
        if needed > raw.len() {
            return Err(CatalogError::TableOverrun {
                needed,
                available: raw.len(),
            });
        }

        let mut catalog = Catalog {
            label: Some(raw[TAPE_NAME_OFFSET..T64_HEADER_SIZE].to_vec()),
            ..Catalog::default()
        };

        for index in 0..slots {
            let record = &raw[T64_HEADER_SIZE + index * T64_RECORD_SIZE..][..T64_RECORD_SIZE];
            let entry_type = record[0];
            if entry_type == 0 {
                catalog.skipped += 1;
                continue;
            }
            if entry_type != ENTRY_NORMAL && entry_type != ENTRY_SNAPSHOT {
                catalog.problem(index, format!("unsupported entry type {}", entry_type));
                continue;
            }

            let start = read_u16(record, 2);
            let end = read_u16(record, 4);
            let offset = u32::from_le_bytes([record[8], record[9], record[10], record[11]]) as usize;
            // Emulator-made archives often store 0x00 or 0x01 instead of a CBM type
            let type_tag = match record[1] & 0x07 {
                0 | 1 if record[1] & 0x80 == 0 => TAG_PRG,
                tag => tag,
            };

            catalog.entries.push(DirectoryEntry {
                index,
                name: record[0x10..0x20].to_vec(),
                type_tag,
                location: FileLocation::Offset { offset },
                declared_size: end.saturating_sub(start) as usize,
                params: EntryParams {
                    param1: start,
                    param2: end,
                },
            });
        }

        if catalog.entries.len() != used_entries {
            log::warn!(
                "T64 header claims {} used entries, found {}",
                used_entries,
                catalog.entries.len()
            );
        }
        log::debug!("T64 directory: {} entries", catalog.entries.len());
        Ok(catalog)
    }

    fn file_data(
        &self,
        raw: &[u8],
        _geometry: &Geometry,
        entry: &DirectoryEntry,
        _options: &ReadOptions,
    ) -> Result<Vec<u8>, DecodeError> {
        let offset = match entry.location {
            FileLocation::Offset { offset } => offset,
            _ => return Err(DecodeError::unreadable("T64 file without a data offset")),
        };
        let end = offset + entry.declared_size;
        if end > raw.len() {
            return Err(DecodeError::Truncated {
                needed: end,
                available: raw.len(),
            });
        }

        // Archives store bare memory; put the load address back in front
        let mut data = Vec::with_capacity(entry.declared_size + 2);
        if entry.type_tag == TAG_PRG {
            data.extend_from_slice(&entry.params.param1.to_le_bytes());
        }
        data.extend_from_slice(&raw[offset..end]);
        Ok(data)
    }
}
