/// Image facade over geometry, catalog and file bodies

/// Sector addressing and verification
pub mod address;
/// Read-time configuration
pub mod options;

pub use address::Location;
pub use options::{ChecksumPolicy, ReadOptions, TapTiming};

use crate::body::{self, BasicListing, Cpu, DisassembledLine, FileBody};
use crate::error::{DecodeError, GeometryError, ReadError, Result};
use crate::filesystem::{reader_for, Catalog, DirectoryEntry};
use crate::format::{
    probe, resolve, ContainerBase, ContainerKind, Geometry, Platform, SectorChecks, TrackCount,
    VariantInfo,
};
use crate::{commodore_basic, sinclair_basic};
use rayon::prelude::*;
use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};

/// Load progress of an [`Image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing read yet
    Unloaded,
    /// Track table verified
    GeometryResolved,
    /// Directory walked
    CatalogRead,
    /// Geometry, catalog and bodies available
    Ready,
    /// A load stage failed; the image stays unusable
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Unloaded => "unloaded",
            Stage::GeometryResolved => "geometry resolved",
            Stage::CatalogRead => "catalog read",
            Stage::Ready => "ready",
            Stage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Optional projections an image may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Detokenized BASIC listings
    BasicListing,
    /// Z80 disassembly of code files
    Disassembly,
    /// Per-sector D64 error codes
    ErrorTable,
    /// Disk or tape name
    DiskLabel,
}

/// A fully loaded container
#[derive(Debug)]
struct Loaded {
    raw: Vec<u8>,
    geometry: Geometry,
    catalog: Catalog,
    bodies: Option<Vec<std::result::Result<FileBody, DecodeError>>>,
}

#[derive(Debug)]
enum State {
    Unloaded,
    GeometryResolved,
    CatalogRead,
    Ready(Loaded),
    Failed(String),
}

/// Disk or tape image read through an explicit container kind
#[derive(Debug)]
pub struct Image {
    kind: ContainerKind,
    options: ReadOptions,
    state: State,
}

impl Image {
    /// Create an unloaded image
    pub fn new(kind: ContainerKind, options: ReadOptions) -> Self {
        Self {
            kind,
            options,
            state: State::Unloaded,
        }
    }

    /// Create and load an image from an in-memory buffer
    pub fn from_bytes(kind: ContainerKind, bytes: Vec<u8>, options: ReadOptions) -> Result<Self> {
        let mut image = Self::new(kind, options);
        image.load(bytes)?;
        Ok(image)
    }

    /// Drain `source` and run every load stage
    ///
    /// Only an unloaded image can be read. A failure leaves the image in
    /// [`Stage::Failed`].
    pub fn read<R: Read>(&mut self, mut source: R) -> Result<()> {
        if !matches!(self.state, State::Unloaded) {
            return Err(ReadError::AlreadyLoaded);
        }
        let mut raw = Vec::new();
        if let Err(e) = source.read_to_end(&mut raw) {
            return Err(self.fail(e.into()));
        }
        self.load(raw)
    }

    fn load(&mut self, raw: Vec<u8>) -> Result<()> {
        if !matches!(self.state, State::Unloaded) {
            return Err(ReadError::AlreadyLoaded);
        }
        log::debug!("Reading {} from {} bytes", self.kind.base.name(), raw.len());
        if let Err(e) = self.advance(raw) {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Step through the stages until ready
    fn advance(&mut self, raw: Vec<u8>) -> Result<()> {
        self.probe_variant(&raw)?;
        let geometry = resolve(&self.kind, raw.len())?;
        self.record_d64_variant(&geometry);
        self.enter(State::GeometryResolved);

        let catalog = reader_for(self.kind.base).read_catalog(&raw, &geometry, &self.options)?;
        log::debug!(
            "Catalog: {} entries, {} skipped, {} problems",
            catalog.entries.len(),
            catalog.skipped,
            catalog.problems.len()
        );
        self.enter(State::CatalogRead);

        let mut loaded = Loaded {
            raw,
            geometry,
            catalog,
            bodies: None,
        };
        if self.options.eager_bodies {
            let never = AtomicBool::new(false);
            loaded.bodies = Some(decode_entries(&self.kind, &self.options, &loaded, &never));
        }
        self.enter(State::Ready(loaded));
        Ok(())
    }

    fn enter(&mut self, state: State) {
        self.state = state;
        log::trace!("Image stage: {}", self.stage());
    }

    fn fail(&mut self, error: ReadError) -> ReadError {
        log::warn!("Failed to read {}: {}", self.kind.base.name(), error);
        self.state = State::Failed(error.to_string());
        error
    }

    /// Fill in a missing variant from header fields; a declared one wins
    fn probe_variant(&mut self, raw: &[u8]) -> std::result::Result<(), GeometryError> {
        if self.kind.variant.is_some() {
            return Ok(());
        }
        match probe(self.kind.base, raw) {
            Ok(variant) => self.kind.variant = variant,
            // Older TR-DOS images leave the type byte blank
            Err(GeometryError::UnsupportedVariant(reason)) if self.kind.base == ContainerBase::Trd => {
                log::warn!("{}, falling back to the image length", reason);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn record_d64_variant(&mut self, geometry: &Geometry) {
        if self.kind.base != ContainerBase::D64 || self.kind.variant.is_some() {
            return;
        }
        if let Some(tracks) = TrackCount::from_tracks(geometry.tracks.len() as u8) {
            self.kind.variant = Some(VariantInfo::D64 {
                tracks,
                error_table: matches!(geometry.checks, SectorChecks::ErrorTable { .. }),
            });
        }
    }

    /// Container kind, with any probed variant filled in
    pub fn kind(&self) -> &ContainerKind {
        &self.kind
    }

    /// Options the image was created with
    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Current load stage
    pub fn stage(&self) -> Stage {
        match self.state {
            State::Unloaded => Stage::Unloaded,
            State::GeometryResolved => Stage::GeometryResolved,
            State::CatalogRead => Stage::CatalogRead,
            State::Ready(_) => Stage::Ready,
            State::Failed(_) => Stage::Failed,
        }
    }

    /// Why the load failed
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            State::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    fn loaded(&self) -> Option<&Loaded> {
        match &self.state {
            State::Ready(loaded) => Some(loaded),
            _ => None,
        }
    }

    /// Verified layout, once ready
    pub fn geometry(&self) -> Option<&Geometry> {
        self.loaded().map(|l| &l.geometry)
    }

    /// Directory listing, once ready
    pub fn catalog(&self) -> Option<&Catalog> {
        self.loaded().map(|l| &l.catalog)
    }

    /// Raw container bytes, once ready
    pub fn raw(&self) -> Option<&[u8]> {
        self.loaded().map(|l| l.raw.as_slice())
    }

    /// Decode one file
    pub fn body(&self, entry: &DirectoryEntry) -> std::result::Result<FileBody, DecodeError> {
        let loaded = self.loaded().ok_or(DecodeError::NotReady)?;
        if let Some(bodies) = &loaded.bodies {
            if let Some(position) = loaded.catalog.entries.iter().position(|e| e == entry) {
                return bodies[position].clone();
            }
        }
        decode_entry(&self.kind, &self.options, loaded, entry)
    }

    /// Decode every catalog entry in parallel
    ///
    /// Entries not yet started when `cancel` is set come back as
    /// [`DecodeError::Cancelled`].
    pub fn decode_all(
        &self,
        cancel: &AtomicBool,
    ) -> std::result::Result<Vec<std::result::Result<FileBody, DecodeError>>, DecodeError> {
        let loaded = self.loaded().ok_or(DecodeError::NotReady)?;
        Ok(decode_entries(&self.kind, &self.options, loaded, cancel))
    }

    /// Whether the image offers a projection
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::BasicListing => {
                matches!(self.kind.platform(), Platform::Commodore | Platform::Sinclair)
            }
            Capability::Disassembly => {
                matches!(self.kind.platform(), Platform::Sinclair | Platform::Amstrad)
            }
            Capability::ErrorTable => match self.geometry() {
                Some(geometry) => matches!(geometry.checks, SectorChecks::ErrorTable { .. }),
                None => matches!(
                    self.kind.variant,
                    Some(VariantInfo::D64 {
                        error_table: true,
                        ..
                    })
                ),
            },
            Capability::DiskLabel => matches!(
                self.kind.base,
                ContainerBase::D64 | ContainerBase::T64 | ContainerBase::Trd
            ),
        }
    }

    /// Disk or tape name with padding removed
    pub fn label(&self) -> Option<String> {
        self.catalog().and_then(|c| c.label_text())
    }

    /// Detokenized listing of a BASIC program
    pub fn basic_listing(&self, entry: &DirectoryEntry) -> std::result::Result<BasicListing, DecodeError> {
        match self.body(entry)? {
            FileBody::Program(program) => Ok(sinclair_basic::listing(program.program())),
            FileBody::Prg(prg) if prg.is_basic() => Ok(commodore_basic::listing(&prg.data)),
            FileBody::Prg(prg) => Err(DecodeError::invalid("load_address", prg.load_address)),
            _ => Err(DecodeError::UnknownType(entry.type_tag)),
        }
    }

    /// Z80 disassembly of a code file
    pub fn disassembly(
        &self,
        entry: &DirectoryEntry,
    ) -> std::result::Result<Vec<DisassembledLine>, DecodeError> {
        match self.body(entry)? {
            FileBody::Code(code) if code.cpu == Cpu::Z80 => Ok(code.disassemble().unwrap_or_default()),
            _ => Err(DecodeError::UnknownType(entry.type_tag)),
        }
    }

    /// Check a sector against the container's recorded status
    pub fn verify_sector(&self, location: Location) -> std::result::Result<bool, DecodeError> {
        let loaded = self.loaded().ok_or(DecodeError::NotReady)?;
        Ok(address::verify(&loaded.raw, &loaded.geometry, location)?)
    }
}

fn decode_entry(
    kind: &ContainerKind,
    options: &ReadOptions,
    loaded: &Loaded,
    entry: &DirectoryEntry,
) -> std::result::Result<FileBody, DecodeError> {
    let payload = reader_for(kind.base).file_data(&loaded.raw, &loaded.geometry, entry, options)?;
    body::decode(kind.platform(), entry, &payload)
}

fn decode_entries(
    kind: &ContainerKind,
    options: &ReadOptions,
    loaded: &Loaded,
    cancel: &AtomicBool,
) -> Vec<std::result::Result<FileBody, DecodeError>> {
    loaded
        .catalog
        .entries
        .par_iter()
        .map(|entry| {
            if cancel.load(Ordering::Relaxed) {
                return Err(DecodeError::Cancelled);
            }
            let result = decode_entry(kind, options, loaded, entry);
            if let Err(e) = &result {
                log::warn!("{}: {}", entry.display_name(), e);
            }
            result
        })
        .collect()
}
