/*!
# retroimage

A Rust library for decoding Commodore, Amstrad and Sinclair disk and tape
images into a verified geometry, a directory catalog and typed file bodies.

## Features

- D64 (35, 40 and 42 tracks, with or without error table), T64 and TAP
  containers for the Commodore 64
- TR-DOS disk images for the ZX Spectrum
- Standard and Extended DSK images with the Amstrad CP/M directory
- Typed bodies: Sinclair BASIC programs and arrays, PRG and REL files,
  AMSDOS binaries and BASIC, machine code
- BASIC listings for Commodore BASIC V2 and Sinclair BASIC, Z80 disassembly
- Parallel, cancellable decoding of every file on an image

## Quick Start

```rust,no_run
use retroimage::{ContainerKind, Image, ReadOptions};

let kind = ContainerKind::from_extension("games.d64")?;
let mut image = Image::new(kind, ReadOptions::default());
image.read(std::fs::File::open("games.d64")?)?;

let catalog = image.catalog().expect("image is ready");
for entry in &catalog.entries {
    println!("{:3} {:16} {} bytes", entry.index, entry.display_name(), entry.declared_size);
    match image.body(entry) {
        Ok(body) => println!("    {}", body.kind_name()),
        Err(e) => println!("    {}", e),
    }
}
# Ok::<(), Box<dyn std::error::Error>>(())
```

## Modules

- `format`: container kinds, constants, DSK parsing and geometry resolution
- `image`: the `Image` facade, sector addressing and read options
- `filesystem`: one directory reader per container
- `body`: typed file bodies and per-platform decoders
- `fdc`: FDC status registers recorded in DSK images
- `error`: error types for each stage
*/

#![warn(missing_docs)]

/// Body decoders and BASIC listings
pub mod body;
/// Commodore BASIC V2 detokenizer
pub mod commodore_basic;
/// Error types and Result alias
pub mod error;
/// FDC (Floppy Disk Controller) status codes
pub mod fdc;
/// Directory readers
pub mod filesystem;
/// Container kinds, constants and geometry
pub mod format;
/// Image facade and sector addressing
pub mod image;
/// Sinclair BASIC detokenizer
pub mod sinclair_basic;

// Re-export common types
pub use body::{BasicLine, BasicListing, CodeBlock, Cpu, FileBody};
pub use error::{AddressError, CatalogError, DecodeError, GeometryError, ReadError, Result};
pub use fdc::{FdcStatus1, FdcStatus2, SectorStatus};
pub use filesystem::{Catalog, CatalogProblem, DirectoryEntry, EntryParams, FileLocation};
pub use format::{
    resolve, ContainerBase, ContainerKind, Geometry, Platform, TrackCount, TrdDiskType,
    VariantInfo,
};
pub use image::{Capability, ChecksumPolicy, Image, Location, ReadOptions, Stage, TapTiming};
