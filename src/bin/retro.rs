/// Command-line viewer for disk and tape images
use retroimage::{ContainerKind, DirectoryEntry, FileBody, Image, ReadOptions};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

fn print_usage() {
    println!("Usage: retro <image> [--kind d64|t64|tap|trd|dsk] [command]");
    println!();
    println!("Commands:");
    println!("  geometry                       - Show the resolved track layout");
    println!("  dir                            - List files (default)");
    println!("  list <index>                   - Show a file as BASIC, disassembly or hex");
    println!("  extract <index> <output_path>  - Write a file's decoded data to the host");
    println!();
    println!("Set RUST_LOG=debug to trace each load stage.");
}

struct Args {
    path: String,
    kind: Option<String>,
    command: Vec<String>,
}

fn parse_args() -> Option<Args> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    let mut kind = None;
    let mut command = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--kind" | "-k" => kind = Some(args.next()?),
            "--help" | "-h" => return None,
            _ if path.is_none() => path = Some(arg),
            _ => command.push(arg),
        }
    }

    Some(Args {
        path: path?,
        kind,
        command,
    })
}

fn main() -> ExitCode {
    env_logger::init();

    let Some(args) = parse_args() else {
        print_usage();
        return ExitCode::FAILURE;
    };

    let kind = match &args.kind {
        Some(name) => name.parse::<ContainerKind>(),
        None => ContainerKind::from_extension(&args.path),
    };
    let kind = match kind {
        Ok(kind) => kind,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let file = match std::fs::File::open(&args.path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error opening {}: {}", args.path, e);
            return ExitCode::FAILURE;
        }
    };

    let mut image = Image::new(kind, ReadOptions::default());
    if let Err(e) = image.read(file) {
        eprintln!("Error reading {}: {}", args.path, e);
        return ExitCode::FAILURE;
    }

    let command: Vec<&str> = args.command.iter().map(|s| s.as_str()).collect();
    let result = match command.as_slice() {
        [] | ["dir"] => {
            print_dir(&image);
            Ok(())
        }
        ["geometry"] => {
            print_geometry(&image);
            Ok(())
        }
        ["list", index] => with_entry(&image, index, |entry| list_file(&image, entry)),
        ["extract", index, output] => with_entry(&image, index, |entry| extract_file(&image, entry, output)),
        _ => {
            print_usage();
            Err("Unknown command".to_string())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn with_entry<F>(image: &Image, index: &str, action: F) -> Result<(), String>
where
    F: FnOnce(&DirectoryEntry) -> Result<(), String>,
{
    let index: usize = index
        .parse()
        .map_err(|_| format!("'{}' is not a directory index", index))?;
    let entry = image
        .catalog()
        .and_then(|catalog| catalog.entry(index))
        .ok_or_else(|| format!("No file at index {}", index))?;
    action(entry)
}

fn print_geometry(image: &Image) {
    let Some(geometry) = image.geometry() else {
        return;
    };
    println!("Container: {}", image.kind());
    println!("Image length: {} bytes", geometry.image_len);
    println!("Capacity: {} bytes", geometry.total_capacity);
    println!("Sector size: {} bytes", geometry.sector_size);
    if let Some(label) = image.label() {
        println!("Label: {}", label);
    }
    println!();
    println!("{:<6} {:<8} {:<10} {}", "Track", "Sectors", "Offset", "Sector IDs");
    println!("{}", "-".repeat(60));
    for (index, track) in geometry.tracks.iter().enumerate() {
        let ids: Vec<String> = track.sector_ids.iter().map(|id| format!("{:02X}", id)).collect();
        println!(
            "{:<6} {:<8} {:<10} {}",
            index + geometry.first_track as usize,
            track.sectors,
            format!("0x{:X}", track.data_offset),
            ids.join(" ")
        );
    }
}

fn print_dir(image: &Image) {
    let Some(catalog) = image.catalog() else {
        return;
    };
    if let Some(label) = image.label() {
        println!("Label: {}", label);
    }
    if catalog.entries.is_empty() {
        println!("No files found.");
    } else {
        let cancel = AtomicBool::new(false);
        let bodies = image.decode_all(&cancel).unwrap_or_default();

        println!("{:>3} {:<18} {:>4} {:>7}  {}", "Idx", "Name", "Type", "Size", "Contents");
        println!("{}", "-".repeat(60));
        for (entry, body) in catalog.entries.iter().zip(bodies) {
            let contents = match body {
                Ok(body) => body.kind_name().to_string(),
                Err(e) => e.to_string(),
            };
            println!(
                "{:>3} {:<18} {:>4} {:>7}  {}",
                entry.index,
                entry.display_name(),
                format!("{:02X}", entry.type_tag),
                entry.declared_size,
                contents
            );
        }
    }
    println!();
    println!("{} files, {} skipped", catalog.entries.len(), catalog.skipped);
    for problem in &catalog.problems {
        println!("Problem at slot {}: {}", problem.index, problem.reason);
    }
}

fn list_file(image: &Image, entry: &DirectoryEntry) -> Result<(), String> {
    let body = image.body(entry).map_err(|e| e.to_string())?;
    match &body {
        FileBody::Program(_) | FileBody::Prg(_) => {
            if let Ok(listing) = image.basic_listing(entry) {
                print!("{}", listing);
                return Ok(());
            }
        }
        FileBody::Code(code) => {
            if let Some(lines) = code.disassemble() {
                for line in lines {
                    println!("{}", line);
                }
                return Ok(());
            }
        }
        _ => {}
    }
    hex_dump(body.data());
    Ok(())
}

fn extract_file(image: &Image, entry: &DirectoryEntry, output: &str) -> Result<(), String> {
    let body = image.body(entry).map_err(|e| e.to_string())?;
    std::fs::write(output, body.data()).map_err(|e| format!("Writing {}: {}", output, e))?;
    println!("Wrote {} bytes to {}", body.data().len(), output);
    Ok(())
}

fn hex_dump(data: &[u8]) {
    for (row, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { '.' })
            .collect();
        println!("{:04X}  {:<48} {}", row * 16, hex.join(" "), ascii);
    }
}
