//! nitrofs - Inspect and patch Nintendo DS ROM filesystems.
//!
//! Usage:
//!   nitrofs <rom> <command> [args]
//!
//! Examples:
//!   nitrofs game.nds info                         # Header summary
//!   nitrofs game.nds ls data/stage                # List one directory
//!   nitrofs game.nds extract data/a.bin -o a.bin  # Copy a file out
//!   nitrofs game.nds replace data/a.bin a.bin -o patched.nds
//!   nitrofs game.nds peek 0x020C0020 --overlay 0  # Read a RAM word
//!   nitrofs game.nds poke 0x02000800 0xE12FFF1E -o patched.nds
//!
//! Files are named by path from the root, or by entry id as `#<id>`
//! (`#-6` is the ARM9 binary).

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use nitro_core::{DirId, EntryId, NitroConfig, NitroResult, NodeKind, PatchMode, Rom};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Nintendo DS ROM filesystem tool
#[derive(Parser, Debug)]
#[command(name = "nitrofs")]
#[command(about = "Inspect and patch Nintendo DS ROM filesystems")]
struct Args {
    /// ROM image (.nds, or a .zip containing one)
    rom: PathBuf,

    /// JSON settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log loader, repack and patch activity
    #[arg(short, long, global = true)]
    trace: bool,

    /// Machine-readable output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Header fields and table summary
    Info,
    /// List a directory
    Ls { path: Option<String> },
    /// Print the whole directory tree
    Tree,
    /// Write a file's bytes out
    Extract {
        file: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Replace a file's contents and save the repacked image
    Replace {
        file: String,
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Move a file to a new image offset
    Move {
        file: String,
        #[arg(value_parser = parse_hex)]
        offset: u32,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Read a 32-bit word at an ARM9 RAM address
    Peek {
        #[arg(value_parser = parse_hex)]
        address: u32,
        #[arg(long)]
        overlay: Option<u32>,
    },
    /// Write a 32-bit word at an ARM9 RAM address
    Poke {
        #[arg(value_parser = parse_hex)]
        address: u32,
        #[arg(value_parser = parse_hex)]
        value: u32,
        #[arg(long)]
        overlay: Option<u32>,
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Parse a hex value, with or without a `0x` prefix.
fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value {:?}: {}", s, e))
}

/// Resolve `#<id>` or a root-relative path to an entry.
fn find_file(rom: &Rom, spec: &str) -> NitroResult<EntryId> {
    match spec.strip_prefix('#').and_then(|id| id.parse::<i32>().ok()) {
        Some(id) => rom.entry(EntryId(id)).map(|e| e.id),
        None => rom.file_by_path(spec),
    }
}

fn load_config(path: Option<&Path>, trace: bool) -> CliResult<NitroConfig> {
    let mut config = match path {
        Some(p) => NitroConfig::from_path(p)?,
        None => NitroConfig::default(),
    };
    config.trace |= trace;
    Ok(config)
}

fn print_json(value: &Value) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn info(rom: &Rom, as_json: bool) -> CliResult<()> {
    let header = rom.header()?;
    if as_json {
        return print_json(&json!({
            "header": header,
            "headerCrcValid": rom.header_crc_valid(),
            "arm9Overlays": rom.arm9_overlays().len(),
            "arm7Overlays": rom.arm7_overlays().len(),
            "arm9Sections": rom.arm9_sections(),
            "arm9Compressed": rom.arm9_is_compressed(),
            "files": rom.entries().filter(|e| !e.id.is_system_id()).count(),
        }));
    }

    println!("Title:      {} ({})", header.title, header.game_code);
    println!(
        "ARM9:       {:#010x}+{:#x} -> RAM {:#010X}",
        header.arm9_offset, header.arm9_size, header.arm9_ram_address
    );
    println!(
        "ARM7:       {:#010x}+{:#x} -> RAM {:#010X}",
        header.arm7_offset, header.arm7_size, header.arm7_ram_address
    );
    println!("FNT:        {:#010x}+{:#x}", header.fnt_offset, header.fnt_size);
    println!("FAT:        {:#010x}+{:#x}", header.fat_offset, header.fat_size);
    println!(
        "Overlays:   {} ARM9, {} ARM7",
        rom.arm9_overlays().len(),
        rom.arm7_overlays().len()
    );
    if rom.arm9_is_compressed() {
        println!("Sections:   compressed");
    } else {
        for s in rom.arm9_sections() {
            println!(
                "Section:    RAM {:#010X}+{:#x} at ARM9 {:#x}",
                s.ram_base, s.ram_size, s.file_offset
            );
        }
    }
    println!("FS end:     {:#010x}", header.fs_end);
    println!(
        "Header CRC: {:#06x} ({})",
        header.checksum,
        if rom.header_crc_valid() { "ok" } else { "BAD" }
    );
    Ok(())
}

fn ls(rom: &Rom, path: Option<&str>, as_json: bool) -> CliResult<()> {
    let dir = rom.dir_by_path(path.unwrap_or(""))?;
    let listing = rom.list_directory(dir)?;
    if as_json {
        return print_json(&serde_json::to_value(&listing)?);
    }

    for item in listing {
        match item.kind {
            NodeKind::Dir => println!("{:>6}  {}/", DirId(item.id).to_string(), item.name),
            NodeKind::File => {
                let entry = rom.entry(EntryId(item.id))?;
                println!(
                    "{:>6}  {:<32} {:#010x} {:>8} {}",
                    item.id,
                    item.name,
                    entry.offset,
                    entry.len,
                    entry.kind_name()
                );
            }
        }
    }
    Ok(())
}

fn tree_json(rom: &Rom, dir: DirId) -> CliResult<Value> {
    let node = rom.directory(dir)?;
    let mut children = Vec::new();
    for item in rom.list_directory(dir)? {
        match item.kind {
            NodeKind::Dir => children.push(tree_json(rom, DirId(item.id))?),
            NodeKind::File => {
                let entry = rom.entry(EntryId(item.id))?;
                children.push(json!({
                    "name": entry.name,
                    "id": entry.id,
                    "kind": entry.kind_name(),
                    "offset": entry.offset,
                    "len": entry.len,
                }));
            }
        }
    }
    Ok(json!({ "name": node.name, "id": dir.0, "children": children }))
}

fn print_tree(rom: &Rom, dir: DirId, depth: usize) -> CliResult<()> {
    let indent = "  ".repeat(depth);
    for item in rom.list_directory(dir)? {
        match item.kind {
            NodeKind::Dir => {
                println!("{}{}/", indent, item.name);
                print_tree(rom, DirId(item.id), depth + 1)?;
            }
            NodeKind::File => {
                let entry = rom.entry(EntryId(item.id))?;
                println!(
                    "{}{} [{}] {:#x}+{:#x}",
                    indent, item.name, item.id, entry.offset, entry.len
                );
            }
        }
    }
    Ok(())
}

fn run(args: Args) -> CliResult<()> {
    let config = load_config(args.config.as_deref(), args.trace)?;
    let mut rom = Rom::open_with_config(&args.rom, config)?;

    match args.command {
        Command::Info => info(&rom, args.json)?,
        Command::Ls { path } => ls(&rom, path.as_deref(), args.json)?,
        Command::Tree => {
            if args.json {
                print_json(&tree_json(&rom, rom.root())?)?;
            } else {
                println!("root/");
                print_tree(&rom, rom.root(), 1)?;
            }
        }
        Command::Extract { file, output } => {
            let id = find_file(&rom, &file)?;
            let data = rom.read_file(id)?;
            std::fs::write(&output, data)?;
            eprintln!("Extracted {} ({} bytes) to {}", file, data.len(), output.display());
        }
        Command::Replace {
            file,
            input,
            output,
        } => {
            let id = find_file(&rom, &file)?;
            let data = std::fs::read(&input)?;
            rom.replace_file(id, &data)?;
            let entry = rom.entry(id)?;
            eprintln!(
                "Replaced {} ({:#x} bytes at {:#x})",
                file, entry.len, entry.offset
            );
            rom.save(&output)?;
        }
        Command::Move {
            file,
            offset,
            output,
        } => {
            let id = find_file(&rom, &file)?;
            rom.move_entry(id, offset)?;
            eprintln!("Moved {} to {:#x}", file, offset);
            rom.save(&output)?;
        }
        Command::Peek { address, overlay } => {
            let loc = rom.resolve(address, overlay)?;
            let value = rom.patch_ram(address, overlay, 0, PatchMode::Read)?;
            if args.json {
                print_json(&json!({ "address": address, "location": loc, "value": value }))?;
            } else {
                println!(
                    "{:08X}: {:08X} ({} +{:#x})",
                    address,
                    value,
                    rom.entry(loc.entry)?.name,
                    loc.offset
                );
            }
        }
        Command::Poke {
            address,
            value,
            overlay,
            output,
        } => {
            let previous = rom.patch_ram(address, overlay, value, PatchMode::Write)?;
            eprintln!("{:08X}: {:08X} -> {:08X}", address, previous, value);
            rom.save(&output)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Image work is synchronous; keep it off the async workers.
    match tokio::task::spawn_blocking(move || run(args)).await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
