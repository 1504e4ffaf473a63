//! capsule-store CLI
//!
//! Operates a capsule store inside a flash image file. With `--in-memory`
//! the image is copied into RAM and every change is discarded on exit.

use std::fs;
use std::path::{Path, PathBuf};

use capsule_persist::capsule::{self, Capsule, PERSIST_ACROSS_RESET};
use capsule_persist::{
    BlockDevice, CapsuleError, CapsuleStore, Config, FileFlash, MemoryFlash, Result, StoreStatus,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// capsule-store CLI
#[derive(Parser, Debug)]
#[command(name = "capsule-store")]
#[command(about = "Persist and drain firmware capsules in a flash image")]
#[command(version)]
struct Args {
    /// Flash image file
    #[arg(short, long, default_value = "./flash.img")]
    image: PathBuf,

    /// Device block size in bytes
    #[arg(short, long, default_value = "4096")]
    block_size: usize,

    /// Byte offset of the capsule region
    #[arg(long, default_value = "0")]
    region_offset: u64,

    /// Size of the capsule region in bytes
    #[arg(long, default_value = "262144")]
    region_size: u64,

    /// Dry run: operate on a RAM copy of the image, leaving the file untouched
    #[arg(long)]
    in_memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an erased flash image
    Format {
        /// Image size in bytes
        #[arg(short, long, default_value = "1048576")]
        capacity: u64,
    },

    /// Append a capsule
    Persist {
        /// Capsule file (or raw payload with --wrap)
        file: PathBuf,

        /// Wrap the file in a capsule header instead of storing it verbatim
        #[arg(short, long)]
        wrap: bool,

        /// Capsule GUID as 32 hex digits (with --wrap)
        #[arg(short, long, default_value = "00000000000000000000000000000000")]
        guid: String,

        /// Capsule flags (with --wrap)
        #[arg(short, long, default_value_t = PERSIST_ACROSS_RESET)]
        flags: u32,
    },

    /// Drain all capsules into a directory and clear the store
    Retrieve {
        /// Output directory
        #[arg(short, long, default_value = "./capsules")]
        out_dir: PathBuf,
    },

    /// Show header state and stored capsules
    Status,

    /// Discard all stored capsules
    Reset,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,capsule_persist=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    tracing::info!("capsule-store v{}", capsule_persist::VERSION);
    tracing::info!("Flash image: {}", args.image.display());

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder()
        .region_offset(args.region_offset)
        .region_size(args.region_size)
        .build();

    match args.command {
        Commands::Format { capacity } => {
            if args.in_memory {
                println!("Dry run: would format {} ({} bytes)", args.image.display(), capacity);
                return Ok(());
            }
            FileFlash::create(&args.image, capacity, args.block_size).map_err(device_error)?;
            println!("Formatted {} ({} bytes)", args.image.display(), capacity);
            Ok(())
        }
        command if args.in_memory => {
            let flash = load_memory_flash(&args.image, args.block_size, &config)?;
            let mut store = CapsuleStore::open(flash, config)?;
            tracing::info!("Dry run: changes are discarded on exit");
            execute(&mut store, command)
        }
        command => {
            let flash = FileFlash::open(&args.image, args.block_size).map_err(device_error)?;
            let mut store = CapsuleStore::open(flash, config)?;
            execute(&mut store, command)
        }
    }
}

fn execute<D: BlockDevice>(store: &mut CapsuleStore<D>, command: Commands) -> Result<()> {
    match command {
        Commands::Format { .. } => Err(CapsuleError::Config(
            "format does not run against an open store".to_string(),
        )),
        Commands::Persist { file, wrap, guid, flags } => {
            let bytes = fs::read(&file)?;
            let capsule = if wrap {
                Capsule::new(parse_guid(&guid)?, flags, &bytes)?
            } else {
                Capsule::from_bytes(bytes)?
            };
            store.persist(&capsule)?;
            println!("Persisted {} ({} bytes)", file.display(), capsule.len());
            Ok(())
        }
        Commands::Retrieve { out_dir } => {
            let (count, buf) = store.drain()?;
            let written = write_capsules(&buf, &out_dir)?;
            for path in &written {
                println!("Wrote {}", path.display());
            }
            println!("Retrieved {} capsule(s), {} bytes", count, buf.len());
            Ok(())
        }
        Commands::Status => print_status(store),
        Commands::Reset => {
            store.erase()?;
            println!("Store cleared");
            Ok(())
        }
    }
}

/// RAM copy of `image`, or an erased device covering the region if there is no image
fn load_memory_flash(image: &Path, block_size: usize, config: &Config) -> Result<MemoryFlash> {
    if block_size == 0 {
        return Err(CapsuleError::Config("block size must be non-zero".to_string()));
    }

    if image.exists() {
        let bytes = fs::read(image)?;
        return MemoryFlash::from_image(block_size, bytes).map_err(device_error);
    }

    let blocks = config.region_end().div_ceil(block_size as u64);
    Ok(MemoryFlash::new(block_size, blocks as usize))
}

/// Split a drained buffer into `capsule_NNN.bin` files
fn write_capsules(buf: &[u8], out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;

    let mut written = Vec::new();
    for (i, entry) in capsule::capsules(buf).enumerate() {
        let path = out_dir.join(format!("capsule_{:03}.bin", i));
        fs::write(&path, entry?)?;
        written.push(path);
    }
    Ok(written)
}

fn print_status<D: BlockDevice>(store: &CapsuleStore<D>) -> Result<()> {
    match store.status()? {
        StoreStatus::Uninitialized => {
            println!("Store uninitialized (no capsules)");
        }
        StoreStatus::Ready { capsule_count, capsule_array_size, free_bytes } => {
            println!(
                "{} capsule(s), {} bytes used, {} bytes free",
                capsule_count, capsule_array_size, free_bytes
            );

            // Peek at the committed array through the device without draining
            let mut buf = vec![0u8; capsule_array_size as usize];
            let layout = store.layout();
            store
                .device()
                .read_mapped(layout.device_offset(layout.block_size as u64), &mut buf)
                .map_err(device_error)?;

            for (i, entry) in capsule::capsules(&buf).enumerate() {
                let bytes = entry?;
                let header = capsule::CapsuleHeader::decode(bytes)?;
                println!(
                    "  [{:03}] guid={} flags={:#010x} size={} crc32={:08x}",
                    i,
                    format_guid(&header.capsule_guid),
                    header.flags,
                    bytes.len(),
                    crc32fast::hash(bytes)
                );
            }
        }
    }
    Ok(())
}

fn parse_guid(text: &str) -> Result<[u8; 16]> {
    let digits: String = text.chars().filter(|c| *c != '-').collect();
    if digits.len() != 32 || !digits.is_ascii() {
        return Err(CapsuleError::Config(format!("GUID must be 32 hex digits: {}", text)));
    }

    let mut guid = [0u8; 16];
    for (i, byte) in guid.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
            .map_err(|e| CapsuleError::Config(format!("invalid GUID {}: {}", text, e)))?;
    }
    Ok(guid)
}

fn format_guid(guid: &[u8; 16]) -> String {
    guid.iter().map(|b| format!("{:02x}", b)).collect()
}

fn device_error(e: capsule_persist::DeviceError) -> CapsuleError {
    CapsuleError::DeviceUnavailable(e.to_string())
}
