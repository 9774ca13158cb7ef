//! lusf: command-line tool for lumpstore files
//!
//! Every subcommand opens (or creates) the storage named by `--storage`,
//! performs one operation and closes it again.

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use lumpstore::{Config, LumpData, LumpId, NonVolatileMemory, Result, Storage};
use tracing_subscriber::{fmt, EnvFilter};

/// lumpstore CLI
#[derive(Parser, Debug)]
#[command(name = "lusf")]
#[command(about = "Inspect and modify lumpstore storage files")]
#[command(version)]
struct Args {
    /// Path of the .lusf storage file
    #[arg(short, long)]
    storage: PathBuf,

    /// Open the file without O_DIRECT
    #[arg(long)]
    buffered: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new storage file
    Create {
        /// Total file size in bytes
        #[arg(short, long)]
        capacity: u64,

        /// Fraction of the capacity given to the journal
        #[arg(long, default_value = "0.01")]
        journal_ratio: f64,
    },

    /// Store a lump
    Put {
        /// Lump id (hex)
        id: LumpId,

        /// Payload given inline
        #[arg(required_unless_present = "file")]
        value: Option<String>,

        /// Read the payload from a file instead
        #[arg(short, long, conflicts_with = "value")]
        file: Option<PathBuf>,

        /// Embed the payload in the journal regardless of its size
        #[arg(long)]
        embed: bool,
    },

    /// Print a lump's payload to stdout
    Get {
        /// Lump id (hex)
        id: LumpId,

        /// First payload byte to print
        #[arg(long, requires = "len")]
        offset: Option<usize>,

        /// Number of bytes to print
        #[arg(long, requires = "offset")]
        len: Option<usize>,
    },

    /// Delete a lump
    Delete {
        /// Lump id (hex)
        id: LumpId,
    },

    /// Delete every lump in [start, end)
    DeleteRange {
        start: LumpId,
        end: LumpId,
    },

    /// List stored lump ids
    List {
        /// Also print each lump's size and payload
        #[arg(long)]
        dump: bool,
    },

    /// Print the storage header
    Header,

    /// Print space usage
    Usage,

    /// Print the journal ring positions and records
    Journal,

    /// Run a full journal GC
    Gc,

    /// Write then read back a batch of lumps and report throughput
    Bench {
        /// Number of lumps
        #[arg(short, long, default_value = "1000")]
        count: u64,

        /// Payload size in bytes
        #[arg(short = 'z', long, default_value = "4096")]
        size: usize,
    },
}

fn main() {
    let args = Args::parse();

    // Initialize tracing/logging
    let default_filter = if args.verbose {
        "warn,lumpstore=debug"
    } else {
        "warn,lumpstore=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder().direct_io(!args.buffered).build();

    if let Commands::Create {
        capacity,
        journal_ratio,
    } = args.command
    {
        let config = Config {
            journal_ratio,
            ..config
        };
        let storage = Storage::create_file(&args.storage, capacity, config)?;
        print_header(&mut std::io::stdout().lock(), &storage)?;
        return storage.close();
    }

    let mut storage = Storage::open_file(&args.storage, config)?;
    let mut stdout = std::io::stdout().lock();

    match args.command {
        Commands::Create { .. } => unreachable!("handled above"),
        Commands::Put {
            id,
            value,
            file,
            embed,
        } => {
            let bytes = match (value, file) {
                (_, Some(path)) => std::fs::read(path)?,
                (Some(value), None) => value.into_bytes(),
                (None, None) => Vec::new(),
            };
            let existed = if embed {
                storage.put_embed(id, &bytes)?
            } else {
                storage.put(id, LumpData::new(bytes)?)?
            };
            writeln!(stdout, "{}", if existed { "updated" } else { "created" })?;
        }
        Commands::Get { id, offset, len } => {
            let bytes = match (offset, len) {
                (Some(offset), Some(len)) => storage.get_with_offset(id, offset, len)?,
                _ => storage.get(id)?.into_vec(),
            };
            stdout.write_all(&bytes)?;
        }
        Commands::Delete { id } => {
            let existed = storage.delete(id)?;
            writeln!(stdout, "{}", if existed { "deleted" } else { "not found" })?;
        }
        Commands::DeleteRange { start, end } => {
            let removed = storage.delete_range(start..end)?;
            writeln!(stdout, "deleted {} lumps", removed.len())?;
        }
        Commands::List { dump } => {
            for id in storage.list() {
                if dump {
                    let data = storage.get(id)?;
                    writeln!(
                        stdout,
                        "{}\t{}\t{}",
                        id,
                        data.len(),
                        String::from_utf8_lossy(data.as_bytes())
                    )?;
                } else {
                    writeln!(stdout, "{}", id)?;
                }
            }
        }
        Commands::Header => print_header(&mut stdout, &storage)?,
        Commands::Usage => {
            let usage = storage.usage();
            writeln!(stdout, "lumps:                {}", usage.lump_count)?;
            writeln!(stdout, "data capacity:        {}", usage.data_capacity)?;
            writeln!(stdout, "data free:            {}", usage.data_free_bytes)?;
            writeln!(stdout, "largest free segment: {}", usage.data_max_segment_bytes)?;
            writeln!(stdout, "journal capacity:     {}", usage.journal_capacity)?;
            writeln!(stdout, "journal usage:        {}", usage.journal_usage_bytes)?;
        }
        Commands::Journal => {
            let snapshot = storage.journal_snapshot()?;
            writeln!(
                stdout,
                "unreleased_head={} head={} tail={}",
                snapshot.unreleased_head, snapshot.head, snapshot.tail
            )?;
            for entry in snapshot.entries {
                writeln!(stdout, "{:>12}  {:?}", entry.start.as_u64(), entry.record)?;
            }
        }
        Commands::Gc => {
            let before = storage.usage().journal_usage_bytes;
            storage.journal_gc()?;
            let after = storage.usage().journal_usage_bytes;
            writeln!(stdout, "journal usage {} -> {}", before, after)?;
        }
        Commands::Bench { count, size } => {
            let payload = vec![0xA5; size];

            let started = Instant::now();
            for i in 0..count {
                storage.put(LumpId::new(i as u128), LumpData::new(payload.clone())?)?;
            }
            storage.sync()?;
            let write_elapsed = started.elapsed();

            let started = Instant::now();
            for i in 0..count {
                storage.get(LumpId::new(i as u128))?;
            }
            let read_elapsed = started.elapsed();

            let mib = (count as f64 * size as f64) / (1024.0 * 1024.0);
            writeln!(
                stdout,
                "put: {} lumps in {:?} ({:.1} MiB/s)",
                count,
                write_elapsed,
                mib / write_elapsed.as_secs_f64()
            )?;
            writeln!(
                stdout,
                "get: {} lumps in {:?} ({:.1} MiB/s)",
                count,
                read_elapsed,
                mib / read_elapsed.as_secs_f64()
            )?;
        }
    }

    drop(stdout);
    storage.close()
}

fn print_header<W: Write, N: NonVolatileMemory>(out: &mut W, storage: &Storage<N>) -> Result<()> {
    let header = storage.header();
    writeln!(out, "version:         {}.{}", header.major_version, header.minor_version)?;
    writeln!(out, "instance:        {}", header.instance_uuid)?;
    writeln!(out, "block size:      {}", header.block_size)?;
    writeln!(out, "journal region:  {}", header.journal_region_size)?;
    writeln!(out, "data region:     {}", header.data_region_size)?;
    writeln!(out, "storage size:    {}", header.storage_size())?;
    Ok(())
}
