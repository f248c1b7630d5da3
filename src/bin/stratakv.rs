//! StrataKV maintenance CLI
//!
//! Opens a database location directly (no server) to inspect or repair it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stratakv::{Config, Engine, IteratorOptions, Result, WriteOptions};
use tracing_subscriber::{fmt, EnvFilter};

/// StrataKV CLI
#[derive(Parser, Debug)]
#[command(name = "stratakv")]
#[command(about = "Inspect and maintain a StrataKV database")]
#[command(version)]
struct Args {
    /// Database directory
    #[arg(short, long, default_value = "./stratakv_data")]
    location: PathBuf,

    /// Fail on any checksum mismatch, including a torn WAL tail
    #[arg(long)]
    paranoid: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// fsync the WAL before returning
        #[arg(long)]
        sync: bool,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Print entries in key order
    Scan {
        /// Inclusive lower bound
        #[arg(long)]
        from: Option<String>,

        /// Exclusive upper bound
        #[arg(long)]
        to: Option<String>,

        /// Maximum number of entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Descending order
        #[arg(short, long)]
        reverse: bool,
    },

    /// Print a diagnostic property such as `leveldb.stats`
    Property {
        name: String,
    },

    /// Compact the whole key space, or `[begin, end]`
    Compact {
        #[arg(long)]
        begin: Option<String>,

        #[arg(long)]
        end: Option<String>,
    },

    /// Delete the database
    Destroy,

    /// Rebuild the manifest from the files present
    Repair,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stratakv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder()
        .location(&args.location)
        .paranoid_checks(args.paranoid)
        .build();

    match args.command {
        Commands::Destroy => {
            stratakv::destroy(&args.location)?;
            println!("destroyed {}", args.location.display());
            return Ok(());
        }
        Commands::Repair => {
            let report = stratakv::repair(&args.location, &config)?;
            println!(
                "recovered {} tables from {} logs, archived {} files, last sequence {}",
                report.tables, report.logs_converted, report.files_archived, report.last_sequence
            );
            return Ok(());
        }
        _ => {}
    }

    // Inspection should not create an empty database by accident
    let create = matches!(args.command, Commands::Put { .. });
    let engine = Engine::open(Config {
        create_if_missing: create,
        ..config
    })?;

    match args.command {
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Put { key, value, sync } => {
            engine.put_with(key.as_bytes(), value.as_bytes(), WriteOptions { sync })?;
            println!("OK");
        }
        Commands::Del { key } => {
            engine.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Scan {
            from,
            to,
            limit,
            reverse,
        } => {
            let options = IteratorOptions {
                gte: from.map(String::into_bytes),
                lt: to.map(String::into_bytes),
                limit,
                reverse,
                ..IteratorOptions::default()
            };
            for entry in engine.iter(options)? {
                let (key, value) = entry?;
                println!(
                    "{} = {}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&value)
                );
            }
        }
        Commands::Property { name } => match engine.get_property(&name)? {
            Some(value) => println!("{}", value.trim_end()),
            None => println!("(unknown property)"),
        },
        Commands::Compact { begin, end } => {
            engine.compact_range(
                begin.as_deref().map(str::as_bytes),
                end.as_deref().map(str::as_bytes),
            )?;
            println!("OK");
        }
        Commands::Destroy | Commands::Repair => {}
    }

    engine.close()
}
