mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{cmd_inspect, cmd_query, cmd_random};

#[derive(Parser)]
#[command(name = "seismo-mmdb")]
#[command(
    about = "Inspect and query MaxMind DB (MMDB) files",
    long_about = "seismo-mmdb - Read-only MaxMind DB reader\n\n\
    Looks up IP addresses in memory-mapped MMDB files (GeoLite2, GeoIP2 and\n\
    any database written in the MaxMind DB format).\n\n\
    Examples:\n\
      seismo-mmdb inspect GeoLite2-City.mmdb\n\
      seismo-mmdb query GeoLite2-City.mmdb 8.8.8.8 2001:4860::8888\n\
      seismo-mmdb random GeoLite2-City.mmdb --count 100000 --seed 7"
)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show database metadata
    Inspect {
        /// Path to the MMDB file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Also walk the search tree and count networks
        #[arg(short, long)]
        tree: bool,
    },

    /// Look up one or more IP addresses
    Query {
        /// Path to the MMDB file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// IP addresses to look up
        #[arg(value_name = "IP", required = true)]
        addresses: Vec<String>,

        /// Quiet mode - no output, exit code only (0 = all found, 1 = any missing)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Differential random lookups: Reader against SingleThreadedReader
    Random {
        /// Path to the MMDB file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Number of random addresses to look up
        #[arg(short = 'n', long, default_value = "10000")]
        count: usize,

        /// Seed for the address generator (random if omitted)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Generate IPv6 addresses (IPv6 databases only)
        #[arg(long)]
        ipv6: bool,

        /// Print every address and both results
        #[arg(long)]
        show: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Inspect {
            database,
            json,
            tree,
        } => cmd_inspect(database, json, tree),
        Commands::Query {
            database,
            addresses,
            quiet,
        } => cmd_query(database, addresses, quiet),
        Commands::Random {
            database,
            count,
            seed,
            ipv6,
            show,
        } => cmd_random(database, count, seed, ipv6, show),
    }
}
