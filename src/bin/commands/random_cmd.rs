use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seismo_mmdb::{LookupAddress, Reader, SingleThreadedReader};
use std::path::PathBuf;
use std::time::Instant;

use crate::cli_utils::{data_value_to_json, format_number, format_qps};

pub fn cmd_random(
    database: PathBuf,
    count: usize,
    seed: Option<u64>,
    ipv6: bool,
    show: bool,
) -> Result<()> {
    let reader = Reader::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;
    let mut single = SingleThreadedReader::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    if ipv6 && reader.metadata().ipv4() {
        bail!("--ipv6 requires an IPv6 database, {} is IPv4", database.display());
    }

    let seed = seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    eprintln!(
        "Looking up {} random {} addresses (seed {})",
        format_number(count),
        if ipv6 { "IPv6" } else { "IPv4" },
        seed
    );

    let mut found = 0usize;
    let start = Instant::now();

    for _ in 0..count {
        let addr = if ipv6 {
            let mut bytes = [0u8; 16];
            rng.fill(&mut bytes[..]);
            LookupAddress::V6(bytes)
        } else {
            let mut bytes = [0u8; 4];
            rng.fill(&mut bytes[..]);
            LookupAddress::V4(bytes)
        };

        let expected = reader
            .get(&addr)
            .with_context(|| format!("Reader lookup failed for {}", addr))?;
        let actual = single
            .get(&addr)
            .with_context(|| format!("SingleThreadedReader lookup failed for {}", addr))?;

        if show {
            println!("{}", addr);
            println!(">>> {}", expected.as_ref().map(data_value_to_json).unwrap_or_default());
            println!(">>> {}", actual.as_ref().map(data_value_to_json).unwrap_or_default());
            println!();
        }

        if expected != actual {
            bail!(
                "Mismatch for {}: Reader returned {}, SingleThreadedReader returned {}",
                addr,
                expected.as_ref().map(data_value_to_json).unwrap_or_default(),
                actual.as_ref().map(data_value_to_json).unwrap_or_default()
            );
        }
        if expected.is_some() {
            found += 1;
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!("Lookups:     {}", format_number(count));
    println!("Found:       {}", format_number(found));
    println!("Not found:   {}", format_number(count - found));
    println!("Cached keys: {}", format_number(single.cached_keys()));
    if elapsed > 0.0 {
        println!("Throughput:  {} pairs/sec", format_qps(count as f64 / elapsed));
    }
    println!("All results agree");

    Ok(())
}
