use anyhow::{Context, Result};
use seismo_mmdb::Reader;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{format_number, format_unix_timestamp};

/// Edges of the search tree grouped by what they point at
#[derive(Default)]
struct TreeStats {
    nodes: usize,
    networks: usize,
    empty: usize,
}

fn tree_stats(reader: &Reader) -> Result<TreeStats> {
    let node_count = reader.geometry().node_count;
    let mut stats = TreeStats::default();
    reader
        .traverse(|edge| {
            if edge.bit == 0 {
                stats.nodes += 1;
            }
            if edge.child == node_count {
                stats.empty += 1;
            } else if edge.child > node_count {
                stats.networks += 1;
            }
        })
        .context("Failed to walk the search tree")?;
    Ok(stats)
}

pub fn cmd_inspect(database: PathBuf, json_output: bool, tree: bool) -> Result<()> {
    let reader = Reader::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let metadata = reader.metadata();
    let geometry = reader.geometry();
    let stats = if tree {
        Some(tree_stats(&reader)?)
    } else {
        None
    };

    if json_output {
        let mut output = json!({
            "file": database.display().to_string(),
            "file_size": reader.file_size(),
            "binary_format_major_version": metadata.binary_format_major_version,
            "binary_format_minor_version": metadata.binary_format_minor_version,
            "database_type": metadata.database_type,
            "ip_version": metadata.ip_version.number(),
            "node_count": metadata.node_count,
            "record_size": metadata.record_size.bits(),
            "build_epoch": metadata.build_epoch,
            "build_time": format_unix_timestamp(metadata.build_epoch),
            "languages": metadata.languages,
            "description": metadata.description,
            "metadata_offset": reader.metadata_offset(),
            "data_section_base": geometry.data_section_base,
        });

        if let Some(stats) = stats {
            output["tree"] = json!({
                "nodes": stats.nodes,
                "networks": stats.networks,
                "empty_branches": stats.empty,
            });
        }

        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Database: {}", database.display());
    println!("Size:     {} bytes", format_number(reader.file_size()));
    println!();
    println!("Metadata:");
    println!("  Database type:   {}", metadata.database_type);
    println!(
        "  Format version:  {}.{}",
        metadata.binary_format_major_version, metadata.binary_format_minor_version
    );
    println!(
        "  Build time:      {} ({})",
        format_unix_timestamp(metadata.build_epoch),
        metadata.build_epoch
    );
    println!("  IP version:      {}", metadata.ip_version);
    println!("  Node count:      {}", format_number(metadata.node_count as usize));
    println!("  Record size:     {} bits", metadata.record_size.bits());

    if let Some(languages) = &metadata.languages {
        println!("  Languages:       {}", languages.join(", "));
    }

    if let Some(description) = &metadata.description {
        println!("  Description:");
        let mut entries: Vec<_> = description.iter().collect();
        entries.sort();
        for (lang, text) in entries {
            println!("    {}: {}", lang, text);
        }
    }

    println!();
    println!("Layout:");
    println!("  Search tree:     {} bytes", format_number(geometry.tree_byte_size));
    println!("  Data section at: {}", geometry.data_section_base);
    println!("  Metadata at:     {}", reader.metadata_offset());

    if let Some(stats) = stats {
        println!();
        println!("Search tree:");
        println!("  Reachable nodes: {}", format_number(stats.nodes));
        println!("  Networks:        {}", format_number(stats.networks));
        println!("  Empty branches:  {}", format_number(stats.empty));
    }

    Ok(())
}
