use anyhow::{Context, Result};
use seismo_mmdb::Reader;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{data_value_to_json, format_cidr};

pub fn cmd_query(database: PathBuf, addresses: Vec<String>, quiet: bool) -> Result<()> {
    let reader = Reader::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let mut all_found = true;
    let mut results = Vec::with_capacity(addresses.len());

    for address in &addresses {
        let (record, prefix_len) = reader
            .get_with_prefix_len(address.as_str())
            .with_context(|| format!("Query failed for: {}", address))?;

        let result = match record {
            Some(data) => json!({
                "ip": address,
                "network": format_cidr(address, prefix_len),
                "data": data_value_to_json(&data),
            }),
            None => {
                all_found = false;
                json!({
                    "ip": address,
                    "network": format_cidr(address, prefix_len),
                    "data": null,
                })
            }
        };
        results.push(result);
    }

    if !quiet {
        // One address prints a single object; several print an array
        let output = if results.len() == 1 {
            results.remove(0)
        } else {
            json!(results)
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    std::process::exit(if all_found { 0 } else { 1 });
}
