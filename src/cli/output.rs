//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CacheStats;
use crate::cli::args::{OutputFormat, PixdexArgs};
use crate::error::Result;
use crate::search::{SearchHit, SearchStats};

/// Result structure for scope creation.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScopeCreationResult {
    pub owner_id: u64,
    pub collection_id: u64,
    pub created: bool,
}

/// Result structure for vector ingestion.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResult {
    pub owner_id: u64,
    pub collection_id: u64,
    pub vectors_added: usize,
    pub duration_ms: u64,
}

/// Result structure for search operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub stats: SearchStats,
    pub duration_ms: u64,
}

/// Result structure for scope deletion.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletionResult {
    pub owner_id: u64,
    pub collection_id: u64,
    pub deleted: bool,
    pub error: Option<String>,
    pub retries_pending: usize,
}

/// One line of the scope listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScopeSummary {
    pub owner_id: u64,
    pub collection_id: u64,
    pub vectors: usize,
}

/// Result structure for listing scopes.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScopeListing {
    pub scopes: Vec<ScopeSummary>,
}

/// Statistics of one scope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScopeStats {
    pub owner_id: u64,
    pub collection_id: u64,
    pub storage_key: String,
    pub vectors: usize,
    pub dimension: usize,
    pub artifact_bytes: u64,
    pub cache: CacheStats,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &PixdexArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &PixdexArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    if let Some(hits) = value.get("hits").and_then(|h| h.as_array()) {
        output_hits_human(hits, &value);
    } else if let Some(scopes) = value.get("scopes").and_then(|s| s.as_array()) {
        output_scopes_human(scopes);
    } else {
        output_generic_human(&value);
    }
    Ok(())
}

/// Output search hits in human format.
fn output_hits_human(hits: &[Value], value: &Value) {
    println!("Search Results:");
    println!("═══════════════");

    if hits.is_empty() {
        println!("No matches.");
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{:>3}. id {:<12} score {:.4}  collection {} (owner {})",
            i + 1,
            format_value(&hit["external_id"]),
            hit["score"].as_f64().unwrap_or(0.0),
            format_value(&hit["collection_id"]),
            format_value(&hit["owner_id"]),
        );
    }

    println!();
    if let Some(stats) = value.get("stats") {
        println!(
            "Scopes searched: {} of {} ({} skipped)",
            format_value(&stats["scopes_searched"]),
            format_value(&stats["scopes_requested"]),
            format_value(&stats["scopes_skipped"]),
        );
    }
    if let Some(duration) = value.get("duration_ms").and_then(|d| d.as_u64()) {
        println!("Search time: {duration}ms");
    }
}

/// Output the scope listing in human format.
fn output_scopes_human(scopes: &[Value]) {
    println!("{:>12} {:>12} {:>10}", "OWNER", "COLLECTION", "VECTORS");
    for scope in scopes {
        println!(
            "{:>12} {:>12} {:>10}",
            format_value(&scope["owner_id"]),
            format_value(&scope["collection_id"]),
            format_value(&scope["vectors"]),
        );
    }
    println!("Total scopes: {}", scopes.len());
}

/// Output generic data in human format.
fn output_generic_human(value: &Value) {
    match value {
        Value::Object(obj) => {
            for (key, val) in obj {
                match val {
                    Value::Object(inner) => {
                        println!("{key}:");
                        for (inner_key, inner_val) in inner {
                            println!("  {inner_key}: {}", format_value(inner_val));
                        }
                    }
                    _ if key.ends_with("_bytes") => {
                        println!("{key}: {}", format_bytes(val.as_u64().unwrap_or(0)));
                    }
                    _ => println!("{key}: {}", format_value(val)),
                }
            }
        }
        _ => println!("{}", format_value(value)),
    }
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &PixdexArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Format a JSON value for display.
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(arr) => {
            let formatted_values = arr.iter().map(format_value).collect::<Vec<_>>().join(", ");
            format!("[{formatted_values}]")
        }
        Value::Object(_) => "[object]".to_string(),
        Value::Null => "-".to_string(),
    }
}

/// Format bytes into human-readable format.
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS[unit_index];
    if unit_index == 0 {
        format!("{bytes} {unit}")
    } else {
        format!("{size:.1} {unit}")
    }
}
