//! Command line argument parsing for the pixdex CLI using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::PixdexConfig;
use crate::error::Result;

/// pixdex - multi-tenant vector indexes with federated similarity search
#[derive(Parser, Debug, Clone)]
#[command(name = "pixdex")]
#[command(about = "Manage per-collection embedding indexes and search across them")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct PixdexArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(flatten)]
    pub settings: ConfigArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl PixdexArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }
}

/// Service settings. Flags override environment variables, which override
/// the JSON file given by `--config`.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// JSON configuration file
    #[arg(long, env = "PIXDEX_CONFIG", global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Root directory of the index artifacts
    #[arg(long, env = "PIXDEX_INDEX_DIR", global = true, value_name = "DIR")]
    pub index_dir: Option<PathBuf>,

    /// Embedding dimension of this deployment
    #[arg(long, env = "PIXDEX_DIMENSION", global = true)]
    pub dimension: Option<usize>,

    /// Number of decoded indexes kept in memory
    #[arg(long, env = "PIXDEX_CACHE_CAPACITY", global = true)]
    pub cache_capacity: Option<usize>,

    /// Images per embedding provider call
    #[arg(long, env = "PIXDEX_EMBED_BATCH_SIZE", global = true)]
    pub embed_batch_size: Option<usize>,

    /// Deadline for one embedding step in milliseconds
    #[arg(long, env = "PIXDEX_EMBED_TIMEOUT_MS", global = true)]
    pub embed_timeout_ms: Option<u64>,

    /// Result count when -k is not given
    #[arg(long, env = "PIXDEX_DEFAULT_TOP_K", global = true)]
    pub default_top_k: Option<usize>,

    /// Attempts before a failed deletion is abandoned
    #[arg(long, env = "PIXDEX_MAX_DELETE_RETRIES", global = true)]
    pub max_delete_retries: Option<u32>,

    /// Skip fsync when committing index writes
    #[arg(long, global = true)]
    pub no_sync: bool,
}

impl ConfigArgs {
    /// Build the effective configuration.
    pub fn resolve(&self) -> Result<PixdexConfig> {
        let mut config = match &self.config {
            Some(path) => PixdexConfig::from_file(path)?,
            None => PixdexConfig::default(),
        };

        if let Some(index_dir) = &self.index_dir {
            config.index_dir = index_dir.clone();
        }
        if let Some(dimension) = self.dimension {
            config.dimension = dimension;
        }
        if let Some(capacity) = self.cache_capacity {
            config.cache_capacity = capacity;
        }
        if let Some(batch_size) = self.embed_batch_size {
            config.embed_batch_size = batch_size;
        }
        if let Some(timeout) = self.embed_timeout_ms {
            config.embed_timeout_ms = Some(timeout);
        }
        if let Some(k) = self.default_top_k {
            config.default_top_k = k;
        }
        if let Some(retries) = self.max_delete_retries {
            config.max_delete_retries = retries;
        }
        if self.no_sync {
            config.sync_writes = false;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the empty index of a collection
    #[command(name = "create-scope")]
    CreateScope(CreateScopeArgs),

    /// Add pre-computed embeddings from a JSONL file
    Ingest(IngestArgs),

    /// Federated search over several collections
    Search(SearchArgs),

    /// Delete a collection's index
    #[command(name = "delete-scope")]
    DeleteScope(DeleteScopeArgs),

    /// List every index with its vector count
    List,

    /// Show statistics for one index
    Stats(ScopeArgs),
}

/// Owner and collection of one index.
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// Account that owns the collection
    #[arg(value_name = "OWNER")]
    pub owner: u64,

    /// Collection id
    #[arg(value_name = "COLLECTION")]
    pub collection: u64,
}

/// Arguments for creating a scope
#[derive(Args, Debug, Clone)]
pub struct CreateScopeArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Succeed without changes if the index already exists
    #[arg(long)]
    pub if_missing: bool,
}

/// Arguments for ingesting vectors
#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// JSONL file of {"external_id": .., "vector": [..]} records
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Arguments for searching
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Collections to search (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    pub collections: Vec<u64>,

    /// Owner of each collection as collection:owner pairs
    #[arg(long, value_name = "MAP")]
    pub owners: String,

    /// File holding the query vector as a JSON array
    #[arg(long, value_name = "FILE", conflicts_with = "vector_json")]
    pub vector: Option<PathBuf>,

    /// Query vector as an inline JSON array
    #[arg(long, value_name = "JSON", required_unless_present = "vector")]
    pub vector_json: Option<String>,

    /// Maximum number of results to return
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,
}

/// Arguments for deleting a scope
#[derive(Args, Debug, Clone)]
pub struct DeleteScopeArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Log failures instead of failing; queue them for one retry pass
    #[arg(long)]
    pub best_effort: bool,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let args = PixdexArgs::try_parse_from([
            "pixdex",
            "search",
            "--collections",
            "1,2",
            "--owners",
            "1:7,2:9",
            "--vector-json",
            "[0.1, 0.2]",
            "-k",
            "3",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.output_format, OutputFormat::Json);
        match args.command {
            Command::Search(search) => {
                assert_eq!(search.collections, vec![1, 2]);
                assert_eq!(search.top_k, Some(3));
                assert!(search.vector.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_search_requires_a_vector() {
        let result = PixdexArgs::try_parse_from([
            "pixdex",
            "search",
            "--collections",
            "1",
            "--owners",
            "1:7",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verbosity() {
        let args = PixdexArgs::try_parse_from(["pixdex", "-vv", "list"]).unwrap();
        assert_eq!(args.verbosity(), 2);
        let args = PixdexArgs::try_parse_from(["pixdex", "list", "-q"]).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_flags_override_defaults() {
        let settings = ConfigArgs {
            dimension: Some(4),
            no_sync: true,
            ..ConfigArgs::default()
        };
        let config = settings.resolve().unwrap();
        assert_eq!(config.dimension, 4);
        assert!(!config.sync_writes);
        assert_eq!(config.cache_capacity, 50);

        let settings = ConfigArgs {
            dimension: Some(0),
            ..ConfigArgs::default()
        };
        assert!(settings.resolve().is_err());
    }
}
