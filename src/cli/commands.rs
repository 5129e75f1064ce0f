//! Command implementations for the pixdex CLI.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use serde::Deserialize;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::PixdexConfig;
use crate::embedding::PrecomputedEmbedder;
use crate::error::{PixdexError, Result};
use crate::scope::{OwnerMap, Scope};
use crate::service::SearchService;

/// One pre-computed embedding in an ingest file.
#[derive(Debug, Deserialize)]
struct VectorRecord {
    external_id: i64,
    vector: Vec<f32>,
}

/// Execute a CLI command.
pub fn execute_command(args: PixdexArgs) -> Result<()> {
    let config = args.settings.resolve()?;
    debug!("Using index directory {}", config.index_dir.display());
    let service = open_service(config)?;

    match &args.command {
        Command::CreateScope(create_args) => create_scope(&service, create_args, &args),
        Command::Ingest(ingest_args) => ingest(&service, ingest_args, &args),
        Command::Search(search_args) => search(&service, search_args, &args),
        Command::DeleteScope(delete_args) => delete_scope(&service, delete_args, &args),
        Command::List => list_scopes(&service, &args),
        Command::Stats(scope_args) => show_stats(&service, scope_args, &args),
    }
}

/// The CLI works on pre-computed vectors only, so its embedder has no table.
fn open_service(config: PixdexConfig) -> Result<SearchService> {
    let embedder = Arc::new(PrecomputedEmbedder::new(config.dimension));
    SearchService::open(config, embedder)
}

/// Create a scope's empty index.
fn create_scope(service: &SearchService, args: &CreateScopeArgs, cli_args: &PixdexArgs) -> Result<()> {
    let ScopeArgs { owner, collection } = args.scope;
    let created = if args.if_missing {
        service.ensure_scope(owner, collection)?
    } else {
        service.create_scope(owner, collection)?;
        true
    };

    let message = if created {
        "Index created successfully"
    } else {
        "Index already exists"
    };
    output_result(
        message,
        &ScopeCreationResult {
            owner_id: owner,
            collection_id: collection,
            created,
        },
        cli_args,
    )
}

/// Add the vectors of a JSONL file to one scope.
fn ingest(service: &SearchService, args: &IngestArgs, cli_args: &PixdexArgs) -> Result<()> {
    let ScopeArgs { owner, collection } = args.scope;
    let start = Instant::now();

    let (external_ids, vectors) = read_vector_records(&args.file)?;
    if cli_args.verbosity() > 1 {
        println!(
            "Read {} vectors from {}",
            vectors.len(),
            args.file.display()
        );
    }
    let vectors_added = service.ingest_vectors(owner, collection, &external_ids, &vectors)?;

    output_result(
        "Vectors added successfully",
        &IngestResult {
            owner_id: owner,
            collection_id: collection,
            vectors_added,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

/// Run a federated search.
fn search(service: &SearchService, args: &SearchArgs, cli_args: &PixdexArgs) -> Result<()> {
    let owners: OwnerMap = args.owners.parse()?;
    let query = read_query_vector(args)?;
    let k = args.top_k.unwrap_or(service.config().default_top_k);

    let start = Instant::now();
    let results = service.search_vector(&query, &args.collections, &owners, k)?;

    output_result(
        "Search completed",
        &SearchResults {
            hits: results.hits,
            stats: results.stats,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

/// Delete a scope's index.
fn delete_scope(service: &SearchService, args: &DeleteScopeArgs, cli_args: &PixdexArgs) -> Result<()> {
    let ScopeArgs { owner, collection } = args.scope;

    let (deleted, error) = if args.best_effort {
        match service.delete_scope_best_effort(owner, collection) {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        }
    } else {
        service.delete_scope(owner, collection)?;
        (true, None)
    };

    // A one-shot process only gets one retry pass.
    let mut retries_pending = service.pending_deletions().len();
    if retries_pending > 0 {
        let report = service.retry_failed_deletions();
        if report.failed > 0 {
            warn!("{} deletions still failing", report.failed);
        }
        retries_pending = service.pending_deletions().len();
    }

    let message = if deleted {
        "Index deleted"
    } else {
        "Index deletion failed"
    };
    output_result(
        message,
        &DeletionResult {
            owner_id: owner,
            collection_id: collection,
            deleted,
            error,
            retries_pending,
        },
        cli_args,
    )
}

/// List every scope with its vector count.
fn list_scopes(service: &SearchService, cli_args: &PixdexArgs) -> Result<()> {
    let mut scopes = Vec::new();
    for scope in service.list_scopes()? {
        let vectors = match service.count(scope.owner_id, scope.collection_id) {
            Ok(count) => count,
            Err(e) => {
                warn!("Cannot read {scope}: {e}");
                continue;
            }
        };
        scopes.push(ScopeSummary {
            owner_id: scope.owner_id,
            collection_id: scope.collection_id,
            vectors,
        });
    }

    output_result("Indexes", &ScopeListing { scopes }, cli_args)
}

/// Show statistics of one scope.
fn show_stats(service: &SearchService, args: &ScopeArgs, cli_args: &PixdexArgs) -> Result<()> {
    let scope = Scope::new(args.owner, args.collection);
    let vectors = service.count(scope.owner_id, scope.collection_id)?;
    let storage_key = scope.storage_key();
    let artifact_bytes = service.store().storage().file_size(&storage_key)?;

    output_result(
        "Index Statistics",
        &ScopeStats {
            owner_id: scope.owner_id,
            collection_id: scope.collection_id,
            storage_key,
            vectors,
            dimension: service.config().dimension,
            artifact_bytes,
            cache: service.cache_stats(),
        },
        cli_args,
    )
}

/// Read `{"external_id": .., "vector": [..]}` lines, skipping blank ones.
fn read_vector_records(path: &Path) -> Result<(Vec<i64>, Vec<Vec<f32>>)> {
    let file = File::open(path).map_err(|e| {
        PixdexError::invalid_argument(format!("cannot open {}: {e}", path.display()))
    })?;
    let reader = BufReader::new(file);

    let mut external_ids = Vec::new();
    let mut vectors = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: VectorRecord = serde_json::from_str(line).map_err(|e| {
            PixdexError::invalid_argument(format!(
                "{}:{}: {e}",
                path.display(),
                line_num + 1
            ))
        })?;
        external_ids.push(record.external_id);
        vectors.push(record.vector);
    }

    Ok((external_ids, vectors))
}

fn read_query_vector(args: &SearchArgs) -> Result<Vec<f32>> {
    let json = match (&args.vector, &args.vector_json) {
        (Some(path), _) => std::fs::read_to_string(path)?,
        (None, Some(json)) => json.clone(),
        (None, None) => {
            return Err(PixdexError::invalid_argument(
                "a query vector is required (--vector or --vector-json)",
            ));
        }
    };
    Ok(serde_json::from_str(&json)?)
}
