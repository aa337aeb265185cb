//! Filmshelf application binary - composition root.
//!
//! 1. Parse the CLI and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite database and build the metadata store
//! 4. Wire the provider, cache orchestrator and collection store
//! 5. Run one command and print its result as JSON

mod cli;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;

use filmshelf_catalog::{CacheOrchestrator, CatalogError, CollectionStore};
use filmshelf_core::config::FilmshelfConfig;
use filmshelf_core::types::{CollectionEntry, EntrySeed, MetadataRecord};
use filmshelf_provider::{OmdbClient, SearchQuery};
use filmshelf_storage::{CollectionRepository, Database, MetadataStore, SqliteMetadataStore};

use cli::{AddArgs, CacheCommand, CliArgs, Command};

/// A collection entry with whatever metadata is already cached for it.
#[derive(Serialize)]
struct EntryView {
    #[serde(flatten)]
    entry: CollectionEntry,
    metadata: Option<MetadataRecord>,
}

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn find_entry(
    collection: &CollectionStore,
    external_id: &str,
) -> Result<CollectionEntry, CatalogError> {
    collection
        .get(external_id)
        .await?
        .ok_or_else(|| CatalogError::EntryNotFound(external_id.to_string()))
}

async fn with_metadata(
    store: &dyn MetadataStore,
    entries: Vec<CollectionEntry>,
) -> Vec<EntryView> {
    let mut views = Vec::with_capacity(entries.len());
    for entry in entries {
        let metadata = store.get(&entry.external_id).await;
        views.push(EntryView { entry, metadata });
    }
    views
}

async fn run_add(collection: &CollectionStore, args: AddArgs) -> Result<(), Box<dyn Error>> {
    let seed = EntrySeed {
        rating: args.rating,
        audience: args.audience,
        notes: args.notes,
        recommended_by: args.recommended_by,
    };
    let entry = collection.add(&args.id, Some(seed)).await?;
    print_json(&entry)
}

async fn run_cache(
    store: &dyn MetadataStore,
    action: CacheCommand,
    freshness_days: i64,
) -> Result<(), Box<dyn Error>> {
    match action {
        CacheCommand::Stats => print_json(&store.stats(freshness_days).await?),
        CacheCommand::Prune { days } => {
            let removed = store.remove_older_than(days).await?;
            tracing::info!(removed, days, "Pruned metadata cache");
            print_json(&serde_json::json!({ "removed": removed }))
        }
        CacheCommand::Clear => {
            let removed = store.clear().await?;
            tracing::info!(removed, "Cleared metadata cache");
            print_json(&serde_json::json!({ "removed": removed }))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = FilmshelfConfig::load_or_default(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }
    config.provider.api_key = args.resolve_api_key(&config.provider.api_key);

    // Tracing. Stdout carries command output, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    let db_path = data_dir.join("filmshelf.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::debug!(path = %db_path.display(), "SQLite database opened");

    let store: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(Arc::clone(&db)));

    // Provider and cache.
    if args.command.needs_provider() && config.provider.api_key.trim().is_empty() {
        tracing::warn!("No provider access key configured; set FILMSHELF_API_KEY or --api-key");
    }
    let provider = Arc::new(OmdbClient::from_config(&config.provider)?);
    let orchestrator = Arc::new(CacheOrchestrator::new(
        Arc::clone(&store),
        provider,
        &config.cache,
    ));

    let mut collection = CollectionStore::new(CollectionRepository::new(Arc::clone(&db)))?;
    if config.collection.warm_on_add {
        collection = collection.with_warmer(orchestrator.clone());
    }

    match args.command {
        Command::Search {
            query,
            year,
            kind,
            page,
        } => {
            let mut query = SearchQuery::new(query).with_page(page);
            if let Some(year) = year {
                query = query.with_year(year);
            }
            if let Some(kind) = kind {
                query = query.with_kind(kind);
            }
            print_json(&orchestrator.search(&query).await?)
        }
        Command::Show { id, refresh } => {
            if refresh {
                print_json(&orchestrator.refresh(&id).await?)
            } else {
                let resolved = orchestrator.resolve_by_id_traced(&id).await?;
                tracing::info!(external_id = %id, source = ?resolved.source, "Resolved metadata");
                print_json(&resolved.record)
            }
        }
        Command::Lookup { title, year } => {
            print_json(&orchestrator.resolve_by_title(&title, year).await?)
        }
        Command::Add(add) => run_add(&collection, add).await,
        Command::List { watched, unwatched } => {
            let entries = if watched {
                collection.list_watched().await?
            } else if unwatched {
                collection.list_unwatched().await?
            } else {
                collection.list_all().await?
            };
            print_json(&with_metadata(store.as_ref(), entries).await)
        }
        Command::Rate { id, value } => {
            let entry = find_entry(&collection, &id).await?;
            print_json(&collection.rate(&entry, value).await?)
        }
        Command::Watched { id, date, undo } => {
            let entry = find_entry(&collection, &id).await?;
            let updated = if undo {
                collection.mark_unwatched(&entry).await?
            } else {
                let date: Option<DateTime<Utc>> = date
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc());
                collection.mark_watched(&entry, date).await?
            };
            print_json(&updated)
        }
        Command::Remove { id } => {
            let entry = find_entry(&collection, &id).await?;
            collection.delete(&entry).await?;
            print_json(&serde_json::json!({ "removed": entry.external_id }))
        }
        Command::Cache { action } => {
            run_cache(store.as_ref(), action, config.cache.freshness_days).await
        }
    }
}
