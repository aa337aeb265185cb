//! CLI argument definitions for the filmshelf binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use filmshelf_core::types::{Audience, ContentKind};

/// Filmshelf - a personal film collection backed by a cached metadata provider.
#[derive(Parser, Debug)]
#[command(name = "filmshelf", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Provider access key.
    #[arg(long = "api-key", global = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search titles by name.
    Search {
        query: String,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long = "type")]
        kind: Option<ContentKind>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show full metadata for an external id.
    Show {
        id: String,
        /// Re-fetch even if the cached copy is fresh.
        #[arg(long)]
        refresh: bool,
    },
    /// Look up full metadata by exact title.
    Lookup {
        title: String,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Add a title to the collection.
    Add(AddArgs),
    /// List collection entries.
    List {
        #[arg(long, conflicts_with = "unwatched")]
        watched: bool,
        #[arg(long)]
        unwatched: bool,
    },
    /// Rate a collection entry from 0 to 10.
    Rate { id: String, value: f64 },
    /// Mark a collection entry watched.
    Watched {
        id: String,
        /// Watch date (YYYY-MM-DD). Defaults to now.
        #[arg(long, conflicts_with = "undo")]
        date: Option<NaiveDate>,
        /// Mark the entry unwatched instead.
        #[arg(long)]
        undo: bool,
    },
    /// Remove a title from the collection.
    Remove { id: String },
    /// Inspect or maintain the metadata cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub id: String,
    #[arg(long)]
    pub rating: Option<f64>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long)]
    pub audience: Option<Audience>,
    #[arg(long = "recommended-by")]
    pub recommended_by: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show cache statistics.
    Stats,
    /// Remove records fetched more than N days ago.
    Prune {
        #[arg(long)]
        days: i64,
    },
    /// Remove every cached metadata record.
    Clear,
}

impl Command {
    /// Whether the command may need the upstream provider.
    pub fn needs_provider(&self) -> bool {
        matches!(
            self,
            Command::Search { .. } | Command::Show { .. } | Command::Lookup { .. } | Command::Add(_)
        )
    }
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > FILMSHELF_CONFIG env var > ~/.filmshelf/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("FILMSHELF_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the provider access key.
    ///
    /// Priority: --api-key flag > FILMSHELF_API_KEY env var > config file value.
    pub fn resolve_api_key(&self, config_key: &str) -> String {
        if let Some(ref key) = self.api_key {
            return key.clone();
        }
        match std::env::var("FILMSHELF_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => config_key.to_string(),
        }
    }

    /// Data directory override, if given.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".filmshelf").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".filmshelf").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let args = CliArgs::try_parse_from([
            "filmshelf", "search", "batman", "--year", "1989", "--type", "movie", "--page", "2",
        ])
        .unwrap();
        match args.command {
            Command::Search {
                query,
                year,
                kind,
                page,
            } => {
                assert_eq!(query, "batman");
                assert_eq!(year, Some(1989));
                assert_eq!(kind, Some(ContentKind::Movie));
                assert_eq!(page, 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_add_with_global_flags() {
        let args = CliArgs::try_parse_from([
            "filmshelf",
            "add",
            "tt0468569",
            "--rating",
            "9",
            "--audience",
            "teens",
            "--data-dir",
            "/tmp/shelf",
        ])
        .unwrap();
        assert_eq!(args.resolve_data_dir().as_deref(), Some("/tmp/shelf"));
        assert!(args.command.needs_provider());
        match args.command {
            Command::Add(add) => {
                assert_eq!(add.id, "tt0468569");
                assert_eq!(add.rating, Some(9.0));
                assert_eq!(add.audience, Some(Audience::Teens));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_cache_prune() {
        let args = CliArgs::try_parse_from(["filmshelf", "cache", "prune", "--days", "60"]).unwrap();
        assert!(!args.command.needs_provider());
        assert!(matches!(
            args.command,
            Command::Cache {
                action: CacheCommand::Prune { days: 60 }
            }
        ));
    }

    #[test]
    fn test_watched_flags_conflict() {
        assert!(CliArgs::try_parse_from(["filmshelf", "list", "--watched", "--unwatched"]).is_err());
        assert!(CliArgs::try_parse_from([
            "filmshelf", "watched", "tt1", "--date", "2024-01-01", "--undo"
        ])
        .is_err());
        let args =
            CliArgs::try_parse_from(["filmshelf", "watched", "tt1", "--date", "2024-01-01"]).unwrap();
        match args.command {
            Command::Watched { date, undo, .. } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 1));
                assert!(!undo);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_api_key_flag_wins() {
        let args =
            CliArgs::try_parse_from(["filmshelf", "--api-key", "abc123", "show", "tt1"]).unwrap();
        assert_eq!(args.resolve_api_key("from-config"), "abc123");
    }

    #[test]
    fn test_explicit_config_path() {
        let args =
            CliArgs::try_parse_from(["filmshelf", "-c", "/etc/filmshelf.toml", "cache", "stats"])
                .unwrap();
        assert_eq!(
            args.resolve_config_path(),
            PathBuf::from("/etc/filmshelf.toml")
        );
    }
}
