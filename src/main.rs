//! Repocache CLI - build and inspect package metadata caches

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use repocache::builder::{self, BuildOutcome};
use repocache::config::{self, RepoCacheConfig};
use repocache::query::{self, CacheStats};
use repocache::storage::{self, CacheStore, SchemaKind};
use repocache::ui::{self, Icons};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "repocache")]
#[command(version)]
#[command(about = "SQLite cache of package repository metadata")]
#[command(long_about = r#"
Repocache keeps repository metadata in per-kind SQLite files:
  • primary.sqlite    packages, dependencies, files
  • filelists.sqlite  compacted per-directory file lists
  • other.sqlite      changelogs

A cache file is only rewritten when the checksum of the metadata changes.

Example usage:
  repocache init --dir /var/cache/repocache
  repocache build --kind primary --input packages.json
  repocache status --kind primary --input packages.json
  repocache files --pkg-id 3f2a...
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a repocache.toml with the default settings
    Init {
        /// Directory holding the cache files
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Build or refresh a cache file from a JSON package document
    Build {
        /// Schema kind (primary, filelists, other)
        #[arg(short, long)]
        kind: String,

        /// JSON document holding an array of packages
        #[arg(short, long)]
        input: PathBuf,

        /// Cache file prefix (defaults to the kind name)
        #[arg(short, long)]
        prefix: Option<String>,

        /// Directory holding the cache files
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Checksum of the metadata (defaults to the BLAKE3 digest of the input)
        #[arg(long)]
        checksum: Option<String>,
    },

    /// Report whether a cache file is current, without touching it
    Status {
        /// Schema kind (primary, filelists, other)
        #[arg(short, long)]
        kind: String,

        /// JSON document the checksum is computed from
        #[arg(short, long, required_unless_present = "checksum")]
        input: Option<PathBuf>,

        /// Expected checksum
        #[arg(long)]
        checksum: Option<String>,

        /// Cache file prefix (defaults to the kind name)
        #[arg(short, long)]
        prefix: Option<String>,

        /// Directory holding the cache files
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Show row counts of a cache file
    Stats {
        /// Schema kind (primary, filelists, other)
        #[arg(short, long)]
        kind: String,

        /// Cache file prefix (defaults to the kind name)
        #[arg(short, long)]
        prefix: Option<String>,

        /// Directory holding the cache files
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// List the decoded file list of a package from a filelists cache
    Files {
        /// Package id
        #[arg(long)]
        pkg_id: String,

        /// Cache file prefix
        #[arg(short, long, default_value = "filelists")]
        prefix: String,

        /// Directory holding the cache files
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

fn cache_path(config: &RepoCacheConfig, dir: Option<PathBuf>, prefix: &str) -> PathBuf {
    dir.unwrap_or_else(|| config.cache_dir())
        .join(storage::db_filename(prefix))
}

fn input_checksum(input: &Path) -> anyhow::Result<(String, Vec<u8>)> {
    let bytes = std::fs::read(input)?;
    Ok((repocache::output::content_checksum(&bytes), bytes))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let quiet = config.quiet.unwrap_or(false) || repocache::output::is_quiet();
    let store = CacheStore::new();

    match cli.command {
        Commands::Init { dir, force } => {
            let path = cli.config.clone().unwrap_or_else(config::default_config_path);
            let new_config = RepoCacheConfig {
                cache_dir: dir.map(|d| d.display().to_string()),
                quiet: None,
            };
            config::write_config(&path, &new_config, force)?;
            if !quiet {
                ui::success(&format!("Wrote {}", path.display()));
            }
        }

        Commands::Build { kind, input, prefix, dir, checksum } => {
            let kind: SchemaKind = kind.parse()?;
            let path = cache_path(&config, dir, prefix.as_deref().unwrap_or(kind.default_prefix()));
            if let Some(parent) = path.parent() {
                config::ensure_cache_dir(parent)?;
            }

            let (computed, bytes) = input_checksum(&input)?;
            let checksum = checksum.unwrap_or(computed);
            let started = Instant::now();

            // Only parse the document when the cache actually needs it
            let status = store.status(&path, &checksum, kind)?;
            let outcome = if status.rebuild_scope().is_none() {
                BuildOutcome::Current
            } else {
                let packages = repocache::package::parse_packages(std::str::from_utf8(&bytes)?)?;
                tracing::debug!("Loaded {} packages from {}", packages.len(), input.display());
                builder::rebuild(&store, &path, &checksum, kind, &packages)?
            };

            if !quiet {
                ui::header(&format!("{} cache", kind));
                ui::status(Icons::DATABASE, "Database", &path.display().to_string());
                ui::status(Icons::PACKAGE, "Checksum", &checksum);
                match outcome {
                    BuildOutcome::Current => ui::success("Cache is up to date"),
                    BuildOutcome::Built { scope, report } => {
                        ui::status(Icons::WRENCH, "Rebuild", &format!("{:?}", scope).to_lowercase());
                        println!("{}", ui::report_table(&report));
                        if report.rows.dropped > 0 {
                            ui::warn(&format!("{} rows could not be written", report.rows.dropped));
                        }
                        ui::success("Cache stamped");
                    }
                }
                ui::timing(&format!("{:.2?}", started.elapsed()));
            }
        }

        Commands::Status { kind, input, checksum, prefix, dir } => {
            let kind: SchemaKind = kind.parse()?;
            let path = cache_path(&config, dir, prefix.as_deref().unwrap_or(kind.default_prefix()));
            let checksum = match (checksum, input) {
                (Some(checksum), _) => checksum,
                (None, Some(input)) => input_checksum(&input)?.0,
                (None, None) => anyhow::bail!("either --input or --checksum is required"),
            };

            let status = store.status(&path, &checksum, kind)?;
            if quiet {
                println!("{}", status);
            } else {
                ui::cache_status(&path.display().to_string(), &status);
                if let Some(stamp) = storage::read_stamp(&path).ok().flatten() {
                    ui::status(Icons::INFO, "Stored version", &stamp.format_version.to_string());
                    ui::status(Icons::INFO, "Stored checksum", &stamp.checksum);
                }
            }
        }

        Commands::Stats { kind, prefix, dir } => {
            let kind: SchemaKind = kind.parse()?;
            let path = cache_path(&config, dir, prefix.as_deref().unwrap_or(kind.default_prefix()));
            if !path.exists() {
                anyhow::bail!("no cache at {}", path.display());
            }

            let conn = storage::open_read_only(&path)?;
            let stats = CacheStats::collect(&conn, kind)?;
            if quiet {
                println!("{}", stats);
            } else {
                ui::section(&format!("{} {}", Icons::STATS, path.display()));
                println!("{}", ui::stats_table(&stats));
            }
        }

        Commands::Files { pkg_id, prefix, dir } => {
            let path = cache_path(&config, dir, &prefix);
            if !path.exists() {
                anyhow::bail!("no cache at {}", path.display());
            }

            let conn = storage::open_read_only(&path)?;
            let Some(pkg_key) = query::package_key(&conn, &pkg_id)? else {
                anyhow::bail!("package {} is not in {}", pkg_id, path.display());
            };

            let files = query::package_files(&conn, pkg_key)?;
            if files.is_empty() && !quiet {
                ui::warn("Package has no files");
            }
            for file in files {
                if quiet {
                    println!("{}\t{}", file.kind, file.path);
                } else {
                    ui::file_entry(&file.path, file.kind);
                }
            }
        }
    }

    Ok(())
}
