use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

use mbk_cache::{CacheLookup, EntitlementCache};
use mbk_config::{check_unknown_keys, load_layered_yaml, UnknownKeyPolicy};

mod simulate;

#[derive(Parser)]
#[command(name = "mbk")]
#[command(about = "MemberKit entitlement engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Entitlement cache utilities
    Cache {
        #[command(subcommand)]
        cmd: CacheCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> platform -> local overrides)
        #[arg(required = true)]
        paths: Vec<String>,

        /// Fail (exit non-zero) on config keys the engine never reads
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Run the engine against scripted sources and print its decisions
    Simulate {
        /// One of: trial | active | lifetime | flicker | outage
        #[arg(long, default_value = "trial")]
        scenario: String,
    },
}

#[derive(Subcommand)]
enum CacheCmd {
    /// Print the on-disk record and its freshness classification
    Show {
        /// Cache file path
        #[arg(long)]
        path: String,

        /// User id to validate the record against
        #[arg(long)]
        user: String,

        /// Trust window in hours
        #[arg(long, default_value_t = mbk_cache::DEFAULT_MAX_CACHE_AGE_HOURS)]
        max_age_hours: i64,
    },

    /// Remove the on-disk record
    Clear {
        /// Cache file path
        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev-time env loading; a missing .env file is fine.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Cache { cmd } => run_cache(cmd),
        Commands::ConfigHash { paths, strict } => run_config_hash(&paths, strict),
        Commands::Simulate { scenario } => simulate::run(&scenario).await,
    }
}

fn run_cache(cmd: CacheCmd) -> Result<()> {
    match cmd {
        CacheCmd::Show {
            path,
            user,
            max_age_hours,
        } => {
            let cache = EntitlementCache::new(&path);
            let lookup = cache.load(&user, Utc::now(), Duration::hours(max_age_hours));
            match &lookup {
                CacheLookup::Fresh(rec) => {
                    println!("freshness: FRESH (age {} ms)", rec.age_ms(Utc::now()));
                    println!("{}", serde_json::to_string_pretty(rec)?);
                }
                CacheLookup::StaleAged(rec) => {
                    println!(
                        "freshness: STALE (age {} ms > {} h) — hint only, not trusted",
                        rec.age_ms(Utc::now()),
                        max_age_hours
                    );
                    println!("{}", serde_json::to_string_pretty(rec)?);
                }
                CacheLookup::UserMismatch => {
                    println!("freshness: USER_MISMATCH — record belongs to another user");
                }
                CacheLookup::Missing => {
                    println!("freshness: MISSING — no readable record at {path}");
                }
            }
            Ok(())
        }
        CacheCmd::Clear { path } => {
            EntitlementCache::new(&path)
                .clear()
                .with_context(|| format!("clear cache at {path}"))?;
            println!("cleared {path}");
            Ok(())
        }
    }
}

fn run_config_hash(paths: &[String], strict: bool) -> Result<()> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = load_layered_yaml(&path_refs)?;

    let policy = if strict {
        UnknownKeyPolicy::Fail
    } else {
        UnknownKeyPolicy::Warn
    };
    let unknown = check_unknown_keys(&loaded.config_json, policy)?;
    for key in &unknown {
        tracing::warn!(%key, "config key the engine never reads");
    }

    // Parse the typed view so structural problems surface here, not at
    // engine start on a device.
    loaded.engine_config()?.validate()?;

    println!("config_hash: {}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}
