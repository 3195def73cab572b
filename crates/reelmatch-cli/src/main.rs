use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use reelmatch_core::{FusionConfig, MatchConfig, MatchResult, RatingScale};
use reelmatch_sources::{
    Cached, RatingSource, Reconciler, RetryPolicy, Retrying, Snapshot, SnapshotSource,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod display;

/// Match catalog movies to live rating sources and reconcile their scores.
#[derive(Parser, Debug)]
#[command(name = "reelmatch", version)]
struct Cli {
    #[command(flatten)]
    tuning: Tuning,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the normalised form of a title.
    Normalize { title: String },

    /// Print the similarity breakdown for two titles.
    Score { a: String, b: String },

    /// Resolve catalog entities against one snapshot source.
    Resolve {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        snapshot: PathBuf,
        /// Source name inside the snapshot.
        #[arg(long)]
        source: String,
        /// Only resolve entities with this (normalised) title.
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Run the full pipeline over a catalog: resolve, fetch, fuse.
    Reconcile {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Entities reconciled at once.
        #[arg(long, default_value_t = 4, env = "REELMATCH_CONCURRENCY")]
        concurrency: usize,
        /// Reference time for freshness (RFC 3339). Defaults to now.
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
}

/// Matching and fusion knobs, shared by every subcommand.
#[derive(Args, Debug)]
struct Tuning {
    /// Minimum candidate score to accept a match.
    #[arg(long, global = true, default_value_t = 0.7, env = "REELMATCH_THRESHOLD")]
    threshold: f64,

    /// Largest release-year difference treated as the same film.
    #[arg(long, global = true, default_value_t = 2, env = "REELMATCH_YEAR_TOLERANCE")]
    year_tolerance: u32,

    #[arg(long, global = true, default_value_t = 0.1, env = "REELMATCH_YEAR_BONUS")]
    year_bonus: f64,

    #[arg(long, global = true, default_value_t = 7, env = "REELMATCH_FRESHNESS_WINDOW_DAYS")]
    freshness_window_days: i64,

    #[arg(long, global = true, default_value_t = 30, env = "REELMATCH_AGE_GAP_DAYS")]
    age_gap_days: i64,

    /// Baseline/live gap that flags an anomaly.
    #[arg(long, global = true, default_value_t = 1.0, env = "REELMATCH_DIVERGENCE_THRESHOLD")]
    divergence_threshold: f64,

    /// Retries per source call on transient failures.
    #[arg(long, global = true, default_value_t = 2, env = "REELMATCH_RETRIES")]
    retries: u32,

    /// Minimum pause between calls to one source, in milliseconds.
    #[arg(long, global = true, default_value_t = 0, env = "REELMATCH_MIN_INTERVAL_MS")]
    min_interval_ms: u64,

    /// How long cached search results and ratings stay valid, in seconds.
    #[arg(long, global = true, default_value_t = 3600, env = "REELMATCH_CACHE_TTL_SECS")]
    cache_ttl_secs: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

const CACHE_CAPACITY: usize = 4096;

impl Tuning {
    fn match_config(&self) -> anyhow::Result<MatchConfig> {
        let config = MatchConfig {
            threshold: self.threshold,
            year_tolerance: self.year_tolerance,
            year_bonus: self.year_bonus,
        };
        config.validate().context("invalid match settings")?;
        Ok(config)
    }

    fn fusion_config(&self) -> anyhow::Result<FusionConfig> {
        let config = FusionConfig {
            freshness_window_days: self.freshness_window_days,
            age_gap_days: self.age_gap_days,
            divergence_threshold: self.divergence_threshold,
            scale: RatingScale::default(),
        };
        config.validate().context("invalid fusion settings")?;
        Ok(config)
    }

    /// Wrap a snapshot source in the cache and retry layers.
    fn wrap(&self, source: SnapshotSource) -> anyhow::Result<Box<dyn RatingSource>> {
        let policy = RetryPolicy {
            max_attempts: self.retries.saturating_add(1),
            ..Default::default()
        };
        let retrying = Retrying::new(source, policy)
            .context("invalid retry settings")?
            .with_min_interval(Duration::from_millis(self.min_interval_ms));
        Ok(Box::new(Cached::new(
            retrying,
            Duration::from_secs(self.cache_ttl_secs),
            CACHE_CAPACITY,
        )))
    }
}

#[derive(Serialize)]
struct ResolvedEntity<'a> {
    entity: &'a str,
    source: &'a str,
    result: MatchResult,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelmatch=info,reelmatch_sources=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Normalize { title } => {
            println!("{}", reelmatch_core::normalize(&title));
        }
        Command::Score { a, b } => {
            let breakdown = reelmatch_core::score_breakdown(&a, &b);
            display::print_breakdown(&a, &b, &breakdown)?;
        }
        Command::Resolve {
            catalog,
            snapshot,
            source,
            title,
            format,
        } => {
            let config = cli.tuning.match_config()?;
            let entities = catalog::load_catalog(&catalog)?;
            let selected = match &title {
                Some(t) => catalog::select(&entities, t),
                None => entities.iter().collect(),
            };
            if selected.is_empty() {
                bail!("no catalog entity matches {:?}", title.unwrap_or_default());
            }

            let snapshot = Snapshot::load(&snapshot)
                .await
                .with_context(|| format!("loading snapshot {}", snapshot.display()))?;
            let Some(adapter) = snapshot.source(&source) else {
                let known: Vec<&str> = snapshot.source_names().collect();
                bail!("snapshot has no source {source:?} (has: {})", known.join(", "));
            };
            let adapter = cli.tuning.wrap(adapter)?;

            let mut resolved = Vec::with_capacity(selected.len());
            for entity in selected {
                let candidates = adapter
                    .search(&entity.title, entity.release_year)
                    .await
                    .with_context(|| format!("searching {source} for {}", entity.label()))?;
                let result = reelmatch_core::resolve(entity, &candidates, &config)
                    .with_context(|| format!("resolving {}", entity.label()))?;
                resolved.push(ResolvedEntity {
                    entity: entity.label(),
                    source: &source,
                    result,
                });
            }

            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&resolved)?),
                Format::Text => {
                    for r in &resolved {
                        display::print_match(r.entity, r.source, &r.result)?;
                    }
                }
            }
        }
        Command::Reconcile {
            catalog,
            snapshot,
            format,
            concurrency,
            now,
        } => {
            let entities = catalog::load_catalog(&catalog)?;
            let snapshot = Snapshot::load(&snapshot)
                .await
                .with_context(|| format!("loading snapshot {}", snapshot.display()))?;

            let mut reconciler =
                Reconciler::new(cli.tuning.match_config()?, cli.tuning.fusion_config()?)
                    .with_concurrency(concurrency);
            for source in snapshot.into_sources() {
                reconciler.add_source(cli.tuning.wrap(source)?);
            }
            let now = now.unwrap_or_else(Utc::now);
            info!(
                entities = entities.len(),
                sources = ?reconciler.source_names(),
                %now,
                "reconciling catalog"
            );

            let report = reconciler.reconcile_catalog(&entities, now).await;
            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                Format::Text => {
                    for entity_report in &report.reports {
                        display::print_report_card(entity_report)?;
                    }
                    display::print_summary(&report.summary, &report.rejected)?;
                }
            }
        }
    }
    Ok(())
}
