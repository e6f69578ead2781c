//! Command implementations for the rankopt binary.
//!
//! Every command opens the job store directly; the scheduler process and
//! this binary can share one database path only while the scheduler is
//! not running, since RocksDB takes an exclusive lock.

use std::fs;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use rankopt_scheduler::OptimizationPolicy;
use rankopt_storage::{StartJob, Storage};
use rankopt_types::{Metadata, OptimizationJob, Settings, TrackedEntity};

use crate::cli::{AdminCommands, Cli, Commands, KeywordCommands};

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(db_path) = &cli.db_path {
        settings.db_path = db_path.clone();
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    Ok(settings)
}

/// Initialize logging to stderr; `RUST_LOG` wins over the configured level.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

pub fn open_storage(settings: &Settings) -> Result<Storage> {
    let db_path = settings.expanded_db_path();
    info!("Opening storage at {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    Storage::open(&db_path).context("Failed to open storage")
}

/// Entry point used by `main`.
pub fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    init_logging(&settings)?;

    let storage = open_storage(&settings)?;
    let policy = OptimizationPolicy::from(&settings.policy);
    execute(&storage, &policy, cli.json, cli.command)
}

/// Run one command against an open store.
pub fn execute(
    storage: &Storage,
    policy: &OptimizationPolicy,
    json: bool,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Track {
            entity_id,
            topic,
            title,
            tags,
            description,
            target_rank,
            rank,
        } => {
            let mut request = StartJob::new(&entity_id)
                .with_topic(topic)
                .with_metadata(Metadata::new(title, tags, description));
            if let Some(target) = target_rank {
                request = request.with_target_rank(target);
            }
            if let Some(rank) = rank {
                request = request.with_current_rank(rank);
            }
            let (job, created) = storage
                .start_job(request)
                .with_context(|| format!("Failed to track {}", entity_id))?;
            emit(json, &job, |job| {
                let verb = if created { "Tracking" } else { "Restarted" };
                println!("{} {} (job {})", verb, job.entity_id, job.job_id);
            })
        }

        Commands::Start {
            entity_id,
            target_rank,
            rank,
            topic,
        } => {
            if storage.get_job_for_entity(&entity_id)?.is_none() {
                bail!("{} is not tracked; use `rankopt track` first", entity_id);
            }
            let mut request = StartJob::new(&entity_id);
            if let Some(target) = target_rank {
                request = request.with_target_rank(target);
            }
            if let Some(rank) = rank {
                request = request.with_current_rank(rank);
            }
            if let Some(topic) = topic {
                request = request.with_topic(topic);
            }
            let (job, _) = storage.start_job(request)?;
            emit(json, &job, |job| {
                println!("Started job {} for {}", job.job_id, job.entity_id)
            })
        }

        Commands::Stop { entity_id } => {
            let job = require_job(storage, &entity_id)?;
            let job = storage.stop_job(&job.job_id)?;
            emit(json, &job, |job| {
                println!("Stopped job {} for {}", job.job_id, job.entity_id)
            })
        }

        Commands::Status { entity_id } => show_entity_status(storage, policy, json, &entity_id),

        Commands::Ranks { entity_id, limit } => {
            let job = require_job(storage, &entity_id)?;
            let samples = storage.rank_history(&job.job_id, Some(limit))?;
            emit(json, &samples, |samples| {
                if samples.is_empty() {
                    println!("No rank samples for {}", entity_id);
                }
                for sample in samples {
                    println!("{}  #{}", format_time(sample.observed_at), sample.rank);
                }
            })
        }

        Commands::Versions { entity_id } => {
            let job = require_job(storage, &entity_id)?;
            let versions = storage.version_history(&job.job_id)?;
            emit(json, &versions, |versions| {
                if versions.is_empty() {
                    println!("No versions applied to {}", entity_id);
                }
                for v in versions {
                    println!(
                        "v{}{}  {}  before={} after={}",
                        v.version,
                        if v.is_active { " (active)" } else { "" },
                        format_time(v.created_at),
                        format_rank(v.rank_before),
                        format_rank(v.rank_after),
                    );
                    println!("    title: {}", v.metadata.title);
                    if !v.metadata.tags.is_empty() {
                        println!("    tags: {}", v.metadata.tags.join(", "));
                    }
                    if let Some(reasoning) = &v.reasoning {
                        println!("    reasoning: {}", reasoning);
                    }
                }
            })
        }

        Commands::Keyword { command } => handle_keyword(storage, json, command),

        Commands::Jobs { status } => {
            let jobs = storage.list_jobs(status.as_status())?;
            emit(json, &jobs, |jobs| {
                if jobs.is_empty() {
                    println!("No jobs");
                }
                for job in jobs {
                    println!(
                        "{}  {:<8} {}  rank={}",
                        job.job_id,
                        job.status.to_string(),
                        job.entity_id,
                        format_rank(job.current_rank)
                    );
                }
            })
        }

        Commands::Untrack { entity_id, yes } => {
            if !yes {
                bail!(
                    "Refusing to delete {} and its history without --yes",
                    entity_id
                );
            }
            if !storage.untrack_entity(&entity_id)? {
                bail!("{} is not tracked", entity_id);
            }
            println!("Untracked {}", entity_id);
            Ok(())
        }

        Commands::Admin { command } => handle_admin(storage, json, command),
    }
}

fn handle_keyword(storage: &Storage, json: bool, command: KeywordCommands) -> Result<()> {
    match command {
        KeywordCommands::Add { entity_id, keyword } => {
            let tracked = storage.add_keyword(&entity_id, &keyword)?;
            emit(json, &tracked, |k| {
                println!("Tracking keyword \"{}\" for {}", k.keyword, k.entity_id)
            })
        }
        KeywordCommands::Remove { entity_id, keyword } => {
            if !storage.remove_keyword(&entity_id, &keyword)? {
                bail!("Keyword \"{}\" is not tracked for {}", keyword, entity_id);
            }
            println!("Removed keyword \"{}\" from {}", keyword, entity_id);
            Ok(())
        }
        KeywordCommands::List { entity_id } => {
            let keywords = storage.list_keywords(&entity_id)?;
            emit(json, &keywords, |keywords| {
                if keywords.is_empty() {
                    println!("No keywords for {}", entity_id);
                }
                for k in keywords {
                    println!(
                        "{:<40} rank={}  checked={}",
                        k.keyword,
                        format_rank(k.current_rank),
                        k.last_checked_at
                            .map(format_time)
                            .unwrap_or_else(|| "never".to_string())
                    );
                }
            })
        }
        KeywordCommands::History {
            entity_id,
            keyword,
            limit,
        } => {
            let samples = storage.keyword_history(&entity_id, &keyword, Some(limit))?;
            emit(json, &samples, |samples| {
                for sample in samples {
                    println!("{}  #{}", format_time(sample.observed_at), sample.rank);
                }
            })
        }
    }
}

fn handle_admin(storage: &Storage, json: bool, command: AdminCommands) -> Result<()> {
    match command {
        AdminCommands::Stats => {
            let stats = storage.get_stats()?;
            emit(json, &stats, |stats| {
                println!("Database Statistics");
                println!("===================");
                println!("Entities:        {}", stats.entity_count);
                println!(
                    "Jobs:            {} ({} active)",
                    stats.job_count, stats.active_job_count
                );
                println!("Versions:        {}", stats.version_count);
                println!("Rank samples:    {}", stats.rank_sample_count);
                println!("Keywords:        {}", stats.keyword_count);
                println!("Keyword samples: {}", stats.keyword_sample_count);
                println!(
                    "Disk usage:      {:.2} MB",
                    stats.disk_usage_bytes as f64 / (1024.0 * 1024.0)
                );
            })
        }
        AdminCommands::Compact { cf } => {
            match cf {
                Some(name) => {
                    storage.compact_cf(&name)?;
                    println!("Compacted column family {}", name);
                }
                None => {
                    storage.compact()?;
                    println!("Compacted all column families");
                }
            }
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct EntityStatus<'a> {
    job: &'a OptimizationJob,
    entity: &'a TrackedEntity,
    active_version: Option<u32>,
    next_decision: rankopt_scheduler::Decision,
}

fn show_entity_status(
    storage: &Storage,
    policy: &OptimizationPolicy,
    json: bool,
    entity_id: &str,
) -> Result<()> {
    let job = require_job(storage, entity_id)?;
    let (job, entity) = storage.load_job_and_entity(&job.job_id)?;
    let active = storage.active_version(&job.job_id)?;
    let decision = policy.decide(
        entity.current_rank,
        entity.target_rank,
        entity.last_optimized_at,
        entity.optimization_count,
        Utc::now(),
    );

    let status = EntityStatus {
        job: &job,
        entity: &entity,
        active_version: active.as_ref().map(|v| v.version),
        next_decision: decision,
    };
    emit(json, &status, |s| {
        println!("{} ({})", s.entity.entity_id, s.job.status);
        println!("  job:          {}", s.job.job_id);
        println!("  topic:        {}", s.entity.topic);
        println!("  title:        {}", s.entity.metadata.title);
        println!(
            "  rank:         {} (target {}, baseline {})",
            format_rank(s.entity.current_rank),
            s.entity.target_rank,
            format_rank(s.job.baseline_rank)
        );
        println!(
            "  optimized:    {}/{} times",
            s.entity.optimization_count,
            policy.max_attempts()
        );
        if let Some(version) = s.active_version {
            println!("  active:       v{}", version);
        }
        if let Some(at) = s.job.last_rank_check_at {
            println!("  last check:   {}", format_time(at));
        }
        if let Some(at) = s.job.next_optimization_at {
            println!("  cooldown end: {}", format_time(at));
        }
        println!("  next pass:    {}", s.next_decision.label());
    })
}

fn require_job(storage: &Storage, entity_id: &str) -> Result<OptimizationJob> {
    storage
        .get_job_for_entity(entity_id)?
        .with_context(|| format!("{} is not tracked", entity_id))
}

/// Print `value` as pretty JSON, or through `text` otherwise.
fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text(value);
    }
    Ok(())
}

fn format_rank(rank: Option<u32>) -> String {
    rank.map(|r| format!("#{}", r))
        .unwrap_or_else(|| "unknown".to_string())
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::StatusFilter;
    use rankopt_types::JobStatus;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Storage) {
        let temp = TempDir::new().unwrap();
        let storage = Storage::open(temp.path()).unwrap();
        (temp, storage)
    }

    fn track(storage: &Storage, entity_id: &str) {
        execute(
            storage,
            &OptimizationPolicy::default(),
            false,
            Commands::Track {
                entity_id: entity_id.to_string(),
                topic: "rust async tutorial".to_string(),
                title: "Async Rust".to_string(),
                tags: vec!["rust".to_string()],
                description: String::new(),
                target_rank: Some(3),
                rank: Some(40),
            },
        )
        .unwrap();
    }

    fn run(storage: &Storage, command: Commands) -> Result<()> {
        execute(storage, &OptimizationPolicy::default(), false, command)
    }

    #[test]
    fn test_track_creates_job() {
        let (_temp, storage) = setup();
        track(&storage, "vid1");

        let job = storage.get_job_for_entity("vid1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.baseline_rank, Some(40));

        let entity = storage.get_entity("vid1").unwrap().unwrap();
        assert_eq!(entity.target_rank, 3);
        assert_eq!(entity.topic, "rust async tutorial");
    }

    #[test]
    fn test_stop_then_start() {
        let (_temp, storage) = setup();
        track(&storage, "vid1");

        run(
            &storage,
            Commands::Stop {
                entity_id: "vid1".to_string(),
            },
        )
        .unwrap();
        let job = storage.get_job_for_entity("vid1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Stopped);

        run(
            &storage,
            Commands::Start {
                entity_id: "vid1".to_string(),
                target_rank: Some(1),
                rank: None,
                topic: None,
            },
        )
        .unwrap();
        let job = storage.get_job_for_entity("vid1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.baseline_rank, Some(40));
        assert_eq!(storage.get_entity("vid1").unwrap().unwrap().target_rank, 1);
    }

    #[test]
    fn test_start_untracked_fails() {
        let (_temp, storage) = setup();
        let result = run(
            &storage,
            Commands::Start {
                entity_id: "ghost".to_string(),
                target_rank: None,
                rank: None,
                topic: None,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_status_and_listings() {
        let (_temp, storage) = setup();
        track(&storage, "vid1");

        for json in [false, true] {
            execute(
                &storage,
                &OptimizationPolicy::default(),
                json,
                Commands::Status {
                    entity_id: "vid1".to_string(),
                },
            )
            .unwrap();
        }
        run(
            &storage,
            Commands::Ranks {
                entity_id: "vid1".to_string(),
                limit: 10,
            },
        )
        .unwrap();
        run(
            &storage,
            Commands::Versions {
                entity_id: "vid1".to_string(),
            },
        )
        .unwrap();
        run(
            &storage,
            Commands::Jobs {
                status: StatusFilter::Active,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_status_unknown_entity() {
        let (_temp, storage) = setup();
        let err = run(
            &storage,
            Commands::Status {
                entity_id: "ghost".to_string(),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("not tracked"));
    }

    #[test]
    fn test_keyword_commands() {
        let (_temp, storage) = setup();
        track(&storage, "vid1");

        run(
            &storage,
            Commands::Keyword {
                command: KeywordCommands::Add {
                    entity_id: "vid1".to_string(),
                    keyword: "  Tokio Tutorial ".to_string(),
                },
            },
        )
        .unwrap();
        let keywords = storage.list_keywords("vid1").unwrap();
        assert_eq!(keywords.len(), 1);
        assert_eq!(keywords[0].keyword, "tokio tutorial");

        run(
            &storage,
            Commands::Keyword {
                command: KeywordCommands::Remove {
                    entity_id: "vid1".to_string(),
                    keyword: "tokio tutorial".to_string(),
                },
            },
        )
        .unwrap();
        assert!(storage.list_keywords("vid1").unwrap().is_empty());

        let missing = run(
            &storage,
            Commands::Keyword {
                command: KeywordCommands::Remove {
                    entity_id: "vid1".to_string(),
                    keyword: "tokio tutorial".to_string(),
                },
            },
        );
        assert!(missing.is_err());
    }

    #[test]
    fn test_untrack_requires_confirmation() {
        let (_temp, storage) = setup();
        track(&storage, "vid1");

        let refused = run(
            &storage,
            Commands::Untrack {
                entity_id: "vid1".to_string(),
                yes: false,
            },
        );
        assert!(refused.is_err());
        assert!(storage.get_entity("vid1").unwrap().is_some());

        run(
            &storage,
            Commands::Untrack {
                entity_id: "vid1".to_string(),
                yes: true,
            },
        )
        .unwrap();
        assert!(storage.get_entity("vid1").unwrap().is_none());
        assert!(storage.get_job_for_entity("vid1").unwrap().is_none());
    }

    #[test]
    fn test_admin_commands() {
        let (_temp, storage) = setup();
        track(&storage, "vid1");

        execute(
            &storage,
            &OptimizationPolicy::default(),
            true,
            Commands::Admin {
                command: AdminCommands::Stats,
            },
        )
        .unwrap();
        run(
            &storage,
            Commands::Admin {
                command: AdminCommands::Compact { cf: None },
            },
        )
        .unwrap();
        run(
            &storage,
            Commands::Admin {
                command: AdminCommands::Compact {
                    cf: Some("jobs".to_string()),
                },
            },
        )
        .unwrap();
        assert!(run(
            &storage,
            Commands::Admin {
                command: AdminCommands::Compact {
                    cf: Some("nope".to_string()),
                },
            },
        )
        .is_err());
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_rank(Some(7)), "#7");
        assert_eq!(format_rank(None), "unknown");
    }
}
