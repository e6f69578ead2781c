//! CLI argument parsing for the rankopt binary.
//!
//! Flags given here override every other configuration source.

use clap::{Parser, Subcommand, ValueEnum};

use rankopt_types::JobStatus;

/// Rank optimization job store
///
/// Tracks videos, their ranking for a topic, and the metadata versions
/// applied to them.
#[derive(Parser, Debug)]
#[command(name = "rankopt")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/rankopt/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    /// Print records as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start tracking a video and create its optimization job
    Track {
        /// Video id
        entity_id: String,

        /// Search query the video should rank for
        #[arg(short, long)]
        topic: String,

        /// Current title
        #[arg(long)]
        title: String,

        /// Current tags, comma separated
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Current description
        #[arg(long, default_value = "")]
        description: String,

        /// Rank to reach (1-based)
        #[arg(long)]
        target_rank: Option<u32>,

        /// Rank observed right now, if known
        #[arg(long)]
        rank: Option<u32>,
    },

    /// Reactivate a stopped job
    Start {
        entity_id: String,

        /// Replace the target rank
        #[arg(long)]
        target_rank: Option<u32>,

        /// Fresh rank; also resets the baseline
        #[arg(long)]
        rank: Option<u32>,

        /// Replace the search topic
        #[arg(short, long)]
        topic: Option<String>,
    },

    /// Stop scheduling a job; history is kept
    Stop { entity_id: String },

    /// Show a job, its entity, and what the policy would do next
    Status { entity_id: String },

    /// Show rank samples, newest first
    Ranks {
        entity_id: String,

        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show applied metadata versions, newest first
    Versions { entity_id: String },

    /// Manage secondary keywords
    Keyword {
        #[command(subcommand)]
        command: KeywordCommands,
    },

    /// List jobs
    Jobs {
        #[arg(short, long, value_enum, default_value = "all")]
        status: StatusFilter,
    },

    /// Delete a video with its job, versions, samples and keywords
    Untrack {
        entity_id: String,

        /// Required; the deletion cannot be undone
        #[arg(long)]
        yes: bool,
    },

    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum KeywordCommands {
    /// Track a keyword for a video
    Add { entity_id: String, keyword: String },

    /// Stop tracking a keyword and drop its samples
    Remove { entity_id: String, keyword: String },

    /// List a video's keywords, newest first
    List { entity_id: String },

    /// Show a keyword's rank samples, newest first
    History {
        entity_id: String,
        keyword: String,

        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AdminCommands {
    /// Show database statistics
    Stats,

    /// Trigger RocksDB compaction
    Compact {
        /// Compact only specific column family
        #[arg(long)]
        cf: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Active,
    Stopped,
    All,
}

impl StatusFilter {
    pub fn as_status(self) -> Option<JobStatus> {
        match self {
            StatusFilter::Active => Some(JobStatus::Active),
            StatusFilter::Stopped => Some(JobStatus::Stopped),
            StatusFilter::All => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_track() {
        let cli = Cli::parse_from([
            "rankopt",
            "track",
            "dQw4w9WgXcQ",
            "--topic",
            "rust async tutorial",
            "--title",
            "Async Rust",
            "--tags",
            "rust,async,tokio",
            "--rank",
            "42",
        ]);
        match cli.command {
            Commands::Track {
                entity_id,
                topic,
                tags,
                rank,
                target_rank,
                description,
                ..
            } => {
                assert_eq!(entity_id, "dQw4w9WgXcQ");
                assert_eq!(topic, "rust async tutorial");
                assert_eq!(tags, vec!["rust", "async", "tokio"]);
                assert_eq!(rank, Some(42));
                assert_eq!(target_rank, None);
                assert_eq!(description, "");
            }
            _ => panic!("Expected Track command"),
        }
    }

    #[test]
    fn test_cli_track_requires_topic() {
        let result = Cli::try_parse_from(["rankopt", "track", "vid1", "--title", "T"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_start_with_overrides() {
        let cli = Cli::parse_from(["rankopt", "start", "vid1", "--target-rank", "3"]);
        match cli.command {
            Commands::Start {
                entity_id,
                target_rank,
                rank,
                topic,
            } => {
                assert_eq!(entity_id, "vid1");
                assert_eq!(target_rank, Some(3));
                assert!(rank.is_none());
                assert!(topic.is_none());
            }
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "rankopt",
            "jobs",
            "--db-path",
            "/tmp/rankopt",
            "--json",
            "-l",
            "debug",
        ]);
        assert_eq!(cli.db_path.as_deref(), Some("/tmp/rankopt"));
        assert!(cli.json);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_cli_jobs_status_filter() {
        let cli = Cli::parse_from(["rankopt", "jobs", "--status", "stopped"]);
        match cli.command {
            Commands::Jobs { status } => {
                assert_eq!(status.as_status(), Some(JobStatus::Stopped));
            }
            _ => panic!("Expected Jobs command"),
        }

        let cli = Cli::parse_from(["rankopt", "jobs"]);
        match cli.command {
            Commands::Jobs { status } => assert_eq!(status, StatusFilter::All),
            _ => panic!("Expected Jobs command"),
        }
    }

    #[test]
    fn test_cli_ranks_limit() {
        let cli = Cli::parse_from(["rankopt", "ranks", "vid1", "-n", "5"]);
        match cli.command {
            Commands::Ranks { entity_id, limit } => {
                assert_eq!(entity_id, "vid1");
                assert_eq!(limit, 5);
            }
            _ => panic!("Expected Ranks command"),
        }
    }

    #[test]
    fn test_cli_keyword_add() {
        let cli = Cli::parse_from(["rankopt", "keyword", "add", "vid1", "Tokio Tutorial"]);
        match cli.command {
            Commands::Keyword {
                command: KeywordCommands::Add { entity_id, keyword },
            } => {
                assert_eq!(entity_id, "vid1");
                assert_eq!(keyword, "Tokio Tutorial");
            }
            _ => panic!("Expected Keyword Add command"),
        }
    }

    #[test]
    fn test_cli_keyword_history() {
        let cli = Cli::parse_from(["rankopt", "keyword", "history", "vid1", "tokio"]);
        match cli.command {
            Commands::Keyword {
                command: KeywordCommands::History { limit, .. },
            } => assert_eq!(limit, 20),
            _ => panic!("Expected Keyword History command"),
        }
    }

    #[test]
    fn test_cli_untrack_flag() {
        let cli = Cli::parse_from(["rankopt", "untrack", "vid1"]);
        match cli.command {
            Commands::Untrack { yes, .. } => assert!(!yes),
            _ => panic!("Expected Untrack command"),
        }
    }

    #[test]
    fn test_cli_admin_compact_cf() {
        let cli = Cli::parse_from(["rankopt", "admin", "compact", "--cf", "rank_samples"]);
        match cli.command {
            Commands::Admin {
                command: AdminCommands::Compact { cf },
            } => assert_eq!(cf.as_deref(), Some("rank_samples")),
            _ => panic!("Expected Admin Compact command"),
        }
    }
}
