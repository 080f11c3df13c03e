//! flowsync CLI
//!
//! Command-line tools for flowsync status journals and policies.
//!
//! # Commands
//!
//! - `report` - List push and pull failures
//! - `inspect` - Show the status records of one entity
//! - `reset` - Reset push and pull history
//! - `evaluate-push` - Show where an entity would be pushed
//! - `evaluate-pull` - Show which flow would pull an entity

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// flowsync command-line tools.
#[derive(Parser)]
#[command(name = "flowsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the status journal
    #[arg(global = true, short, long)]
    status: Option<PathBuf>,

    /// Path to the policy document (JSON)
    #[arg(global = true, short, long)]
    policy: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List push and pull failures
    Report {
        /// Only this direction (push, pull)
        #[arg(short, long)]
        direction: Option<String>,

        /// Only soft failures
        #[arg(long, conflicts_with = "hard")]
        soft: bool,

        /// Only hard failures
        #[arg(long)]
        hard: bool,

        /// Only failures whose reason, kind or message contains this text
        #[arg(short, long)]
        reason: Option<String>,

        /// Only this pool
        #[arg(long)]
        pool: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the status records of one entity
    Inspect {
        /// Entity type
        #[arg(long)]
        entity_type: String,

        /// Entity id
        #[arg(long)]
        entity_id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Reset push and pull history
    Reset {
        /// Only records of this pool
        #[arg(long)]
        pool: Option<String>,
    },

    /// Show where an entity would be pushed
    EvaluatePush {
        /// Entity type
        #[arg(long)]
        entity_type: String,

        /// Bundle
        #[arg(long)]
        bundle: String,

        /// Entity id
        #[arg(long)]
        entity_id: String,

        /// Push reason (automatic, manual, as_dependency, forced, any)
        #[arg(short, long, default_value = "automatic")]
        reason: String,

        /// Action (create, update, delete)
        #[arg(short, long, default_value = "create")]
        action: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show which flow would pull an entity
    EvaluatePull {
        /// Pool the entity comes from
        #[arg(long)]
        pool: String,

        /// Entity type
        #[arg(long)]
        entity_type: String,

        /// Bundle
        #[arg(long)]
        bundle: String,

        /// Pull reason (automatic, manual, as_dependency, forced, any)
        #[arg(short, long, default_value = "automatic")]
        reason: String,

        /// Action (create, update, delete)
        #[arg(short, long, default_value = "create")]
        action: String,

        /// Only exact import modes select a flow
        #[arg(long)]
        strict: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Report {
            direction,
            soft,
            hard,
            reason,
            pool,
            format,
        } => {
            let status = cli.status.ok_or("Status journal path required for report")?;
            let filter = commands::report::ReportFilter {
                direction,
                soft,
                hard,
                reason,
                pool,
            };
            commands::report::run(&status, &filter, &format)?;
        }
        Commands::Inspect {
            entity_type,
            entity_id,
            format,
        } => {
            let status = cli.status.ok_or("Status journal path required for inspect")?;
            commands::inspect::run(&status, &entity_type, &entity_id, &format)?;
        }
        Commands::Reset { pool } => {
            let status = cli.status.ok_or("Status journal path required for reset")?;
            commands::reset::run(&status, pool.as_deref())?;
        }
        Commands::EvaluatePush {
            entity_type,
            bundle,
            entity_id,
            reason,
            action,
            format,
        } => {
            let policy = cli.policy.ok_or("Policy path required for evaluate-push")?;
            let request = commands::evaluate::PushQuery {
                entity_type,
                bundle,
                entity_id,
                reason,
                action,
            };
            commands::evaluate::push(&policy, cli.status.as_deref(), &request, &format)?;
        }
        Commands::EvaluatePull {
            pool,
            entity_type,
            bundle,
            reason,
            action,
            strict,
            format,
        } => {
            let policy = cli.policy.ok_or("Policy path required for evaluate-pull")?;
            let request = commands::evaluate::PullQuery {
                pool,
                entity_type,
                bundle,
                reason,
                action,
                strict,
            };
            commands::evaluate::pull(&policy, &request, &format)?;
        }
        Commands::Version => {
            println!("flowsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
