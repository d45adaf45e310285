//! filipa - Operator tool for the Filipa interview store
//!
//! Works directly on the store directory the app keeps its candidates,
//! sessions and question catalog in.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "filipa")]
#[command(about = "Inspect and maintain the Filipa interview store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true, env = "FILIPA_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store location, schema version and record counts
    Status,

    /// Export every collection as a JSON snapshot
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Merge a JSON snapshot into the store
    Import {
        /// Snapshot file
        file: PathBuf,
    },

    /// Import a snapshot only if the store has no data yet
    Seed {
        /// Snapshot file
        file: PathBuf,
    },

    /// Report whether the store holds any interview data
    IsEmpty,

    /// Delete all interview data, keeping the configuration
    Clear {
        /// Skip confirmation
        #[arg(long, short)]
        yes: bool,
    },

    /// Delete the whole store including schema version and configuration
    Reset {
        /// Skip confirmation
        #[arg(long, short)]
        yes: bool,
    },

    /// List candidates
    Candidates,

    /// Export one candidate with their sessions and answers
    ExportCandidate {
        /// Candidate ID
        id: String,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List catalog questions
    Questions {
        /// Only questions carrying this tag
        #[arg(long)]
        tag: Option<String>,

        /// Only questions of this type (text, rating)
        #[arg(short = 't', long = "type")]
        question_type: Option<String>,
    },

    /// Show groups of questions sharing a content hash
    Duplicates,

    /// Export question sets with the questions they reference
    ExportSets {
        /// Question set IDs (all sets if none given)
        ids: Vec<String>,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Import a question set export
    ImportSets {
        /// Export file
        file: PathBuf,
    },

    /// Show or reset the app configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },

    /// Print a commented default settings file
    Settings,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the current app configuration
    Show,
    /// Replace the app configuration with the defaults
    Reset,
    /// Show where settings and the store live
    Path,
}

fn init_tracing(default_filter: &str) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli.config.clone().or_else(filipa_core::Settings::default_path);
    let settings = match &settings_path {
        Some(path) => filipa_core::Settings::load(path)?,
        None => filipa_core::Settings::default(),
    };
    init_tracing(&settings.log_filter);

    let ctx = commands::Context::new(settings, settings_path, cli.json)?;

    let result = match cli.command {
        Commands::Status => commands::status(&ctx).await,
        Commands::Export { out } => commands::export(&ctx, out).await,
        Commands::Import { file } => commands::import(&ctx, &file).await,
        Commands::Seed { file } => commands::seed(&ctx, &file).await,
        Commands::IsEmpty => commands::is_empty(&ctx).await,
        Commands::Clear { yes } => commands::clear(&ctx, yes).await,
        Commands::Reset { yes } => commands::reset(&ctx, yes).await,
        Commands::Candidates => commands::candidates(&ctx).await,
        Commands::ExportCandidate { id, out } => {
            commands::export_candidate(&ctx, &id, out).await
        }
        Commands::Questions { tag, question_type } => {
            commands::questions(&ctx, tag, question_type).await
        }
        Commands::Duplicates => commands::duplicates(&ctx).await,
        Commands::ExportSets { ids, out } => commands::export_sets(&ctx, &ids, out).await,
        Commands::ImportSets { file } => commands::import_sets(&ctx, &file).await,
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => commands::config_show(&ctx).await,
            Some(ConfigCommands::Reset) => commands::config_reset(&ctx).await,
            Some(ConfigCommands::Path) => commands::config_path(&ctx),
        },
        Commands::Settings => commands::settings(),
    };

    if let Err(e) = &result
        && let Some(err) = e.downcast_ref::<filipa_core::Error>()
        && err.is_version_conflict()
    {
        eprintln!(
            "hint: the store was written by a newer version; `filipa reset --yes` deletes it"
        );
    }
    result
}
