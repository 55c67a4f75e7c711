mod commands;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use matchpack_core::domain::Decision;
use matchpack_core::Curator;
use tracing_subscriber::EnvFilter;

/// matchpack: match photo curation and publication
#[derive(Parser)]
#[command(name = "matchpack", version, about)]
struct Cli {
    /// Data root holding the catalog and all image files
    #[arg(long, env = "MATCHPACK_ROOT", default_value_t = default_root())]
    root: String,

    /// Print records as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// More logging (debug level) unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, list and review matches
    Match {
        #[command(subcommand)]
        action: MatchAction,
    },
    /// Import a zip archive of photos into a match
    Import {
        match_id: String,
        archive: PathBuf,
    },
    /// Show the import job of a match
    Status { match_id: String },
    /// Run the external face-clustering step for a match
    Generate { match_id: String },
    /// List the clusters of a match
    Clusters { match_id: String },
    /// List the faces of a cluster with their quality metrics
    Faces { match_id: String, cluster_id: String },
    /// Edit a single cluster
    Cluster {
        #[command(subcommand)]
        action: ClusterAction,
    },
    /// Merge clusters of a match into one
    Merge {
        match_id: String,
        /// Clusters to merge (at least two)
        #[arg(required = true, num_args = 2..)]
        sources: Vec<String>,
        /// Cluster that absorbs the others (default: the first source)
        #[arg(long)]
        into: Option<String>,
    },
    /// Remove a face from its cluster
    Detach {
        match_id: String,
        cluster_id: String,
        face_id: String,
    },
    /// Render watermarked previews for the approved clusters of a match
    Publish { match_id: String },
    /// Write a face crop or a published preview to a file
    Preview {
        match_id: String,
        face_id: String,
        /// Read the published preview of this cluster instead of the face crop
        #[arg(long)]
        cluster: Option<String>,
        /// Output file
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum MatchAction {
    /// Register a new match
    Create {
        title: String,
        /// Match day, YYYY-MM-DD
        date: NaiveDate,
    },
    /// List all matches, newest first
    List,
    /// Show one match with record counts
    Show { match_id: String },
    /// Mark a match as reviewed
    Review { match_id: String },
}

#[derive(Subcommand)]
enum ClusterAction {
    /// Set the decision: pending, approved, rejected or needs_review
    Decide { cluster_id: String, decision: Decision },
    /// Set the cover faces (none clears the selection)
    Covers {
        cluster_id: String,
        faces: Vec<String>,
    },
    /// Show suggested and effective cover faces
    Suggest { cluster_id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show every setting
    Show,
    /// Set one setting (an empty value clears optional settings)
    Set { key: String, value: String },
}

fn default_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".matchpack")
        .to_string_lossy()
        .to_string()
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut curator = Curator::open(&PathBuf::from(&cli.root))?;
    let json = cli.json;

    match cli.command {
        Commands::Match { action } => match action {
            MatchAction::Create { title, date } => commands::matches::create(&curator, &title, date, json)?,
            MatchAction::List => commands::matches::list(&curator, json)?,
            MatchAction::Show { match_id } => commands::matches::show(&curator, &match_id, json)?,
            MatchAction::Review { match_id } => commands::matches::review(&curator, &match_id)?,
        },
        Commands::Import { match_id, archive } => commands::import::run(&curator, &match_id, &archive, json)?,
        Commands::Status { match_id } => commands::import::status(&curator, &match_id, json)?,
        Commands::Generate { match_id } => commands::clusters::generate(&mut curator, &match_id)?,
        Commands::Clusters { match_id } => commands::clusters::list(&curator, &match_id, json)?,
        Commands::Faces { match_id, cluster_id } => {
            commands::clusters::faces(&curator, &match_id, &cluster_id, json)?
        }
        Commands::Cluster { action } => match action {
            ClusterAction::Decide { cluster_id, decision } => {
                commands::clusters::decide(&mut curator, &cluster_id, decision)?
            }
            ClusterAction::Covers { cluster_id, faces } => {
                commands::clusters::covers(&mut curator, &cluster_id, faces)?
            }
            ClusterAction::Suggest { cluster_id } => commands::clusters::suggest(&curator, &cluster_id, json)?,
        },
        Commands::Merge { match_id, sources, into } => {
            commands::clusters::merge(&mut curator, &match_id, sources, into, json)?
        }
        Commands::Detach {
            match_id,
            cluster_id,
            face_id,
        } => commands::clusters::detach(&mut curator, &match_id, &cluster_id, &face_id)?,
        Commands::Publish { match_id } => commands::publish::run(&curator, &match_id, json)?,
        Commands::Preview {
            match_id,
            face_id,
            cluster,
            out,
        } => commands::preview::run(&curator, &match_id, &face_id, cluster.as_deref(), &out)?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&curator, json)?,
            ConfigAction::Set { key, value } => commands::config::set(&curator, &key, &value)?,
        },
    }

    Ok(())
}
