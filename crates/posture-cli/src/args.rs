use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "posture", about = "AI analysis orchestrator for security-posture assessments")]
pub struct Cli {
    /// SQLite database path.
    #[arg(long, env = "POSTURE_DB", default_value = "posture.db")]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage LLM API credentials.
    Keys {
        #[command(subcommand)]
        command: KeysCommand,
    },
    /// Generate the AI report for an assessment.
    Generate(GenerateArgs),
    /// Run the discovery-intake recommender.
    Intake(IntakeArgs),
    /// Metrics rollup and report cost breakdowns.
    Metrics {
        #[command(subcommand)]
        command: MetricsCommand,
    },
    /// Artifact cache administration.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Check that configuration and the encryption key load.
    Diagnose,
}

#[derive(Debug, Subcommand)]
pub enum KeysCommand {
    /// Add a credential to the pool.
    Add {
        #[arg(long)]
        label: String,
        /// The API key; read from stdin when omitted.
        #[arg(long)]
        secret: Option<String>,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// List credentials with masked secrets.
    List {
        #[arg(long)]
        include_inactive: bool,
    },
    /// Activate or deactivate a credential.
    Toggle {
        id: String,
        #[arg(long)]
        active: bool,
    },
    /// Delete a credential.
    Delete { id: String },
    /// Probe a secret's validity with a live five-token call.
    Test {
        #[arg(long)]
        secret: String,
    },
    /// Generate fresh base64 key material for the credential store.
    GenerateEncryptionKey,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(long)]
    pub report_id: String,
    /// Assessment structure JSON (sections and questions).
    #[arg(long)]
    pub structure: PathBuf,
    /// Raw responses JSON.
    #[arg(long)]
    pub responses: PathBuf,
    /// Restrict to these section ids (repeatable).
    #[arg(long = "section")]
    pub sections: Vec<String>,
}

#[derive(Debug, Args)]
pub struct IntakeArgs {
    /// Intake answers JSON.
    #[arg(long)]
    pub answers: PathBuf,
    #[arg(long)]
    pub user_id: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum MetricsCommand {
    /// Roll up one day of call metrics (defaults to yesterday).
    Rollup {
        /// Date as YYYY-MM-DD.
        #[arg(long)]
        date: Option<String>,
    },
    /// Cost breakdown for one report.
    ReportCost { report_id: String },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Delete all cache entries for a retired prompt version.
    Prune {
        #[arg(long)]
        prompt_version: String,
    },
}
