//! `thirdchair` -- command-line client for the document-analysis backend.
//!
//! ## Commands
//!
//! - `login` / `logout` / `status`: manage the persisted session token
//! - `upload`: stage documents server-side for chat
//! - `chat`: ask questions about uploaded documents
//! - `analyze consistency`: cross-document consistency analysis
//! - `analyze firm-standard`: firm style-guide compliance analysis
//!
//! Configuration comes from the environment (and `.env`), see
//! [`ClientConfig::from_env`].

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use thirdchair_client::config::ClientConfig;
use thirdchair_client::workflow::WorkflowSpec;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "thirdchair")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Analyze legal documents with the Third Chair backend", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session token
    Login {
        /// Account e-mail / username
        #[arg(short, long)]
        username: String,

        /// Password (prompted without echo when omitted)
        #[arg(long, env = "THIRDCHAIR_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the stored session token
    Logout,

    /// Show session and backend configuration
    Status,

    /// Upload documents for chat
    Upload {
        /// Documents to upload (.pdf, .doc, .docx, .txt)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ask questions about uploaded documents
    Chat {
        /// Upload these documents before asking
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// Ask a single question; reads questions from stdin when omitted
        question: Option<String>,
    },

    /// Run a document analysis
    Analyze {
        #[command(subcommand)]
        kind: AnalyzeKind,
    },
}

#[derive(Subcommand)]
enum AnalyzeKind {
    /// Check consistency across two or more documents
    Consistency(AnalyzeArgs),

    /// Check compliance with the firm's style standard
    FirmStandard(AnalyzeArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Documents to analyze (.pdf, .doc, .docx, .txt)
    files: Vec<PathBuf>,

    /// List issues of one category ("all" for every issue)
    #[arg(short, long)]
    category: Option<String>,

    /// Output format of the final report
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn init_tracing(json: bool, verbose: bool) {
    let default_filter = if verbose {
        "thirdchair_cli=debug,thirdchair_client=debug,thirdchair_core=debug"
    } else {
        "thirdchair_cli=info,thirdchair_client=info"
    };
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| default_filter.into()),
    );

    // Logs go to stderr so reports on stdout stay clean.
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json, cli.verbose);

    let config = ClientConfig::from_env().context("Invalid configuration")?;
    tracing::debug!(api_url = %config.api_url, ws_url = %config.ws_url, "Loaded configuration");

    match cli.command {
        Commands::Login { username, password } => {
            commands::login(&config, username, password).await
        }
        Commands::Logout => commands::logout(&config),
        Commands::Status => commands::status(&config),
        Commands::Upload { files } => commands::upload(&config, &files).await,
        Commands::Chat { files, question } => {
            commands::chat(&config, &files, question.as_deref()).await
        }
        Commands::Analyze { kind } => {
            let (spec, args) = match kind {
                AnalyzeKind::Consistency(args) => (WorkflowSpec::CONSISTENCY, args),
                AnalyzeKind::FirmStandard(args) => (WorkflowSpec::FIRM_STANDARD, args),
            };
            commands::analyze(
                &config,
                spec,
                &args.files,
                args.category.as_deref(),
                args.format == OutputFormat::Json,
            )
            .await
        }
    }
}
