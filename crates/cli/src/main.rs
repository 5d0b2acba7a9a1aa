//! ContextOS CLI — the main entry point.
//!
//! Commands:
//! - `onboard`    — Write a default config file
//! - `connect`    — Store an API key and load contexts
//! - `disconnect` — Forget the API key
//! - `status`     — Show configuration and connection state
//! - `contexts`   — List published context schemas
//! - `enhance`    — Enhance a prompt with selected contexts
//! - `history`    — List past completed prompts
//! - `resume`     — Rebuild the composite of a past prompt

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "contextos",
    about = "ContextOS — enrich prompts with your business context",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,

    /// Store an API key and load the context catalog
    Connect {
        /// The ContextOS API key
        key: String,
    },

    /// Forget the stored API key
    Disconnect,

    /// Show configuration and connection state
    Status,

    /// List published context schemas
    Contexts {
        /// Filter by name, company, or type
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Enhance a prompt
    Enhance {
        /// The prompt to enhance
        prompt: String,

        /// Context schema id to attach (repeatable)
        #[arg(short = 'c', long = "context", required = true)]
        contexts: Vec<String>,

        /// Include every supplementary extract in the output
        #[arg(long)]
        extracts: bool,

        /// Do not ask clarifying questions
        #[arg(long)]
        no_questions: bool,
    },

    /// List past completed prompts
    History {
        /// Filter by prompt text
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Print the composite of a past prompt
    Resume {
        /// History entry id
        id: String,

        /// Include every supplementary extract in the output
        #[arg(long)]
        extracts: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so the composite on stdout can be piped
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Connect { key } => commands::connect::run(key).await?,
        Commands::Disconnect => commands::disconnect::run().await?,
        Commands::Status => commands::status::run().await?,
        Commands::Contexts { search } => commands::contexts::run(search).await?,
        Commands::Enhance {
            prompt,
            contexts,
            extracts,
            no_questions,
        } => commands::enhance::run(prompt, contexts, extracts, !no_questions).await?,
        Commands::History { search } => commands::history::run(search).await?,
        Commands::Resume { id, extracts } => commands::resume::run(id, extracts).await?,
    }

    Ok(())
}
