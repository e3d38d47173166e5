//! Glassquote CLI - sign in, generate quotes and follow them to completion.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use client_config_and_utils::{init_logging_for_service, Config, Paths};
use std::path::PathBuf;
use tracing::debug;

/// Glassquote CLI - drive the quote service from the terminal.
#[derive(Parser)]
#[command(name = "glassquote")]
#[command(about = "Glassquote CLI for authentication and quote generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Backend origin, overrides the config file
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Sign in as this user before running the command
    #[arg(short, long, global = true, env = "GLASSQUOTE_EMAIL")]
    email: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show who the session belongs to
    Whoami,

    /// Generate and manage quotes
    Quote {
        #[command(subcommand)]
        command: QuoteCommands,
    },
}

#[derive(Subcommand)]
enum QuoteCommands {
    /// Submit a quote request and wait for the result
    Generate {
        /// JSON file with the quote request
        #[arg(short, long)]
        request: PathBuf,
        /// Print the job id and return without polling
        #[arg(long)]
        no_wait: bool,
        /// Give up after this many status polls
        #[arg(long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..))]
        max_attempts: u32,
    },
    /// Show the status of a quote job
    Status {
        /// Job id returned by generate
        job_id: String,
    },
    /// Show a generated quote
    Preview {
        /// Quote id
        quote_id: String,
    },
    /// Approve a quote with the token from the approval email
    Approve {
        /// Quote id
        quote_id: String,
        /// Approval token
        #[arg(short, long)]
        token: String,
    },
}

fn load_config(api_url: Option<String>) -> anyhow::Result<Config> {
    let paths = Paths::new()?;
    let mut config = Config::load(&paths)?;
    if let Some(api_url) = api_url {
        config.api_base_url = api_url;
        config.validate()?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging_for_service("cli", &cli.log_level);

    let config = match load_config(cli.api_url) {
        Ok(config) => config,
        Err(e) => {
            output::print_error(&format!("{:#}", e), &cli.format);
            std::process::exit(1);
        }
    };
    debug!(api_url = %config.api_base_url, "configuration loaded");

    let ctx = commands::Context {
        config,
        format: cli.format,
        email: cli.email,
    };

    let result = match cli.command {
        Commands::Whoami => commands::whoami(&ctx).await,
        Commands::Quote { command } => match command {
            QuoteCommands::Generate {
                request,
                no_wait,
                max_attempts,
            } => commands::quote_generate(&ctx, &request, no_wait, max_attempts).await,
            QuoteCommands::Status { job_id } => commands::quote_status(&ctx, &job_id).await,
            QuoteCommands::Preview { quote_id } => commands::quote_preview(&ctx, &quote_id).await,
            QuoteCommands::Approve { quote_id, token } => {
                commands::quote_approve(&ctx, &quote_id, &token).await
            }
        },
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &ctx.format);
        std::process::exit(1);
    }
}
