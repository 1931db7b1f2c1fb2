//! Chatweave CLI — the main entry point.
//!
//! Commands:
//! - `chat` — Send a single message, letting the model call built-in tools

use clap::{Parser, Subcommand};

mod commands;
mod tools;

#[derive(Parser)]
#[command(
    name = "chatweave",
    about = "Chatweave — tool-calling chat orchestration",
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
    /// Send a message and print the model's answer
    Chat {
        /// The user message
        #[arg(short, long)]
        message: String,

        /// Stream the answer as it is generated
        #[arg(long)]
        stream: bool,

        /// System prompt to start the conversation with
        #[arg(long)]
        system: Option<String>,

        /// Print the scope tree and token usage afterwards
        #[arg(long)]
        report: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat {
            message,
            stream,
            system,
            report,
        } => {
            commands::chat::run(commands::chat::ChatArgs {
                message,
                stream,
                system,
                report,
            })
            .await?
        }
    }

    Ok(())
}
