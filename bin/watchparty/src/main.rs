mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "watchparty")]
#[command(about = "Chat-driven watch-party bot for a browser voice room", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the browser, join the room and act on chat commands
    Run {
        #[command(flatten)]
        overrides: commands::Overrides,

        /// Run the browser without a window
        #[arg(long)]
        headless: bool,
    },

    /// Show how a chat message would be interpreted
    Parse {
        /// Full message text, e.g. "@Bot play Frieren 3"
        message: String,

        /// Name the bot answers to (defaults to the configured one)
        #[arg(long)]
        bot_name: Option<String>,

        /// Config file (default: ~/.watchparty/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show configuration and environment status
    Status {
        #[command(flatten)]
        overrides: commands::Overrides,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            overrides,
            headless,
        } => {
            commands::run::run(overrides, headless).await?;
        }
        Commands::Parse {
            message,
            bot_name,
            config,
        } => {
            commands::parse::run(&message, bot_name, config)?;
        }
        Commands::Status { overrides } => {
            commands::status::run(overrides)?;
        }
    }

    Ok(())
}
