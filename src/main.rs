use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notechat::core::Identity;
use notechat::transport;
use notechat::Config;

#[derive(Parser)]
#[command(name = "notechat")]
#[command(author, version, about = "Notechat - chat with your notes assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Backend origin, overrides the config file (e.g. https://notes.example.com)
    #[arg(long, global = true)]
    base_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat session
    Chat {
        /// User id the conversation belongs to
        #[arg(short, long)]
        user: String,

        /// Identity token for the chat connection
        #[arg(short, long, env = "NOTECHAT_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// List all notes
    Notes,

    /// Show the configuration file and its effective contents
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "notechat=debug"
    } else {
        "notechat=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {:#}", e);
        Config::default()
    });
    if let Some(base_url) = cli.base_url {
        config.server.base_url = base_url;
    }

    match cli.command {
        Commands::Chat { user, token } => {
            tracing::info!("Starting chat for user {}", user);
            transport::cli::run_chat(config, Identity::new(user, token)).await?;
        }
        Commands::Notes => {
            transport::cli::run_notes(config).await?;
        }
        Commands::Config { init } => {
            if init {
                config.save()?;
            }
            transport::cli::run_config(&config)?;
        }
    }

    Ok(())
}
