//! Main entry point for the RelayDesk console CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::config::{Config, LogFormat};
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt};
use url::Url;

mod commands;

use commands::{
    appointments::AppointmentsArgs, contacts::ContactsArgs, follow::FollowArgs,
    notifications::NotificationsArgs,
};

/// RelayDesk CLI
#[derive(Parser)]
#[command(name = "relaydesk")]
#[command(about = "Operator console for the RelayDesk messaging agent", long_about = None)]
struct Cli {
    /// Path to the configuration file (optional)
    #[arg(
        long,
        short,
        global = true,
        help = "Path to the configuration file (e.g., config.yaml or config.json). If not provided, defaults will be used."
    )]
    config: Option<PathBuf>,

    /// Dashboard API base URL, overriding the configuration
    #[arg(
        long,
        global = true,
        help = "Dashboard API base URL (e.g., http://localhost:3000/api). Overrides the configuration file and RELAYDESK_API_URL."
    )]
    api_url: Option<Url>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for the RelayDesk CLI
#[derive(Subcommand)]
enum Commands {
    /// Open a conversation and follow it live
    Follow(FollowArgs),

    /// List and triage notifications
    Notifications(NotificationsArgs),

    /// List contacts or hand a conversation to or from the bot
    Contacts(ContactsArgs),

    /// List appointments or change their status
    Appointments(AppointmentsArgs),

    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell type for which to generate the completion script (e.g., bash, zsh, fish, powershell)
        #[arg(
            long,
            short,
            help = "The shell type for which to generate the completion script (e.g., bash, zsh, fish, powershell)"
        )]
        shell: clap_complete::Shell,
    },

    /// Generate a configuration file
    Config {
        /// Format of the configuration file to generate (yaml or json). Defaults to yaml.
        #[arg(
            long,
            short,
            help = "Format of the configuration file to generate (yaml or json). Defaults to yaml."
        )]
        format: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Completion { shell } => {
            commands::completion::generate_completion(shell);
            Ok(())
        }
        Commands::Config { format } => {
            let format = format.unwrap_or_else(|| "yaml".to_string());
            commands::config::generate_config(&format)
        }
        command => {
            let config = Config::load_config(cli.config, cli.api_url)?;
            initialize_tracing(&config);

            match command {
                Commands::Follow(args) => commands::follow::run(&config, args).await,
                Commands::Notifications(args) => commands::notifications::run(&config, args).await,
                Commands::Contacts(args) => commands::contacts::run(&config, args).await,
                Commands::Appointments(args) => commands::appointments::run(&config, args).await,
                Commands::Completion { .. } | Commands::Config { .. } => Ok(()),
            }
        }
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout stays
/// reserved for command output.
fn initialize_tracing(config: &Config) {
    let env_filter = build_env_filter(config);

    let fmt_builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true);

    if matches!(config.logging.format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).init();
    } else {
        fmt_builder.with_ansi(true).init();
    }
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::WARN);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}
