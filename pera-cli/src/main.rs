use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pera_cli::commands::{config as config_cmd, episode, goal, learn, skill};
use pera_cli::config::{CliConfig, System};
use pera_cli::output::OutputFormat;

#[derive(Parser)]
#[command(name = "pera")]
#[command(about = "Command-line interface for the PERA agent orchestrator")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file path.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a goal and run it to completion.
    Submit(goal::SubmitArgs),
    /// Cancel an in-flight session.
    Cancel(goal::CancelArgs),
    /// Episode inspection commands.
    #[command(alias = "ep")]
    Episode {
        #[command(subcommand)]
        command: episode::EpisodeCommand,
    },
    /// Skill inspection commands.
    #[command(alias = "sk")]
    Skill {
        #[command(subcommand)]
        command: skill::SkillCommand,
    },
    /// Run one learning-loop cycle immediately.
    Learn,
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();
    } else {
        tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
    }

    let config = CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => config_cmd::show(&config, cli.format),
        other => {
            let system = System::build(&config).await?;
            match other {
                Commands::Submit(args) => goal::run(args, &system, cli.format).await,
                Commands::Cancel(args) => goal::cancel(args, &system, cli.format).await,
                Commands::Episode { command } => match command {
                    episode::EpisodeCommand::List(args) => episode::list(args, &system, cli.format).await,
                    episode::EpisodeCommand::Show(args) => episode::show(args, &system, cli.format).await,
                },
                Commands::Skill { command } => match command {
                    skill::SkillCommand::List(args) => skill::list(args, &system, cli.format).await,
                    skill::SkillCommand::Search(args) => skill::search(args, &system, cli.format).await,
                },
                Commands::Learn => learn::run(&system, cli.format).await,
                Commands::Config => unreachable!("handled above"),
            }
        }
    }
}
