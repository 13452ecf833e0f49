pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "storefront",
    about = "Storefront operator CLI",
    long_about = "Operate storefront migrations, demo fixtures, config inspection, and environment readiness checks.",
    after_help = "Examples:\n  storefront migrate\n  storefront seed --force\n  storefront config show\n  storefront doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Load the demo catalog and accounts; refuses a populated database unless --force"
    )]
    Seed {
        #[arg(long, help = "Load fixtures even when the database already holds data")]
        force: bool,
    },
    #[command(about = "Validate or inspect the effective configuration")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    #[command(about = "Run environment readiness checks for config, database, and schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    #[command(about = "Load the configuration and report whether it validates")]
    Validate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Show,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { force } => commands::seed::run(force),
        Command::Config { action } => match action {
            ConfigAction::Validate => commands::config::validate(),
            ConfigAction::Show => {
                commands::CommandResult { exit_code: 0, output: commands::config::show() }
            }
        },
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
