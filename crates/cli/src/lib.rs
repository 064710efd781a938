pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "expensa",
    about = "Expensa operator CLI",
    long_about = "Inspect configuration, check readiness, migrate and seed the database, \
                  and trace approver routing.",
    after_help = "Examples:\n  expensa doctor --json\n  expensa seed\n  \
                  expensa resolve --company 1 --submitter 3 --amount 1500"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo company, its users, and its approval rules")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity, and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show who would approve an expense first, without submitting it")]
    Resolve {
        #[arg(long, help = "Company id")]
        company: i64,
        #[arg(long, help = "Submitting user id")]
        submitter: i64,
        #[arg(long, help = "Amount in the company's default currency")]
        amount: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Resolve { company, submitter, amount } => {
            commands::resolve::run(company, submitter, &amount)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
