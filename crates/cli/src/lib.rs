pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "compass",
    about = "Compass operator CLI",
    long_about = "Operate the Compass compliance assistant: readiness checks, config inspection, and terminal crew kickoffs.",
    after_help = "Examples:\n  compass doctor --json\n  compass config\n  compass kickoff --topic \"GDPR readiness for EU customer data\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Validate config, crew definition, LLM client readiness, and report directory"
    )]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Run the compliance crew once from the terminal and print the result")]
    Kickoff {
        #[arg(long, help = "Topic to analyze; defaults to the configured topic")]
        topic: Option<String>,
        #[arg(
            long = "input",
            value_name = "KEY=VALUE",
            help = "Extra kickoff inputs (repeatable)"
        )]
        inputs: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Kickoff { topic, inputs } => commands::kickoff::run(topic, inputs),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
