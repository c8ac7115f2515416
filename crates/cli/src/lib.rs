pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "voyage",
    about = "Voyage operator CLI",
    long_about = "Operate Voyage migrations, readiness checks, config inspection, and flow queries.",
    after_help = "Examples:\n  voyage doctor --json\n  voyage config\n  voyage flow status <flow-id>"
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
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, phase registry, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(subcommand, about = "Inspect flows and their master/child relationships")]
    Flow(FlowCommand),
}

#[derive(Debug, Subcommand)]
enum FlowCommand {
    #[command(about = "Show a flow snapshot with phase results and transition history")]
    Status {
        #[arg(help = "Flow identifier")]
        flow_id: String,
    },
    #[command(about = "List the child flows linked to a master flow")]
    Children {
        #[arg(help = "Master flow identifier")]
        flow_id: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Flow(FlowCommand::Status { flow_id }) => commands::flow::status(&flow_id),
        Command::Flow(FlowCommand::Children { flow_id }) => commands::flow::children(&flow_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
