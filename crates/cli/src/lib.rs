pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "estoque",
    about = "Estoque operator CLI",
    long_about = "Ask inventory questions, check runtime readiness, inspect config, and seed a demo catalog.",
    after_help = "Examples:\n  estoque ask \"Qual produto vende mais?\"\n  estoque doctor --json\n  estoque seed"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Answer one question with the query agent, falling back to a direct query")]
    Ask {
        #[arg(help = "Question in natural language; words are joined with spaces")]
        question: Vec<String>,
        #[arg(long, help = "Emit the full request report as JSON")]
        json: bool,
    },
    #[command(about = "Validate config, model credentials, database, and prompt asset")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Create and fill the demo `produtos` table (idempotent)")]
    Seed,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { question, json } => commands::ask::run(&question.join(" "), json),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Config => commands::config::run(),
        Command::Seed => commands::seed::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
