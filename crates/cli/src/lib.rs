pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "hiredrill",
    about = "HireDrill operator CLI",
    long_about = "Inspect configuration, check readiness, apply migrations, and run the research and drill pipelines from a terminal.",
    after_help = "Examples:\n  hiredrill doctor --json\n  hiredrill research --company Stripe --role backend_developer\n  hiredrill drill --company Stripe --role ml_engineer"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM credentials, GitHub token, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Research a company and stream progress events as JSON lines")]
    Research {
        #[arg(long)]
        company: String,
        #[arg(long, help = "Role id, e.g. backend_developer")]
        role: String,
    },
    #[command(about = "Generate a drill for a company and role, streaming events as JSON lines")]
    Drill {
        #[arg(long)]
        company: String,
        #[arg(long, help = "Role id, e.g. backend_developer")]
        role: String,
        #[arg(long, help = "Free-text description of the target role")]
        description: Option<String>,
    },
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_env("HIREDRILL_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .compact()
        .try_init();
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Migrate => commands::migrate::run(),
        Command::Research { company, role } => commands::research::run(&company, &role),
        Command::Drill { company, role, description } => {
            commands::drill::run(&company, &role, description.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
