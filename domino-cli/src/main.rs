//! Domino CLI entry point: one subcommand per field domain, each
//! loading a fixture file and printing one resolve/execute result in
//! the same `key=value` grammar the fixtures themselves use.

mod commands;
mod error;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "domino", about = "Fixture-driven runner for the Domino field-domain resolvers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one energy-domain resolve tick against a fixture.
    Energy {
        #[command(subcommand)]
        action: ResolveAction,
    },
    /// Run one heat-domain resolve tick against a fixture.
    Heat {
        #[command(subcommand)]
        action: ResolveAction,
    },
    /// Run one fluid-domain resolve tick against a fixture.
    Fluid {
        #[command(subcommand)]
        action: ResolveAction,
    },
    /// Run one information-domain resolve tick against a fixture.
    Information {
        #[command(subcommand)]
        action: ResolveAction,
    },
    /// Run one crafting execution against a fixture.
    Crafting {
        #[command(subcommand)]
        action: CraftingAction,
    },
}

#[derive(Subcommand)]
enum ResolveAction {
    Resolve {
        /// Path to the fixture file.
        fixture: PathBuf,
    },
}

#[derive(Subcommand)]
enum CraftingAction {
    Execute {
        /// Path to the fixture file.
        fixture: PathBuf,
    },
}

fn run(cli: Cli) -> Result<String> {
    match cli.command {
        Command::Energy { action: ResolveAction::Resolve { fixture } } => commands::energy::resolve(&fixture),
        Command::Heat { action: ResolveAction::Resolve { fixture } } => commands::heat::resolve(&fixture),
        Command::Fluid { action: ResolveAction::Resolve { fixture } } => commands::fluid::resolve(&fixture),
        Command::Information { action: ResolveAction::Resolve { fixture } } => commands::information::resolve(&fixture),
        Command::Crafting { action: CraftingAction::Execute { fixture } } => commands::crafting::execute(&fixture),
    }
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "command failed");
            eprintln!("{err}");
            let code: u8 = CliError::exit_code(&err).try_into().unwrap_or(2);
            ExitCode::from(code)
        }
    }
}
