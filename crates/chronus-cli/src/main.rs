//! Chronus CLI - headless modular synthesizer runtime.

mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "chronus")]
#[command(author, version, about = "Headless modular synthesizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the audio engine with the OSC control transport
    Run(commands::run::RunArgs),

    /// List available module types and their parameters
    Modules(commands::modules::ModulesArgs),

    /// List audio output devices
    Devices(commands::devices::DevicesArgs),
}

fn main() -> ExitCode {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Modules(args) => commands::modules::run(args),
        Commands::Devices(args) => commands::devices::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            // Exit contract: 2 for initialization failures, 3 for
            // unrecoverable supervisor state.
            let code = err
                .downcast_ref::<chronus_engine::EngineError>()
                .map_or(2, |e| e.exit_code());
            ExitCode::from(code as u8)
        }
    }
}
