mod cli;

use std::process::ExitCode;

use clap::Parser;
use console::style;
use shift_core::ShiftError;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    match cli.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {} {:#}", style("✗ Migration error:").red().bold(), e);
            eprintln!();
            match e.downcast_ref::<ShiftError>() {
                Some(ShiftError::Usage(_)) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
