use proxfleet_core::cli::Cli;
use std::process::ExitCode;

// Error Handling
use log::trace;
use miette::Result;

/**
The binary entrypoint.
Exits with a failure code when any row the action concerns failed.
*/
#[tokio::main]
async fn main() -> Result<ExitCode> {
    trace!("Launch process.");
    make_handler()?;
    let succeeded = Cli::run().await?;
    trace!("Process clean exit.");
    match succeeded {
        true => Ok(ExitCode::SUCCESS),
        false => Ok(ExitCode::FAILURE),
    }
}

/**
The make handler functions is executed right after the main function
to set up a verbose and colorful error/panic handler.
*/
pub fn make_handler() -> Result<()> {
    miette::set_panic_hook();
    Ok(())
}
