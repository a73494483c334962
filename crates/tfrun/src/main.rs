use anyhow::Result;
use clap::Parser;
use tfrun_core::errors::MonitorError;

mod cli;
mod commands;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    match parsed.dispatch().await {
        Ok(()) => Ok(()),
        Err(err) => {
            // Monitor failures carry their own exit codes, wherever they sit in the chain
            if let Some(code) = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<MonitorError>())
                .map(MonitorError::exit_code)
            {
                eprintln!("Error: {err:#}");
                std::process::exit(code);
            }

            Err(err)
        }
    }
}
