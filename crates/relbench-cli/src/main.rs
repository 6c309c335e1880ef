use clap::Parser;

mod cli;
mod logging;

use cli::args::Cli;
use cli::commands::{dispatch, exit_codes};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init_logging(&cli.log) {
        eprintln!("fatal: failed to initialize logging: {e:?}");
        std::process::exit(exit_codes::CONFIG_ERROR);
    }

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(event = "fatal", error = ?e, "command failed");
            eprintln!("fatal: {e:?}");
            exit_codes::RUN_FAILED
        }
    };
    std::process::exit(code);
}
