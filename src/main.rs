use clap::Parser;
use fanctl::app;
use fanctl::config::Parameters;
use fanctl::logging;
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    let params = Parameters::parse();

    logging::init(params.diagnostic_level().filter());

    match app::run(&params) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
