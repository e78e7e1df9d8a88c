use clap::Parser;

use gsr::cli::CliArgs;
use gsr::config::Config;
use gsr::signals::ControlFlags;
use gsr::{pidfile, pipeline};

fn main() {
    env_logger::init();

    let args = CliArgs::parse();

    let config = match Config::from_cli(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("gsr: {e}");
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = pidfile::write() {
        eprintln!("gsr: failed to write pid file: {e}");
        std::process::exit(1);
    }

    let controls = ControlFlags::new();
    if let Err(e) = gsr::signals::install(std::sync::Arc::clone(&controls)) {
        eprintln!("gsr: {e}");
        pidfile::remove();
        std::process::exit(e.exit_code());
    }

    let result = pipeline::run(config, controls);
    pidfile::remove();

    if let Err(e) = result {
        eprintln!("gsr: {e}");
        std::process::exit(e.exit_code());
    }
}
