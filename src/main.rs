use std::process;

use clap::Parser;

use snesquant::{config, util};

fn main() {
    let config = config::Config::parse();

    if let Err(err) = util::setup_logger(config.log_level()) {
        eprintln!("Error setting up logging: {err}");
        process::exit(1);
    }

    snesquant::run(&config).unwrap_or_else(|err| {
        eprintln!("Error running application: {err:#}");
        process::exit(1)
    });
}
