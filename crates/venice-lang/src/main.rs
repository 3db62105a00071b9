use std::env;

use tracing_subscriber::FmtSubscriber;
use venice_lang::cli::{self, log_level_from_env};

fn init_logging() {
    let Some(level) = log_level_from_env() else {
        return;
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set up logging: {}", err);
    }
}

fn main() {
    init_logging();
    let args = match cli::parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("{}", cli::usage());
            std::process::exit(2);
        }
    };
    tracing::debug!(?args, "starting");
    match cli::run(args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{} {:#}", venice_core::error::ERROR_TAG, err);
            std::process::exit(1);
        }
    }
}
