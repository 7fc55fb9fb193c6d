//! Command line interface of the distribution network reconfiguration engine.
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};

use dnrlib::io::*;

/// Print an error message and exit with the given code.
macro_rules! fatal_error {
    ($code:expr, $($arg:tt)*) => {{
        eprintln!("{} {}", "Error:".red().bold(), format!($($arg)*));
        std::process::exit($code)
    }};
}

mod commands;
use commands::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    Cli::parse().command.run();
}
