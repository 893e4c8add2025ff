use colored::*;
use taxaplot::cli;

fn main() {
    if let Err(e) = cli::run_cli() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
