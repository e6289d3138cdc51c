use colored::Colorize;
use std::process::ExitCode;

fn main() -> ExitCode {
    match statute::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}
