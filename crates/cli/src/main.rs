use std::process::ExitCode;

fn main() -> ExitCode {
    voyage_cli::run()
}
