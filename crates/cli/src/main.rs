use std::process::ExitCode;

fn main() -> ExitCode {
    compass_cli::run()
}
