use std::process::ExitCode;

fn main() -> ExitCode {
    expensa_cli::run()
}
