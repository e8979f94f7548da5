use std::process::ExitCode;

fn main() -> ExitCode {
    hiredrill_cli::run()
}
