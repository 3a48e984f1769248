use std::process::ExitCode;

fn main() -> ExitCode {
    shadejar_cli::run()
}
