use std::process::ExitCode;

fn main() -> ExitCode {
    pretty_env_logger::init();

    match recordprep::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
