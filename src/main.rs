// src/main.rs

use pipewrap::errors::PipewrapError;
use pipewrap::logging::{self, Logger};
use pipewrap::types::{COMMAND_LINE_PARSING_ERROR, SUCCESSFUL_RETURN};
use pipewrap::{cli, run};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    std::process::exit(run_main().await);
}

async fn run_main() -> i32 {
    let args = match cli::try_parse_from(std::env::args_os()) {
        Ok(args) => args,
        Err(err) => {
            let code = if err.use_stderr() {
                COMMAND_LINE_PARSING_ERROR
            } else {
                SUCCESSFUL_RETURN
            };
            let _ = err.print();
            return code;
        }
    };

    let run_id = logging::generate_run_id();
    let mut logger = match Logger::open(args.lmode.unwrap_or_default(), &args.log_dir, run_id) {
        Ok(logger) => logger,
        Err(err) => return report_setup_error(&err),
    };
    if let Err(err) = logging::init_logging(&mut logger, args.log_level) {
        return report_setup_error(&err);
    }

    let code = match run(args, &logger).await {
        Ok(outcome) => {
            info!(?outcome, "ErrorCode={}", outcome.exit_code());
            outcome.exit_code()
        }
        Err(err) if err.is_unexpected() => {
            error!("ErrorCode={} unexpected error: {err:?}", err.exit_code());
            err.exit_code()
        }
        Err(err) => {
            error!("ErrorCode={} {err}", err.exit_code());
            err.exit_code()
        }
    };

    logger.close();
    code
}

// No subscriber is installed yet, so stderr is the only channel left.
fn report_setup_error(err: &PipewrapError) -> i32 {
    eprintln!("pipewrap error: {err}");
    err.exit_code()
}
