// src/main.rs

use issue_batch::{cli, logging, run, runner::RunOutcome};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(err) => {
            eprintln!("issue-batch error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<RunOutcome> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
