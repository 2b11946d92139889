// src/main.rs

use cosi::cli::{self, Command};
use cosi::{logging, run, services};

fn main() {
    let args = cli::parse();

    // Worker processes talk to the job manager over stdin/stdout/stderr
    // only: no tracing subscriber, no async runtime.
    if let Command::Worker { service } = &args.command {
        std::process::exit(services::worker::worker_main(service));
    }

    if let Err(err) = run_main(args) {
        eprintln!("cosi error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main(args: cli::CliArgs) -> anyhow::Result<()> {
    logging::init_logging(args.log_level)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(args))
}
