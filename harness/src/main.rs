use std::sync::Arc;
use std::time::Duration;

use structopt::StructOpt;

use basic_paxos::{Config, RandomFaults, RetryPolicy};
use paxos_harness::run_trials;

#[derive(StructOpt, Debug)]
#[structopt(name = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// Number of concurrent proposers
    #[structopt(name = "PROPOSERS")]
    proposers: u32,

    /// Number of acceptors, odd and at least 3
    #[structopt(name = "ACCEPTORS")]
    acceptors: usize,

    /// Number of trials to run
    #[structopt(name = "TRIALS", default_value = "10")]
    trials: usize,

    /// Upper bound in microseconds of the random pause between protocol steps
    #[structopt(long, default_value = "2000")]
    max_delay_us: u64,

    /// Give up a round after this many phase 1 attempts
    #[structopt(long)]
    max_attempts: Option<u64>,

    /// Print the report as JSON
    #[structopt(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let config = Config::new(opt.proposers, opt.acceptors).with_retry(RetryPolicy {
        max_attempts: opt.max_attempts,
    });
    let faults = Arc::new(RandomFaults::new(Duration::from_micros(opt.max_delay_us)));

    let report = run_trials(&config, faults, opt.trials).await?;
    if opt.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("trials:{} wrong:{}", report.trials, report.wrong);
        if report.gave_up > 0 {
            println!("gave_up:{}", report.gave_up);
        }
    }

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}
