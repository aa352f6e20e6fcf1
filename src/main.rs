mod composite;
mod config;
mod coordinator;
mod log;
mod queue;
mod round;
mod sink;
mod window;
mod worker;

use clap::{CommandFactory, Parser};
use std::io;
use std::process;

use crate::config::SieveConfig;
use crate::coordinator::Coordinator;
use crate::log::{verbose, warning};
use crate::sink::LineSink;

#[derive(Parser)]
#[command(name = "ntsieve", version)]
#[command(
    about = "Print every prime in [start, end) using a pipelined concurrent sieve",
    long_about = None,
    args_override_self = true
)]
struct Cli {
    #[arg(short, long, allow_hyphen_values = true, help = "First number to test (inclusive, default 2)")]
    start: Option<String>,
    #[arg(short, long, allow_hyphen_values = true, help = "End of the range (exclusive, default 100)")]
    end: Option<String>,
    #[arg(
        short,
        long,
        allow_hyphen_values = true,
        help = "Number of worker threads (default: CPU count)"
    )]
    threads: Option<String>,
    #[arg(
        short = 'c',
        long,
        allow_hyphen_values = true,
        help = "Numbers per checkpoint step (default 4096)"
    )]
    increment: Option<String>,
    #[arg(
        short,
        long,
        allow_hyphen_values = true,
        help = "Capacity of the shared work queue (default: 1024 per thread)"
    )]
    queue_capacity: Option<String>,
    #[arg(short, long, help = "Print progress and timing to stderr")]
    verbose: bool,
}

fn main() {
    let mut command = Cli::command();
    command.build();
    let (args, unrecognized) = config::split_args(&command, std::env::args());
    for arg in &unrecognized {
        warning!("Unrecognized argument {}", arg);
    }

    let cli = Cli::parse_from(args);
    log::set_verbose(cli.verbose);

    let config = SieveConfig::from_raw(
        cli.start.as_deref(),
        cli.end.as_deref(),
        cli.threads.as_deref(),
        cli.increment.as_deref(),
        cli.queue_capacity.as_deref(),
    );

    let mut sink = LineSink::new(io::stdout().lock());
    let summary = match Coordinator::new(config).run(&mut sink) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    verbose!(
        "Total: {} primes found in {} rounds ({} candidates, {} marks)",
        summary.primes,
        summary.rounds,
        summary.candidates,
        summary.marks
    );
    verbose!(
        "Marking factors per worker at shutdown: {:?}",
        summary.factors_per_worker
    );
    verbose!(
        "Execution time: {}us ({:.2}ms)",
        summary.elapsed_us,
        summary.elapsed_us as f64 / 1000.0
    );
}
