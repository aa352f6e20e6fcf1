use std::num::NonZeroUsize;
use std::thread;

use clap::Command;

use crate::window::GlobalRange;

pub const DEFAULT_START: u64 = 2;
pub const DEFAULT_END: u64 = 100;
/// Numbers per checkpoint step.
pub const DEFAULT_INCREMENT: u64 = 4096;
/// Work queue slots per worker thread.
pub const QUEUE_SLOTS_PER_WORKER: usize = 1024;
/// Larger thread counts are treated as out of range.
pub const MAX_THREADS: usize = 4096;
/// The queue allocates every slot up front, so it is capped well below
/// anything that could exhaust memory.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 22;

/// Default queue size for `threads` workers.
fn queue_capacity_for(threads: usize) -> usize {
    threads
        .checked_mul(QUEUE_SLOTS_PER_WORKER)
        .map_or(MAX_QUEUE_CAPACITY, |slots| slots.min(MAX_QUEUE_CAPACITY))
}

/// Everything the coordinator needs for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SieveConfig {
    pub range: GlobalRange,
    pub threads: usize,
    pub increment: u64,
    pub queue_capacity: usize,
}

impl SieveConfig {
    pub fn new(range: GlobalRange) -> Self {
        let threads = default_threads();
        Self {
            range,
            threads,
            increment: DEFAULT_INCREMENT,
            queue_capacity: queue_capacity_for(threads),
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.clamp(1, MAX_THREADS);
        self.queue_capacity = queue_capacity_for(self.threads);
        self
    }

    pub fn with_increment(mut self, increment: u64) -> Self {
        self.increment = increment.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.clamp(1, MAX_QUEUE_CAPACITY);
        self
    }

    /// Build from raw command line values. Anything missing, unparsable,
    /// zero or out of range keeps its default.
    pub fn from_raw(
        start: Option<&str>,
        end: Option<&str>,
        threads: Option<&str>,
        increment: Option<&str>,
        queue_capacity: Option<&str>,
    ) -> Self {
        let start = start.and_then(parse_number).unwrap_or(DEFAULT_START);
        let end = end.and_then(parse_number).unwrap_or(DEFAULT_END);

        let mut config = Self::new(GlobalRange::new(start, end));
        if let Some(threads) = threads.and_then(|t| parse_count(t, MAX_THREADS)) {
            config = config.with_threads(threads);
        }
        if let Some(increment) = increment.and_then(parse_number) {
            config = config.with_increment(increment);
        }
        if let Some(capacity) = queue_capacity.and_then(|q| parse_count(q, MAX_QUEUE_CAPACITY)) {
            config = config.with_queue_capacity(capacity);
        }
        config
    }
}

pub fn default_threads() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Positive number in decimal or `0x` hex. Zero, garbage and overflow give
/// `None`.
pub fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => text.parse::<u64>().ok()?,
    };
    (value != 0).then_some(value)
}

/// Like [`parse_number`], but anything above `max` is out of range too.
fn parse_count(text: &str, max: usize) -> Option<usize> {
    parse_number(text)
        .and_then(|n| usize::try_from(n).ok())
        .filter(|&n| n <= max)
}

/// Split the command line into arguments `command` understands and the
/// ones it should never see. The program name is kept. Flags are looked up
/// in `command` itself, which must already be built so the generated help
/// and version flags are present. A value flag without a value counts as
/// unrecognized.
pub fn split_args<I>(command: &Command, args: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut known: Vec<String> = args.next().into_iter().collect();
    let mut unknown = Vec::new();

    while let Some(arg) = args.next() {
        let flag = match arg.strip_prefix("--") {
            Some(long) => {
                let (name, inline) = match long.split_once('=') {
                    Some((name, _)) => (name, true),
                    None => (long, false),
                };
                command
                    .get_arguments()
                    .find(|a| a.get_long() == Some(name))
                    .map(|a| (a.get_action().takes_values(), inline))
            }
            None => short_flag(command, &arg),
        };

        match flag {
            // `--start=5`, `-s5` or a plain switch
            Some((false, false)) | Some((true, true)) => known.push(arg),
            Some((true, false)) => match args.next() {
                Some(value) => {
                    known.push(arg);
                    known.push(value);
                }
                None => unknown.push(arg),
            },
            Some((false, true)) | None => unknown.push(arg),
        }
    }

    (known, unknown)
}

/// `(takes_value, value_attached)` for a short flag such as `-s`, `-s5` or a
/// cluster of switches like `-vh`.
fn short_flag(command: &Command, arg: &str) -> Option<(bool, bool)> {
    let mut chars = arg.strip_prefix('-')?.chars();
    let first = chars.next()?;
    let lookup = |c: char| command.get_arguments().find(|a| a.get_short() == Some(c));

    let first = lookup(first)?;
    let rest = chars.as_str();
    if first.get_action().takes_values() {
        return Some((true, !rest.is_empty()));
    }
    let all_switches = rest
        .chars()
        .all(|c| lookup(c).is_some_and(|a| !a.get_action().takes_values()));
    all_switches.then_some((false, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::{CommandFactory, Parser};

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn split(args: &[&str]) -> (Vec<String>, Vec<String>) {
        let mut command = Cli::command();
        command.build();
        split_args(&command, strings(args))
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("100"), Some(100));
        assert_eq!(parse_number(" 42 "), Some(42));
        assert_eq!(parse_number("0x1F"), Some(31));
        assert_eq!(parse_number("0"), None);
        assert_eq!(parse_number("-5"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("18446744073709551616"), None);
        assert_eq!(parse_number("18446744073709551615"), Some(u64::MAX));
    }

    #[test]
    fn test_from_raw_falls_back_to_defaults() {
        let config = SieveConfig::from_raw(Some("zero"), Some("0"), Some("0"), Some("-1"), None);
        assert_eq!(config.range, GlobalRange::new(DEFAULT_START, DEFAULT_END));
        assert_eq!(config.threads, default_threads());
        assert_eq!(config.increment, DEFAULT_INCREMENT);
        assert_eq!(config.queue_capacity, queue_capacity_for(default_threads()));
    }

    #[test]
    fn test_huge_thread_count_falls_back() {
        let config = SieveConfig::from_raw(None, None, Some("0x40000000000000"), None, None);
        assert_eq!(config.threads, default_threads());
        assert_eq!(config.queue_capacity, queue_capacity_for(default_threads()));

        let config = SieveConfig::from_raw(None, None, Some("4097"), None, None);
        assert_eq!(config.threads, default_threads());

        let config = SieveConfig::new(GlobalRange::new(2, 100)).with_threads(usize::MAX);
        assert_eq!(config.threads, MAX_THREADS);
        assert!(config.queue_capacity <= MAX_QUEUE_CAPACITY);
    }

    #[test]
    fn test_queue_capacity_is_capped() {
        let config = SieveConfig::from_raw(None, None, Some("1"), None, Some("0x100000000000"));
        assert_eq!(config.threads, 1);
        assert_eq!(config.queue_capacity, QUEUE_SLOTS_PER_WORKER);

        let config = SieveConfig::from_raw(None, None, Some("1"), None, Some("0x400000"));
        assert_eq!(config.queue_capacity, MAX_QUEUE_CAPACITY);

        let config = SieveConfig::new(GlobalRange::new(2, 100)).with_queue_capacity(usize::MAX);
        assert_eq!(config.queue_capacity, MAX_QUEUE_CAPACITY);
    }

    #[test]
    fn test_queue_capacity_for_saturates() {
        assert_eq!(queue_capacity_for(2), 2 * QUEUE_SLOTS_PER_WORKER);
        assert_eq!(queue_capacity_for(usize::MAX), MAX_QUEUE_CAPACITY);
    }

    #[test]
    fn test_from_raw_overrides() {
        let config =
            SieveConfig::from_raw(Some("50"), Some("0x3C"), Some("3"), Some("20"), Some("16"));
        assert_eq!(config.range, GlobalRange::new(50, 60));
        assert_eq!(config.threads, 3);
        assert_eq!(config.increment, 20);
        assert_eq!(config.queue_capacity, 16);
    }

    #[test]
    fn test_split_args_keeps_known_flags() {
        let (known, unknown) = split(&[
            "ntsieve", "-s", "5", "--bogus", "--end", "90", "-x", "-v", "--threads=2",
        ]);
        assert_eq!(
            known,
            strings(&["ntsieve", "-s", "5", "--end", "90", "-v", "--threads=2"])
        );
        assert_eq!(unknown, strings(&["--bogus", "-x"]));
    }

    #[test]
    fn test_split_args_dangling_value_flag() {
        let (known, unknown) = split(&["ntsieve", "-e"]);
        assert_eq!(known, strings(&["ntsieve"]));
        assert_eq!(unknown, strings(&["-e"]));
    }

    #[test]
    fn test_split_args_value_flag_swallows_next() {
        // Like the flag parsers it replaces, the next token is always the value
        let (known, unknown) = split(&["ntsieve", "-t", "-v"]);
        assert_eq!(known, strings(&["ntsieve", "-t", "-v"]));
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_split_args_attached_short_values() {
        let (known, unknown) = split(&["ntsieve", "-s5", "-e0x3C", "-vh", "-vs5", "--verbose=yes"]);
        assert_eq!(known, strings(&["ntsieve", "-s5", "-e0x3C", "-vh"]));
        assert_eq!(unknown, strings(&["-vs5", "--verbose=yes"]));
    }

    #[test]
    fn test_split_args_knows_every_cli_flag() {
        let (known, unknown) = split(&[
            "ntsieve", "-c", "20", "--queue-capacity", "8", "-q8", "-V", "--help",
        ]);
        assert_eq!(known.len(), 8);
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_attached_values_reach_config() {
        let (known, unknown) = split(&["ntsieve", "-s50", "-e60", "-t2"]);
        assert!(unknown.is_empty());
        let cli = Cli::try_parse_from(known).unwrap();
        let config = SieveConfig::from_raw(
            cli.start.as_deref(),
            cli.end.as_deref(),
            cli.threads.as_deref(),
            None,
            None,
        );
        assert_eq!(config.range, GlobalRange::new(50, 60));
        assert_eq!(config.threads, 2);
    }
}
