use std::collections::VecDeque;
use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::log::verbose;
use crate::queue::TryTake;
use crate::round::{Command, Report, Round, WorkerTally};
use crate::window::Span;

/// Smallest odd multiple of `p` that is `>= lower` and not `p` itself.
/// `None` when it does not fit in a `u64`. `p` must be odd.
#[inline]
pub fn first_odd_multiple(p: u64, lower: u64) -> Option<u64> {
    let mut start = lower.div_ceil(p).checked_mul(p)?;
    if start % 2 == 0 {
        start = start.checked_add(p)?; // Make it odd
    }
    if start == p {
        start = start.checked_add(p.checked_mul(2)?)?;
    }
    Some(start)
}

/// Publish every odd multiple of `p` in `span` (except `p`) as composite.
/// Returns the number of marks published.
pub fn mark_multiples(p: u64, span: Span, round: &Round) -> u64 {
    let Some(mut multiple) = first_odd_multiple(p, span.lower) else {
        return 0;
    };
    let Some(step) = p.checked_mul(2) else {
        return 0;
    };

    let mut marks = 0;
    while multiple < span.upper {
        round.publish_composite(multiple);
        marks += 1;
        multiple = match multiple.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    marks
}

/// Sends a failure report if the worker thread unwinds, so the coordinator
/// stops waiting on the barrier.
struct PanicReport<'a> {
    worker: usize,
    reports: &'a Sender<Report>,
}

impl Drop for PanicReport<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            let _ = self.reports.send(Report::Failed {
                worker: self.worker,
            });
        }
    }
}

/// One sieve thread.
///
/// Every round it goes through the same phases:
/// 1. marking: replay every factor it already holds over the mark span
/// 2. validating pending: check last round's candidates against the frozen
///    set, promoting survivors to factors and marking with them right away
/// 3. polling the queue: take candidates until the queue is closed, marking
///    with each and keeping it pending for the next round
/// 4. idle: report to the barrier and wait for the next command
pub struct Worker {
    id: usize,
    /// Factors marked with every round. Candidates outside the verify span
    /// are kept unchecked, so this holds composites as well as primes.
    factors: Vec<u64>,
    pending: VecDeque<u64>,
    commands: Receiver<Command>,
    reports: Sender<Report>,
}

impl Worker {
    pub fn new(id: usize, commands: Receiver<Command>, reports: Sender<Report>) -> Self {
        Self {
            id,
            factors: Vec::new(),
            pending: VecDeque::new(),
            commands,
            reports,
        }
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("sieve-worker-{}", self.id))
            .spawn(move || self.run())
    }

    fn run(mut self) {
        let reports = self.reports.clone();
        let _guard = PanicReport {
            worker: self.id,
            reports: &reports,
        };

        // A disconnected command channel means the coordinator is gone,
        // treat it like a shutdown
        while let Ok(Command::Run(round)) = self.commands.recv() {
            let tally = self.run_round(&round);
            // Drop the round before reporting so the coordinator holds the
            // only handle to the active set once the barrier completes
            drop(round);
            if reports.send(Report::Idle { tally }).is_err() {
                return;
            }
        }

        verbose!(
            "worker {} exiting, {} marking factors, {} pending",
            self.id,
            self.factors.len(),
            self.pending.len()
        );
        let _ = reports.send(Report::Exited {
            worker: self.id,
            factors: self.factors.len(),
        });
    }

    pub fn run_round(&mut self, round: &Round) -> WorkerTally {
        let mut tally = WorkerTally::default();
        let span = round.mark_span();

        for &p in &self.factors {
            tally.marks += mark_multiples(p, span, round);
        }

        self.validate_pending(round, &mut tally);
        self.poll_queue(round, &mut tally);

        tally
    }

    fn validate_pending(&mut self, round: &Round, tally: &mut WorkerTally) {
        let span = round.mark_span();
        let verify = round.verify_span();

        while let Some(candidate) = self.pending.pop_front() {
            // Only the verify span has an authoritative composite set. A
            // candidate anywhere else cannot be disproved, keep it; marking
            // with a composite only repeats marks its factors already made
            if verify.contains(candidate) && round.is_known_composite(candidate) {
                tally.discarded += 1;
                continue;
            }
            self.factors.push(candidate);
            tally.promoted += 1;
            tally.marks += mark_multiples(candidate, span, round);
        }
    }

    fn poll_queue(&mut self, round: &Round, tally: &mut WorkerTally) {
        let span = round.mark_span();
        loop {
            let candidate = match round.try_take_work() {
                TryTake::Ready(candidate) => candidate,
                TryTake::Empty => match round.take_work() {
                    Some(candidate) => candidate,
                    None => break,
                },
                TryTake::Closed => break,
            };
            tally.taken += 1;
            tally.marks += mark_multiples(candidate, span, round);
            self.pending.push_back(candidate);
        }
    }
}
