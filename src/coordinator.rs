//! Checkpoint-pipelined sieve driver.
//!
//! The coordinator owns the checkpoint window and the three composite set
//! generations. Every round it:
//! - opens a fresh work queue and wakes all workers with the new window
//! - enqueues the candidate factors that became eligible when the mark span
//!   grew, then closes the queue
//! - prints the finalize span from the to-print set while workers mark
//! - waits for every worker to report idle
//! - rotates the sets and advances the window
//!
//! When the verify span reaches the end of the range it shuts the workers
//! down and drains the two generations still holding unprinted numbers,
//! to-print first so output stays ascending.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Sender, bounded, unbounded};

use crate::composite::{CompositeSet, Generations};
use crate::config::SieveConfig;
use crate::log::verbose;
use crate::queue::work_queue;
use crate::round::{Command, Report, Round, RoundBarrier};
use crate::sink::PrimeSink;
use crate::window::{CheckpointWindow, Span, candidate_bound};
use crate::worker::Worker;

/// Totals for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub primes: u64,
    pub rounds: u64,
    pub candidates: u64,
    pub marks: u64,
    /// Marking factors each worker held at shutdown, composites included.
    pub factors_per_worker: Vec<usize>,
    pub elapsed_us: u128,
}

/// Command senders and thread handles of the worker threads.
struct WorkerPool {
    commands: Vec<Sender<Command>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn spawn(threads: usize, reports: &Sender<Report>) -> io::Result<Self> {
        let mut pool = WorkerPool {
            commands: Vec::with_capacity(threads),
            handles: Vec::with_capacity(threads),
        };

        for id in 0..threads {
            // A worker only ever has one outstanding command
            let (tx, rx) = bounded(1);
            match Worker::new(id, rx, reports.clone()).spawn() {
                Ok(handle) => {
                    pool.commands.push(tx);
                    pool.handles.push(handle);
                }
                Err(e) => {
                    let _ = pool.join();
                    return Err(e);
                }
            }
        }

        Ok(pool)
    }

    fn broadcast(&self, round: &Arc<Round>) -> io::Result<()> {
        for (id, tx) in self.commands.iter().enumerate() {
            tx.send(Command::Run(Arc::clone(round))).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    format!("worker {} is no longer running", id),
                )
            })?;
        }
        Ok(())
    }

    fn request_shutdown(&self) {
        for tx in &self.commands {
            let _ = tx.send(Command::Shutdown);
        }
    }

    /// Disconnects the command channels (which stops any worker still
    /// waiting) and joins every thread.
    fn join(self) -> io::Result<()> {
        drop(self.commands);

        let mut result = Ok(());
        for (id, handle) in self.handles.into_iter().enumerate() {
            if handle.join().is_err() && result.is_ok() {
                result = Err(io::Error::other(format!("worker {} panicked", id)));
            }
        }
        result
    }
}

/// Emit every odd number in `span` that `set` never marked.
fn drain<S: PrimeSink>(set: &CompositeSet, span: Span, sink: &mut S) -> io::Result<u64> {
    let mut count = 0;
    for n in span.odds() {
        if !set.contains(n) {
            sink.emit(n)?;
            count += 1;
        }
    }
    Ok(count)
}

pub struct Coordinator {
    config: SieveConfig,
    bound: fn(u64) -> u64,
}

impl Coordinator {
    pub fn new(config: SieveConfig) -> Self {
        Self {
            config,
            bound: candidate_bound,
        }
    }

    #[cfg(test)]
    fn with_candidate_bound(mut self, bound: fn(u64) -> u64) -> Self {
        self.bound = bound;
        self
    }

    /// Sieve the configured range into `sink`, ascending. Returns once every
    /// worker has been joined.
    pub fn run<S: PrimeSink>(&self, sink: &mut S) -> io::Result<RunSummary> {
        let started = Instant::now();
        let range = self.config.range;
        let mut summary = RunSummary::default();

        verbose!(
            "sieving [{}, {}) with {} workers, increment {}",
            range.start,
            range.end,
            self.config.threads,
            self.config.increment
        );

        // The window only ever looks at odd numbers from 3 up
        if range.contains_two() {
            sink.emit(2)?;
            summary.primes += 1;
        }

        if range.window_start() < range.end {
            let (report_tx, report_rx) = unbounded();
            let pool = WorkerPool::spawn(self.config.threads.max(1), &report_tx)?;
            // Only workers hold report senders now, so a barrier wait fails
            // instead of hanging if they all disappear
            drop(report_tx);
            let barrier = RoundBarrier::new(report_rx, pool.handles.len());

            let outcome = self
                .pipeline(&pool, &barrier, sink, &mut summary)
                .and_then(|()| barrier.wait_exited());
            // Join even after a failure so no worker outlives the run
            let joined = pool.join();
            summary.factors_per_worker = outcome?;
            joined?;
        }

        sink.finish()?;
        summary.elapsed_us = started.elapsed().as_micros();
        Ok(summary)
    }

    fn pipeline<S: PrimeSink>(
        &self,
        pool: &WorkerPool,
        barrier: &RoundBarrier,
        sink: &mut S,
        summary: &mut RunSummary,
    ) -> io::Result<()> {
        let range = self.config.range;
        let window_start = range.window_start();
        let mut window = CheckpointWindow::new(window_start, range.end, self.config.increment);
        let mut generations = Generations::new();

        // Every factor below the window start must be tried before the first
        // round, no earlier round did it
        let preseed_to = (self.bound)(window_start);
        let mut enqueued_to = preseed_to;

        window.advance();
        while !window.is_done() {
            summary.rounds += 1;
            let (mut feed, queue) = work_queue(self.config.queue_capacity);
            let round = Arc::new(Round::new(
                summary.rounds,
                window,
                Arc::clone(generations.frozen()),
                Arc::clone(generations.active()),
                queue,
            ));
            pool.broadcast(&round)?;
            drop(round);

            if summary.rounds == 1 {
                let seeded = feed.push_odds(3, preseed_to)?;
                verbose!("pre-seeded {} candidates below {}", seeded, preseed_to);
            }
            let eligible_to = (self.bound)(window.mark().upper).max(enqueued_to);
            feed.push_odds(enqueued_to, eligible_to)?;
            enqueued_to = eligible_to;
            summary.candidates += feed.close();

            // The to-print set is out of the workers' reach, print it while
            // they mark
            summary.primes += drain(generations.to_print(), window.finalize(), sink)?;

            let tally = barrier.wait()?;
            summary.marks += tally.marks;
            verbose!(
                "round {}: window {:?}, took {}, promoted {}, discarded {}, {} composites in mark span",
                summary.rounds,
                window.bounds(),
                tally.taken,
                tally.promoted,
                tally.discarded,
                generations.active().len()
            );

            generations.rotate();
            window.advance();
        }

        pool.request_shutdown();

        // Nothing marks these sets any more
        summary.primes += drain(generations.to_print(), window.finalize(), sink)?;
        summary.primes += drain(generations.frozen(), window.verify(), sink)?;

        Ok(())
    }
}
