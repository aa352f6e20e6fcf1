//! One round of the pipeline as seen by the workers, and the messages that
//! open rounds, close them and shut the pool down.
//!
//! A round is opened by sending every worker [`Command::Run`] with a shared
//! [`Round`]. Each worker answers exactly once per round with
//! [`Report::Idle`] after the work queue has been closed and drained, which
//! is the coordinator's barrier. Channel operations carry the happens-before
//! edges: everything a worker marked is visible to the coordinator once it
//! has received that worker's idle report.

use std::io;
use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::composite::CompositeSet;
use crate::queue::{TryTake, WorkQueue};
use crate::window::{CheckpointWindow, Span};

/// Shared, read-only view of one round handed to every worker.
pub struct Round {
    pub number: u64,
    window: CheckpointWindow,
    frozen: Arc<CompositeSet>,
    active: Arc<CompositeSet>,
    queue: WorkQueue,
}

impl Round {
    pub fn new(
        number: u64,
        window: CheckpointWindow,
        frozen: Arc<CompositeSet>,
        active: Arc<CompositeSet>,
        queue: WorkQueue,
    ) -> Self {
        Self {
            number,
            window,
            frozen,
            active,
            queue,
        }
    }

    pub fn mark_span(&self) -> Span {
        self.window.mark()
    }

    pub fn verify_span(&self) -> Span {
        self.window.verify()
    }

    pub fn try_take_work(&self) -> TryTake {
        self.queue.try_take()
    }

    /// Blocking variant of [`Round::try_take_work`]; `None` once the queue is
    /// closed and empty.
    pub fn take_work(&self) -> Option<u64> {
        self.queue.take()
    }

    pub fn publish_composite(&self, n: u64) {
        self.active.insert(n);
    }

    /// Only meaningful inside the verify span: the frozen set holds every
    /// composite there and nothing about any other number.
    pub fn is_known_composite(&self, n: u64) -> bool {
        debug_assert!(
            self.verify_span().contains(n),
            "{} queried outside verify span {:?} in round {}",
            n,
            self.verify_span(),
            self.number
        );
        self.frozen.contains(n)
    }
}

/// Coordinator to worker.
pub enum Command {
    Run(Arc<Round>),
    Shutdown,
}

/// What a worker did during one round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTally {
    /// Candidates pulled from the shared queue.
    pub taken: u64,
    /// Pending candidates kept as marking factors.
    pub promoted: u64,
    /// Pending candidates found in the frozen set.
    pub discarded: u64,
    /// Composite marks published, duplicates included.
    pub marks: u64,
}

impl WorkerTally {
    pub fn merge(&mut self, other: &WorkerTally) {
        self.taken += other.taken;
        self.promoted += other.promoted;
        self.discarded += other.discarded;
        self.marks += other.marks;
    }
}

/// Worker to coordinator.
#[derive(Debug)]
pub enum Report {
    Idle { tally: WorkerTally },
    Exited { worker: usize, factors: usize },
    Failed { worker: usize },
}

/// Counts one idle report per worker to close a round.
pub struct RoundBarrier {
    reports: Receiver<Report>,
    workers: usize,
}

impl RoundBarrier {
    pub fn new(reports: Receiver<Report>, workers: usize) -> Self {
        Self { reports, workers }
    }

    /// Blocks until every worker has reported idle for the current round.
    pub fn wait(&self) -> io::Result<WorkerTally> {
        let mut total = WorkerTally::default();
        let mut idle = 0;
        while idle < self.workers {
            match self.recv()? {
                Report::Idle { tally } => {
                    total.merge(&tally);
                    idle += 1;
                }
                Report::Exited { worker, .. } => {
                    return Err(io::Error::other(format!(
                        "worker {} exited during a round",
                        worker
                    )));
                }
                Report::Failed { worker } => {
                    return Err(io::Error::other(format!("worker {} panicked", worker)));
                }
            }
        }
        Ok(total)
    }

    /// Blocks until every worker has acknowledged shutdown. Returns how many
    /// marking factors each worker held, indexed by worker.
    pub fn wait_exited(&self) -> io::Result<Vec<usize>> {
        let mut known = vec![0; self.workers];
        let mut exited = 0;
        while exited < self.workers {
            match self.recv()? {
                Report::Exited { worker, factors } => {
                    known[worker] = factors;
                    exited += 1;
                }
                Report::Idle { .. } => {}
                Report::Failed { worker } => {
                    return Err(io::Error::other(format!("worker {} panicked", worker)));
                }
            }
        }
        Ok(known)
    }

    fn recv(&self) -> io::Result<Report> {
        self.reports
            .recv()
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "all workers disconnected"))
    }
}
