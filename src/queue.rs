use std::io;

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};

use crate::window::odd_ceil;

/// Outcome of a non-blocking take from the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryTake {
    Ready(u64),
    /// Nothing queued right now, but the coordinator may still push more.
    Empty,
    /// The coordinator closed the queue and everything has been taken.
    Closed,
}

/// Producer half of a round's work queue, owned by the coordinator.
///
/// Dropping it (or calling [`WorkFeed::close`]) closes the queue: workers see
/// [`TryTake::Closed`] once the remaining candidates are gone. The channel
/// close is what publishes "no more work this round" to the workers.
pub struct WorkFeed {
    tx: Sender<u64>,
    queued: u64,
}

/// Consumer half, shared by every worker for one round.
#[derive(Clone)]
pub struct WorkQueue {
    rx: Receiver<u64>,
}

pub fn work_queue(capacity: usize) -> (WorkFeed, WorkQueue) {
    let (tx, rx) = bounded(capacity.max(1));
    (WorkFeed { tx, queued: 0 }, WorkQueue { rx })
}

impl WorkFeed {
    /// Blocks while the queue is full. Fails only when every worker has
    /// dropped its end, which means they all died.
    pub fn push(&mut self, candidate: u64) -> io::Result<()> {
        self.tx
            .send(candidate)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "all workers exited"))?;
        self.queued += 1;
        Ok(())
    }

    /// Push every odd number in `[lower, upper)`, ignoring anything below 3.
    pub fn push_odds(&mut self, lower: u64, upper: u64) -> io::Result<u64> {
        let before = self.queued;
        for candidate in (odd_ceil(lower.max(3))..upper).step_by(2) {
            self.push(candidate)?;
        }
        Ok(self.queued - before)
    }

    pub fn close(self) -> u64 {
        self.queued
    }
}

impl WorkQueue {
    pub fn try_take(&self) -> TryTake {
        match self.rx.try_recv() {
            Ok(candidate) => TryTake::Ready(candidate),
            Err(TryRecvError::Empty) => TryTake::Empty,
            Err(TryRecvError::Disconnected) => TryTake::Closed,
        }
    }

    /// Blocks until a candidate arrives or the queue is closed and drained.
    pub fn take(&self) -> Option<u64> {
        self.rx.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_empty_is_distinct_from_closed() {
        let (mut feed, queue) = work_queue(4);
        assert_eq!(queue.try_take(), TryTake::Empty);

        feed.push(7).unwrap();
        assert_eq!(queue.try_take(), TryTake::Ready(7));
        assert_eq!(queue.try_take(), TryTake::Empty);

        feed.push(9).unwrap();
        assert_eq!(feed.close(), 2);
        // Anything queued before the close is still delivered
        assert_eq!(queue.try_take(), TryTake::Ready(9));
        assert_eq!(queue.try_take(), TryTake::Closed);
        assert_eq!(queue.take(), None);
    }

    #[test]
    fn test_push_odds_skips_even_and_small() {
        let (mut feed, queue) = work_queue(64);
        assert_eq!(feed.push_odds(0, 12).unwrap(), 5);
        assert_eq!(feed.push_odds(12, 12).unwrap(), 0);
        drop(feed);

        let taken: Vec<u64> = std::iter::from_fn(|| queue.take()).collect();
        assert_eq!(taken, vec![3, 5, 7, 9, 11]);
    }

    #[test]
    fn test_push_fails_without_consumers() {
        let (mut feed, queue) = work_queue(1);
        drop(queue);
        assert!(feed.push(3).is_err());
    }

    #[test]
    fn test_bounded_queue_drains_across_consumers() {
        let (mut feed, queue) = work_queue(2);

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || {
                    let mut sum = 0u64;
                    while let Some(n) = queue.take() {
                        sum += n;
                    }
                    sum
                })
            })
            .collect();
        drop(queue);

        feed.push_odds(3, 1_001).unwrap();
        feed.close();

        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, (3..1_001u64).step_by(2).sum::<u64>());
    }
}
