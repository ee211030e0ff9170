//! The single collective of a distributed run
//!
//! Workers never talk while stepping. At the end every rank contributes its
//! local totals, rank 0 combines them (sums, max wall time), computes the
//! global averages, and sends the same aggregate back to every rank.

use crossbeam_channel::{unbounded, Receiver, Select, Sender};

use crate::error::{Result, SimError};
use crate::simulation::{LocalContribution, MetricsSummary};

/// Result of the collective, identical on every rank
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalAggregate {
    pub totals: LocalContribution,
    pub summary: MetricsSummary,
}

/// Membership in a worker group
pub trait Communicator: Send {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Reduce to rank 0, then broadcast.
    ///
    /// Blocks until every rank has called it. Each rank must call it exactly
    /// once, including ranks that simulated nothing.
    fn reduce_and_broadcast(
        &self,
        local: LocalContribution,
        total_sim_time: f64,
    ) -> Result<GlobalAggregate>;
}

enum Link {
    Root {
        /// Indexed by `rank - 1`
        from_workers: Vec<Receiver<LocalContribution>>,
        to_workers: Vec<Sender<GlobalAggregate>>,
    },
    Worker {
        to_root: Sender<LocalContribution>,
        from_root: Receiver<GlobalAggregate>,
    },
}

/// In-process communicator backed by crossbeam channels.
///
/// Every worker has its own pair of channels to the root, so the root sees
/// exactly which rank went away. A worker that drops its communicator
/// without contributing fails the collective on the root; the remaining
/// workers fail once the root's communicator is dropped.
pub struct ChannelCommunicator {
    rank: usize,
    size: usize,
    link: Link,
}

/// Creates a connected group of `size` communicators, ranks `0..size`
pub fn channel_group(size: usize) -> Vec<ChannelCommunicator> {
    let size = size.max(1);

    let mut from_workers = Vec::with_capacity(size - 1);
    let mut to_workers = Vec::with_capacity(size - 1);
    let mut members = Vec::with_capacity(size);
    for rank in 1..size {
        let (up_tx, up_rx) = unbounded();
        let (down_tx, down_rx) = unbounded();
        from_workers.push(up_rx);
        to_workers.push(down_tx);
        members.push(ChannelCommunicator {
            rank,
            size,
            link: Link::Worker {
                to_root: up_tx,
                from_root: down_rx,
            },
        });
    }

    members.insert(
        0,
        ChannelCommunicator {
            rank: 0,
            size,
            link: Link::Root {
                from_workers,
                to_workers,
            },
        },
    );
    members
}

impl ChannelCommunicator {
    fn collective_error(&self, reason: impl Into<String>) -> SimError {
        SimError::Collective {
            rank: self.rank,
            reason: reason.into(),
        }
    }

    /// Waits on every worker at once, in whatever order they arrive
    fn gather(
        &self,
        from_workers: &[Receiver<LocalContribution>],
        parts: &mut [Option<LocalContribution>],
    ) -> Result<()> {
        let mut pending: Vec<usize> = (1..self.size).collect();
        while !pending.is_empty() {
            let mut sel = Select::new();
            for &rank in &pending {
                sel.recv(&from_workers[rank - 1]);
            }
            let op = sel.select();
            let slot = op.index();
            let rank = pending[slot];
            let part = op.recv(&from_workers[rank - 1]).map_err(|_| {
                self.collective_error(format!("rank {rank} left before contributing"))
            })?;
            parts[rank] = Some(part);
            pending.swap_remove(slot);
        }
        Ok(())
    }
}

impl Communicator for ChannelCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn reduce_and_broadcast(
        &self,
        local: LocalContribution,
        total_sim_time: f64,
    ) -> Result<GlobalAggregate> {
        match &self.link {
            Link::Root {
                from_workers,
                to_workers,
            } => {
                let mut parts = vec![None; self.size];
                parts[0] = Some(local);
                self.gather(from_workers, &mut parts)?;

                // combine in rank order so float sums do not depend on arrival order
                let totals = parts
                    .into_iter()
                    .flatten()
                    .fold(LocalContribution::default(), LocalContribution::combine);
                let aggregate = GlobalAggregate {
                    summary: totals.summarize(total_sim_time),
                    totals,
                };

                for (i, tx) in to_workers.iter().enumerate() {
                    tx.send(aggregate.clone()).map_err(|_| {
                        self.collective_error(format!("rank {} left before the broadcast", i + 1))
                    })?;
                }
                Ok(aggregate)
            }
            Link::Worker { to_root, from_root } => {
                to_root
                    .send(local)
                    .map_err(|_| self.collective_error("coordinator is gone"))?;
                from_root
                    .recv()
                    .map_err(|_| self.collective_error("coordinator left before the broadcast"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn contribution(finished: u64, wall_time: f64) -> LocalContribution {
        LocalContribution {
            finished_count: finished,
            travel_time_sum: 10.0 * finished as f64,
            stops_sum: finished as f64,
            spawned: finished + 1,
            active_at_end: 1,
            travel_times: vec![10.0; finished as usize],
            wall_time,
        }
    }

    #[test]
    fn every_rank_receives_the_same_aggregate() {
        let group = channel_group(3);
        assert_eq!(group.iter().map(|c| c.rank()).collect::<Vec<_>>(), vec![0, 1, 2]);

        let results: Vec<GlobalAggregate> = thread::scope(|s| {
            let handles: Vec<_> = group
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let local = contribution(comm.rank() as u64, 0.1 * (comm.rank() + 1) as f64);
                        comm.reduce_and_broadcast(local, 60.0).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.windows(2).all(|w| w[0] == w[1]));
        let agg = &results[0];
        assert_eq!(agg.totals.finished_count, 3);
        assert_eq!(agg.totals.spawned, 6);
        assert_eq!(agg.totals.active_at_end, 3);
        assert_eq!(agg.totals.travel_times.len(), 3);
        assert!((agg.totals.wall_time - 0.3).abs() < 1e-12);
        assert_eq!(agg.summary.avg_travel_time, 10.0);
        assert_eq!(agg.summary.throughput_per_min, 3.0);
    }

    #[test]
    fn single_rank_group_reduces_locally() {
        let group = channel_group(1);
        let agg = group[0]
            .reduce_and_broadcast(contribution(0, 0.5), 60.0)
            .unwrap();
        assert_eq!(agg.summary, MetricsSummary::default());
        assert_eq!(agg.totals.wall_time, 0.5);
    }

    #[test]
    fn departed_worker_fails_the_collective_instead_of_hanging() {
        let mut group = channel_group(2);
        let worker = group.pop().unwrap();
        drop(worker);

        let err = group[0]
            .reduce_and_broadcast(contribution(1, 0.1), 60.0)
            .unwrap_err();
        assert!(matches!(err, SimError::Collective { rank: 0, .. }));
    }

    #[test]
    fn departed_worker_is_noticed_while_others_wait() {
        let mut group = channel_group(3);
        drop(group.pop().unwrap());
        let waiting = group.pop().unwrap();
        let root = group.pop().unwrap();

        thread::scope(|s| {
            let worker = s.spawn(move || waiting.reduce_and_broadcast(contribution(2, 0.1), 60.0));

            let err = root
                .reduce_and_broadcast(contribution(1, 0.1), 60.0)
                .unwrap_err();
            match err {
                SimError::Collective { rank: 0, reason } => assert!(reason.contains("rank 2")),
                other => panic!("unexpected error {other}"),
            }

            // the waiting worker is released once the root goes away
            drop(root);
            let released = worker.join().unwrap().unwrap_err();
            assert!(matches!(released, SimError::Collective { rank: 1, .. }));
        });
    }
}
