//! Fixed composition of [`crate::runner::BlockRunner`]s driven by a
//! pluggable [`TaskPolicy`].
//!
//! Grounded directly on the original source's `cler::FlowGraph`: a fixed
//! set of runners launched together, each looping on its block's
//! `procedure` until a fatal error or an explicit `stop()`.

mod backoff;
mod policy;

pub use policy::{CooperativeTaskPolicy, HostedPolicy, NonePolicy, TaskPolicy};

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::block::ChannelFullness;
use crate::error::Error;
use crate::runner::RunnerHandle;

/// Live, per-runner counters updated as a [`FlowGraph`] executes.
///
/// Every counter here is cumulative across `run()`/`stop()` cycles: a
/// `BlockStats` is created once, in [`FlowGraph::new`], and never replaced,
/// so stopping and re-running a graph accumulates onto the same totals
/// rather than resetting them. Only the runner currently driving this
/// block's procedure ever writes to it.
#[derive(Default)]
pub struct BlockStats {
    successes: AtomicU64,
    not_enough_samples: AtomicU64,
    not_enough_space: AtomicU64,
    procedure_error: AtomicU64,
    term_io_error: AtomicU64,
    term_procedure_error: AtomicU64,
    term_channel_closed: AtomicU64,
    invalid_topology: AtomicU64,
    task_creation_failed: AtomicU64,
    allocation_failed: AtomicU64,
    unsupported_platform: AtomicU64,
    sleeps_applied: AtomicU64,
    run_nanos: AtomicU64,
    backoff_level: AtomicU8,
    failed: AtomicBool,
    last_fullness: Mutex<ChannelFullness>,
}

/// A tear-free, point-in-time read of a runner's [`BlockStats`].
///
/// Each field is individually consistent; the struct as a whole is not
/// (two fields may be read a few iterations apart), matching the
/// concurrency model's "tear-free per counter, not globally consistent
/// across counters" guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockStatsSnapshot {
    /// Invocations of `procedure` that returned `Ok(())`.
    pub successes: u64,
    pub not_enough_samples: u64,
    pub not_enough_space: u64,
    pub procedure_error: u64,
    pub term_io_error: u64,
    pub term_procedure_error: u64,
    pub term_channel_closed: u64,
    pub invalid_topology: u64,
    pub task_creation_failed: u64,
    pub allocation_failed: u64,
    pub unsupported_platform: u64,
    /// Adaptive-backoff actions that actually delayed the next retry
    /// (a cooperative yield or a sleep), not counting a tight spin.
    pub sleeps_applied: u64,
    /// Cumulative wall-clock time this runner has spent looping, across
    /// every `run()`/`stop()` cycle.
    pub run_time: Duration,
    pub backoff_level: u8,
    /// Whether this runner's own fatal error has ended its loop. A failed
    /// runner no longer advances; its siblings keep running until an
    /// explicit [`FlowGraph::stop`].
    pub failed: bool,
    /// This runner's last-observed input/output channel occupancy.
    pub last_fullness: ChannelFullness,
}

impl BlockStatsSnapshot {
    /// Invocations of `procedure` that returned any `Err`, across every
    /// error kind.
    pub fn misses(&self) -> u64 {
        self.not_enough_samples
            + self.not_enough_space
            + self.procedure_error
            + self.term_io_error
            + self.term_procedure_error
            + self.term_channel_closed
            + self.invalid_topology
            + self.task_creation_failed
            + self.allocation_failed
            + self.unsupported_platform
    }
}

impl BlockStats {
    /// Records a `procedure` call that returned `err`, in the counter
    /// matching its variant.
    fn record_error(&self, err: Error) {
        let counter = match err {
            Error::NotEnoughSamples => &self.not_enough_samples,
            Error::NotEnoughSpace => &self.not_enough_space,
            Error::ProcedureError => &self.procedure_error,
            Error::TermIoError => &self.term_io_error,
            Error::TermProcedureError => &self.term_procedure_error,
            Error::TermChannelClosed => &self.term_channel_closed,
            Error::InvalidTopology => &self.invalid_topology,
            Error::TaskCreationFailed => &self.task_creation_failed,
            Error::AllocationFailed => &self.allocation_failed,
            Error::UnsupportedPlatform => &self.unsupported_platform,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Records this runner's last-observed channel occupancy.
    fn record_fullness(&self, fullness: ChannelFullness) {
        *self.last_fullness.lock() = fullness;
    }

    /// Adds `elapsed` to this runner's cumulative run time.
    fn add_run_time(&self, elapsed: Duration) {
        self.run_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> BlockStatsSnapshot {
        BlockStatsSnapshot {
            successes: self.successes.load(Ordering::Relaxed),
            not_enough_samples: self.not_enough_samples.load(Ordering::Relaxed),
            not_enough_space: self.not_enough_space.load(Ordering::Relaxed),
            procedure_error: self.procedure_error.load(Ordering::Relaxed),
            term_io_error: self.term_io_error.load(Ordering::Relaxed),
            term_procedure_error: self.term_procedure_error.load(Ordering::Relaxed),
            term_channel_closed: self.term_channel_closed.load(Ordering::Relaxed),
            invalid_topology: self.invalid_topology.load(Ordering::Relaxed),
            task_creation_failed: self.task_creation_failed.load(Ordering::Relaxed),
            allocation_failed: self.allocation_failed.load(Ordering::Relaxed),
            unsupported_platform: self.unsupported_platform.load(Ordering::Relaxed),
            sleeps_applied: self.sleeps_applied.load(Ordering::Relaxed),
            run_time: Duration::from_nanos(self.run_nanos.load(Ordering::Relaxed)),
            backoff_level: self.backoff_level.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_fullness: self.last_fullness.lock().clone(),
        }
    }
}

/// A fixed-size, heterogeneous composition of runners, driven by `P`.
pub struct FlowGraph<P: TaskPolicy> {
    runners: Option<Vec<Box<dyn RunnerHandle>>>,
    stats: Vec<Arc<BlockStats>>,
    stop: Arc<AtomicBool>,
    last_fatal: Arc<Mutex<Option<(String, Error)>>>,
    task: Option<P::Task>,
    max_iterations: Option<usize>,
}

impl<P: TaskPolicy> FlowGraph<P> {
    /// Builds a flowgraph over `runners`.
    ///
    /// Fails with [`Error::InvalidTopology`] if `runners` is empty: a
    /// flowgraph with no work to drive has no coherent topology to run.
    /// Finer-grained topology checks (no unreachable channel, no runner
    /// left unconnected) are enforced earlier, at channel-construction
    /// time, by the ownership rules of [`crate::channel::Producer`] and
    /// [`crate::channel::Consumer`] themselves: each can only ever be moved
    /// into one runner or block.
    pub fn new(runners: Vec<Box<dyn RunnerHandle>>) -> Result<Self, Error> {
        if runners.is_empty() {
            return Err(Error::InvalidTopology);
        }
        let stats = runners.iter().map(|_| Arc::new(BlockStats::default())).collect();
        Ok(FlowGraph {
            runners: Some(runners),
            stats,
            stop: Arc::new(AtomicBool::new(false)),
            last_fatal: Arc::new(Mutex::new(None)),
            task: None,
            max_iterations: None,
        })
    }

    /// Bounds the number of scheduling rounds a synchronous
    /// ([`NonePolicy`]) run performs before returning on its own, without
    /// needing an external `stop()` call. Ignored by threaded policies.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Per-runner names, in composition order.
    pub fn runner_names(&self) -> Vec<&str> {
        self.runners
            .as_deref()
            .expect("runner_names called after run() without stop()")
            .iter()
            .map(|r| r.name())
            .collect()
    }

    /// Point-in-time stats for every runner, in composition order.
    pub fn stats(&self) -> Vec<BlockStatsSnapshot> {
        self.stats.iter().map(|s| s.snapshot()).collect()
    }

    /// Launches every runner under policy `P`.
    ///
    /// For threaded policies ([`HostedPolicy`], [`CooperativeTaskPolicy`])
    /// this returns once tasks are created, without waiting for them to
    /// finish; call [`FlowGraph::stop`] to request shutdown and join. For
    /// [`NonePolicy`] this runs synchronously on the calling thread and
    /// only returns once every runner has stopped (by a fatal error, or by
    /// reaching `max_iterations`).
    pub fn run(&mut self) -> Result<(), Error> {
        let runners = self
            .runners
            .take()
            .ok_or(Error::InvalidTopology)?;
        self.stop.store(false, Ordering::Release);
        let task = P::run(
            runners,
            self.stats.clone(),
            self.stop.clone(),
            self.last_fatal.clone(),
            self.max_iterations,
        )?;
        self.task = Some(task);
        Ok(())
    }

    /// Requests every runner still running to stop after its current
    /// `procedure` call, and joins their tasks. Returns the first fatal
    /// error observed by any runner, if any — runners that failed fatally
    /// before this call already stopped on their own; `stop()` only needs
    /// to reach the ones still healthy.
    pub fn stop(&mut self) -> Option<Error> {
        self.stop.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            self.runners = Some(P::join(task));
        }
        self.last_fatal.lock().take().map(|(_, e)| e)
    }
}

impl<P: TaskPolicy> Drop for FlowGraph<P> {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::error::BlockResult;
    use crate::runner::BlockRunner;
    use std::sync::atomic::AtomicUsize;

    struct CountTo {
        remaining: usize,
        calls: Arc<AtomicUsize>,
    }
    impl Block for CountTo {
        type Outputs = ();
        fn procedure(&mut self, _outputs: &mut ()) -> BlockResult {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.remaining == 0 {
                return Err(Error::ProcedureError);
            }
            self.remaining -= 1;
            Ok(())
        }
    }

    struct AlwaysFatal;
    impl Block for AlwaysFatal {
        type Outputs = ();
        fn procedure(&mut self, _outputs: &mut ()) -> BlockResult {
            Err(Error::TermProcedureError)
        }
    }

    #[test]
    fn empty_flowgraph_is_invalid_topology() {
        let result = FlowGraph::<HostedPolicy>::new(vec![]);
        assert_eq!(result.err(), Some(Error::InvalidTopology));
    }

    #[test]
    fn hosted_policy_runs_until_stop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = BlockRunner::new(
            CountTo {
                remaining: usize::MAX,
                calls: calls.clone(),
            },
            (),
        );
        let mut graph = FlowGraph::<HostedPolicy>::new(vec![Box::new(runner)]).unwrap();
        graph.run().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let fatal = graph.stop();
        assert!(fatal.is_none());
        assert!(calls.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn fatal_error_is_reported_by_stop() {
        let runner = BlockRunner::new(AlwaysFatal, ());
        let mut graph = FlowGraph::<HostedPolicy>::new(vec![Box::new(runner)]).unwrap();
        graph.run().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let fatal = graph.stop();
        assert_eq!(fatal, Some(Error::TermProcedureError));
    }

    #[test]
    fn none_policy_respects_max_iterations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = BlockRunner::new(
            CountTo {
                remaining: usize::MAX,
                calls: calls.clone(),
            },
            (),
        );
        let mut graph = FlowGraph::<NonePolicy>::new(vec![Box::new(runner)])
            .unwrap()
            .with_max_iterations(50);
        graph.run().unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 50);
    }

    #[test]
    fn none_policy_stops_on_fatal_error() {
        let runner = BlockRunner::new(AlwaysFatal, ());
        let mut graph = FlowGraph::<NonePolicy>::new(vec![Box::new(runner)])
            .unwrap()
            .with_max_iterations(1000);
        graph.run().unwrap();
        let fatal = graph.stop();
        assert_eq!(fatal, Some(Error::TermProcedureError));
    }

    #[test]
    fn fatal_error_in_one_runner_does_not_stop_its_siblings() {
        // One chain fails fatally; the other keeps making progress until an
        // explicit stop(), matching the "fatal failure isolation" scenario.
        let calls = Arc::new(AtomicUsize::new(0));
        let healthy = BlockRunner::new(
            CountTo {
                remaining: usize::MAX,
                calls: calls.clone(),
            },
            (),
        );
        let doomed = BlockRunner::new(AlwaysFatal, ());
        let mut graph =
            FlowGraph::<HostedPolicy>::new(vec![Box::new(healthy), Box::new(doomed)]).unwrap();
        graph.run().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let calls_at_failure = calls.load(Ordering::Relaxed);
        assert!(calls_at_failure > 0);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(calls.load(Ordering::Relaxed) > calls_at_failure);
        let fatal = graph.stop();
        assert_eq!(fatal, Some(Error::TermProcedureError));
    }

    #[test]
    fn fatal_error_marks_only_its_own_runner_failed_in_stats() {
        let calls = Arc::new(AtomicUsize::new(0));
        let healthy = BlockRunner::new(
            CountTo {
                remaining: usize::MAX,
                calls: calls.clone(),
            },
            (),
        );
        let doomed = BlockRunner::new(AlwaysFatal, ());
        let mut graph =
            FlowGraph::<CooperativeTaskPolicy>::new(vec![Box::new(healthy), Box::new(doomed)])
                .unwrap();
        graph.run().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let snapshots = graph.stats();
        assert!(!snapshots[0].failed);
        assert!(snapshots[1].failed);
        assert!(snapshots[0].successes > 0);
        let fatal = graph.stop();
        assert_eq!(fatal, Some(Error::TermProcedureError));
    }

    #[test]
    fn stop_restores_runners_for_a_second_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = BlockRunner::new(
            CountTo {
                remaining: usize::MAX,
                calls: calls.clone(),
            },
            (),
        );
        let mut graph = FlowGraph::<HostedPolicy>::new(vec![Box::new(runner)]).unwrap();
        graph.run().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(graph.stop().is_none());
        assert_eq!(graph.runner_names(), vec!["CountTo"]);

        graph.run().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(graph.stop().is_none());
        let snapshots = graph.stats();
        assert!(snapshots[0].successes > 0);
    }
}
