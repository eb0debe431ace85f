use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::backoff::{AdaptiveSleep, BackoffAction};
use super::BlockStats;
use crate::error::Error;
use crate::runner::RunnerHandle;

type Runners = Vec<Box<dyn RunnerHandle>>;
type LastFatal = Arc<Mutex<Option<(String, Error)>>>;

/// How a [`crate::flowgraph::FlowGraph`] maps its runners onto units of
/// concurrency.
///
/// Grounded on the original source's `cler_stdthread_policy.hpp`, which
/// exposes `create_thread`/`join_thread`/`yield`/`sleep_us` as the
/// primitives a `FlowGraph` is generic over; conduit folds those into a
/// single `run`/`join` pair operating over the whole runner set, since the
/// three implementations here differ not just in *how* they create a task
/// but in *how many* tasks they create (one per runner for
/// [`HostedPolicy`], one total for [`CooperativeTaskPolicy`], zero for
/// [`NonePolicy`]).
pub trait TaskPolicy {
    /// A joinable handle to whatever this policy launched.
    type Task: Send;

    /// Launches `runners` under this policy. `stop` is the shared flag that
    /// requests shutdown; `last_fatal` receives the first fatal error any
    /// runner observes. `max_iterations` bounds a policy that runs
    /// synchronously on the calling thread ([`NonePolicy`]); threaded
    /// policies ignore it, since their callers stop them explicitly.
    fn run(
        runners: Runners,
        stats: Vec<Arc<BlockStats>>,
        stop: Arc<AtomicBool>,
        last_fatal: LastFatal,
        max_iterations: Option<usize>,
    ) -> Result<Self::Task, Error>;

    /// Waits for a previously launched task to finish, handing back the
    /// runners it was driving so the caller can restore them for a later
    /// `run()` call.
    fn join(task: Self::Task) -> Runners;
}

fn record_fatal(last_fatal: &LastFatal, name: &str, err: Error) {
    let mut guard = last_fatal.lock();
    if guard.is_none() {
        *guard = Some((name.to_string(), err));
    }
}

/// Runs a single runner's loop until `stop` is observed or a fatal error
/// occurs, applying the adaptive backoff ladder on non-fatal misses.
/// `forced_yield` additionally yields the OS thread after every tight-spin
/// iteration, used by [`CooperativeTaskPolicy`] to model a scheduler that
/// never lets one task monopolize its thread.
///
/// A fatal error here ends only this runner's own loop; it does not touch
/// the shared `stop` flag, so sibling runners keep making progress until a
/// subsequent [`crate::flowgraph::FlowGraph::stop`] call. Hands the runner
/// back to the caller on every exit path, so a [`TaskPolicy::join`] can
/// return it to [`crate::flowgraph::FlowGraph::stop`] for a later `run()`.
fn drive(
    mut runner: Box<dyn RunnerHandle>,
    stats: Arc<BlockStats>,
    stop: Arc<AtomicBool>,
    last_fatal: LastFatal,
    forced_yield: bool,
) -> Box<dyn RunnerHandle> {
    let start = Instant::now();
    let mut backoff = AdaptiveSleep::new();
    while !stop.load(Ordering::Acquire) {
        match runner.poll_once() {
            Ok(()) => {
                stats.successes.fetch_add(1, Ordering::Relaxed);
                backoff.on_success();
                stats.backoff_level.store(0, Ordering::Relaxed);
                if forced_yield {
                    std::thread::yield_now();
                }
            }
            Err(e) => {
                stats.record_error(e);
                if e.is_fatal() {
                    log::error!("block '{}' failed fatally: {e}", runner.name());
                    stats.failed.store(true, Ordering::Relaxed);
                    stats.record_fullness(runner.fullness());
                    stats.add_run_time(start.elapsed());
                    record_fatal(&last_fatal, runner.name(), e);
                    return runner;
                }
                let action = backoff.on_miss();
                if !matches!(action, BackoffAction::SpinTight) {
                    stats.sleeps_applied.fetch_add(1, Ordering::Relaxed);
                }
                stats.backoff_level.store(backoff.level(), Ordering::Relaxed);
                match action {
                    BackoffAction::SpinTight => {
                        if forced_yield {
                            std::thread::yield_now();
                        }
                    }
                    BackoffAction::Yield => std::thread::yield_now(),
                    BackoffAction::Sleep(micros) => {
                        std::thread::sleep(Duration::from_micros(micros))
                    }
                }
            }
        }
        stats.record_fullness(runner.fullness());
    }
    stats.add_run_time(start.elapsed());
    runner
}

/// Runs every runner in round-robin order on the calling thread, for as
/// long as `max_iterations` allows (or forever if `None`).
///
/// A runner that fails fatally is marked `failed` and dropped from the
/// rotation; it does not touch the shared `stop` flag, so the remaining
/// runners keep rotating until they are all failed, `max_iterations` is
/// reached, or a subsequent [`crate::flowgraph::FlowGraph::stop`] call sets
/// `stop`. Returns the runners, in their original order, so a
/// [`TaskPolicy::join`] can hand them back for a later `run()`.
fn drive_round_robin(
    mut runners: Runners,
    stats: Vec<Arc<BlockStats>>,
    stop: Arc<AtomicBool>,
    last_fatal: LastFatal,
    max_iterations: Option<usize>,
) -> Runners {
    let start = Instant::now();
    let mut backoffs: Vec<AdaptiveSleep> = runners.iter().map(|_| AdaptiveSleep::new()).collect();
    let mut failed = vec![false; runners.len()];
    let mut round = 0usize;
    'outer: loop {
        if stop.load(Ordering::Acquire) {
            break 'outer;
        }
        if let Some(max) = max_iterations {
            if round >= max {
                break 'outer;
            }
        }
        for (i, runner) in runners.iter_mut().enumerate() {
            if failed[i] {
                continue;
            }
            match runner.poll_once() {
                Ok(()) => {
                    stats[i].successes.fetch_add(1, Ordering::Relaxed);
                    backoffs[i].on_success();
                    stats[i].backoff_level.store(0, Ordering::Relaxed);
                }
                Err(e) => {
                    stats[i].record_error(e);
                    if e.is_fatal() {
                        log::error!("block '{}' failed fatally: {e}", runner.name());
                        stats[i].failed.store(true, Ordering::Relaxed);
                        stats[i].record_fullness(runner.fullness());
                        stats[i].add_run_time(start.elapsed());
                        record_fatal(&last_fatal, runner.name(), e);
                        failed[i] = true;
                        continue;
                    }
                    let action = backoffs[i].on_miss();
                    if !matches!(action, BackoffAction::SpinTight) {
                        stats[i].sleeps_applied.fetch_add(1, Ordering::Relaxed);
                    }
                    stats[i]
                        .backoff_level
                        .store(backoffs[i].level(), Ordering::Relaxed);
                }
            }
            if !failed[i] {
                stats[i].record_fullness(runner.fullness());
            }
        }
        if failed.iter().all(|f| *f) {
            break 'outer;
        }
        round += 1;
    }
    for (i, done) in failed.iter().enumerate() {
        if !done {
            stats[i].add_run_time(start.elapsed());
        }
    }
    runners
}

/// One preemptible OS thread per runner, each spinning, yielding or
/// sleeping on its own adaptive ladder. Grounded directly on
/// `cler_stdthread_policy.hpp`'s `StdThreadPolicy`, the original source's
/// only task policy, and on the thread-spawn style of
/// `crates/raug/src/graph/runtime/mod.rs`'s `CpalOut::spawn`.
pub struct HostedPolicy;

impl TaskPolicy for HostedPolicy {
    type Task = Vec<std::thread::JoinHandle<Box<dyn RunnerHandle>>>;

    fn run(
        runners: Runners,
        stats: Vec<Arc<BlockStats>>,
        stop: Arc<AtomicBool>,
        last_fatal: LastFatal,
        _max_iterations: Option<usize>,
    ) -> Result<Self::Task, Error> {
        let mut handles = Vec::with_capacity(runners.len());
        for (runner, stats) in runners.into_iter().zip(stats.into_iter()) {
            let stop = stop.clone();
            let last_fatal = last_fatal.clone();
            let handle = std::thread::Builder::new()
                .name(runner.name().to_string())
                .spawn(move || drive(runner, stats, stop, last_fatal, false))
                .map_err(|_| Error::TaskCreationFailed)?;
            handles.push(handle);
        }
        Ok(handles)
    }

    fn join(task: Self::Task) -> Runners {
        task.into_iter().filter_map(|handle| handle.join().ok()).collect()
    }
}

/// A single OS thread round-robins every runner, yielding after each full
/// round. Stands in for an RTOS's single-task cooperative scheduler on a
/// desktop target, where no real non-preemptive task primitive exists; a
/// true embedded RTOS binding is out of scope here.
pub struct CooperativeTaskPolicy;

impl TaskPolicy for CooperativeTaskPolicy {
    type Task = std::thread::JoinHandle<Runners>;

    fn run(
        runners: Runners,
        stats: Vec<Arc<BlockStats>>,
        stop: Arc<AtomicBool>,
        last_fatal: LastFatal,
        _max_iterations: Option<usize>,
    ) -> Result<Self::Task, Error> {
        let handle = std::thread::Builder::new()
            .name("conduit-cooperative".to_string())
            .spawn(move || drive_round_robin(runners, stats, stop, last_fatal, None))
            .map_err(|_| Error::TaskCreationFailed)?;
        Ok(handle)
    }

    fn join(task: Self::Task) -> Runners {
        task.join().unwrap_or_default()
    }
}

/// No task is created: [`crate::flowgraph::FlowGraph::run`] drives every
/// runner in round-robin order on the calling thread and only returns once
/// every runner has stopped. Matches the original source's single-threaded
/// "streamlined" mode, with an explicit `max_iterations` bound (see
/// `DESIGN.md`) so a dead or cyclic block cannot spin the caller forever
/// unless the caller asks for that by leaving it unset.
pub struct NonePolicy;

impl TaskPolicy for NonePolicy {
    type Task = Runners;

    fn run(
        runners: Runners,
        stats: Vec<Arc<BlockStats>>,
        stop: Arc<AtomicBool>,
        last_fatal: LastFatal,
        max_iterations: Option<usize>,
    ) -> Result<Self::Task, Error> {
        Ok(drive_round_robin(runners, stats, stop, last_fatal, max_iterations))
    }

    fn join(task: Self::Task) -> Runners {
        task
    }
}
