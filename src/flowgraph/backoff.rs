/// Per-runner adaptive backoff: tight spin while misses are rare, then
/// cooperative yields, then a geometrically growing sleep, resetting to a
/// tight spin as soon as a call makes progress again.
///
/// This enriches the original source, whose `FlowGraph::run` only calls
/// `std::this_thread::yield()` on any non-fatal miss; conduit's runners sit
/// for long stretches waiting on upstream/downstream channels, so a richer
/// ladder avoids burning a full core per idle block while still reacting
/// within a few microseconds once work is available.
pub(crate) struct AdaptiveSleep {
    backoff_level: u8,
    consecutive_misses: u32,
}

/// Consecutive-miss counts at which the backoff ladder advances a level.
const THRESHOLDS: [u32; 3] = [4, 16, 64];
/// Highest backoff level reachable.
const MAX_LEVEL: u8 = 3;
/// Base sleep duration at the first sleeping level.
const BASE_MICROS: u64 = 1;
/// Ceiling applied to the geometric sleep ladder.
const CAP_MICROS: u64 = 4_000;

pub(crate) enum BackoffAction {
    /// Retry immediately with no yield or sleep.
    SpinTight,
    /// Yield the current OS thread's timeslice.
    Yield,
    /// Sleep for the given number of microseconds.
    Sleep(u64),
}

impl AdaptiveSleep {
    pub(crate) fn new() -> Self {
        AdaptiveSleep {
            backoff_level: 0,
            consecutive_misses: 0,
        }
    }

    pub(crate) fn level(&self) -> u8 {
        self.backoff_level
    }

    /// Records a non-fatal miss and returns the action the caller should
    /// take before retrying.
    pub(crate) fn on_miss(&mut self) -> BackoffAction {
        self.consecutive_misses = self.consecutive_misses.saturating_add(1);
        let mut level = 0u8;
        for (i, threshold) in THRESHOLDS.iter().enumerate() {
            if self.consecutive_misses >= *threshold {
                level = (i + 1) as u8;
            }
        }
        level = level.min(MAX_LEVEL);
        if level != self.backoff_level {
            log::debug!(
                "backoff level {} -> {} after {} consecutive misses",
                self.backoff_level,
                level,
                self.consecutive_misses
            );
            self.backoff_level = level;
        }
        match self.backoff_level {
            0 => BackoffAction::SpinTight,
            1 => BackoffAction::Yield,
            level => {
                // sleep_micros(base * 4^(level - 1))
                let shift = (level - 1) as u32 * 2;
                let micros = BASE_MICROS.saturating_mul(1u64 << shift).min(CAP_MICROS);
                BackoffAction::Sleep(micros)
            }
        }
    }

    /// Records a successful call, resetting the ladder to a tight spin.
    pub(crate) fn on_success(&mut self) {
        if self.backoff_level != 0 {
            log::debug!("backoff level {} -> 0 after progress", self.backoff_level);
        }
        self.backoff_level = 0;
        self.consecutive_misses = 0;
    }
}
