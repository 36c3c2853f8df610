//! Consumer-side progress: monotone display and the synthetic animator
//!
//! Inference reports no progress of its own, so while it runs the consumer
//! animates the bar from 15 towards 80 with small random steps. The constants
//! are cosmetic. Once real progress reaches 80 the animator closes any
//! remaining gap with a short linear ramp and hands over.

use std::time::Duration;

use rand::Rng;

/// Progress value shown to the user; never moves backwards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressDisplay {
    value: u8,
}

impl ProgressDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Offer a new value; returns whether the shown value changed
    ///
    /// Values lower than (or equal to) the current one are ignored.
    pub fn apply(&mut self, value: u8) -> bool {
        let value = value.min(100);
        if value > self.value {
            self.value = value;
            true
        } else {
            false
        }
    }

    /// Back to 0 for a new job
    pub fn reset(&mut self) {
        self.value = 0;
    }
}

/// Lifecycle of the animator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimatorPhase {
    Idle,
    Running,
    Ramping,
    Finished,
}

/// Randomized filler progress for the inference stage
#[derive(Debug, Clone)]
pub struct SyntheticProgress {
    phase: AnimatorPhase,
    value: f32,
    duration_secs: f64,
    accelerated: bool,
    interval: Duration,
}

impl SyntheticProgress {
    /// First value shown once the animator starts
    pub const START: f32 = 15.0;
    /// Highest value random steps may reach
    pub const CEILING: f32 = 79.0;
    /// Where the ramp hands over to real progress
    pub const HANDOVER: f32 = 80.0;
    pub const RAMP_STEP: f32 = 0.5;
    pub const RAMP_INTERVAL: Duration = Duration::from_millis(50);
    /// Pause between entering Processing and the first animated step
    pub const START_DELAY: Duration = Duration::from_millis(1500);

    /// `duration_secs` is the probed audio length (0 when unknown)
    pub fn new(duration_secs: f64, accelerated: bool) -> Self {
        Self {
            phase: AnimatorPhase::Idle,
            value: Self::START,
            duration_secs: duration_secs.max(0.0),
            accelerated,
            interval: Duration::ZERO,
        }
    }

    pub fn phase(&self) -> AnimatorPhase {
        self.phase
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Value as shown on an integer progress bar
    pub fn displayed(&self) -> u8 {
        self.value as u8
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, AnimatorPhase::Running | AnimatorPhase::Ramping)
    }

    /// Tick interval before jitter, in milliseconds, clamped to 30..=300
    pub fn base_interval_ms(&self) -> f64 {
        let base = if self.accelerated { 100.0 } else { 200.0 };
        let scale = (self.duration_secs / 60.0).min(3.0).powf(0.4);
        (base * scale).clamp(30.0, 300.0)
    }

    /// Per-tick increment bounds; longer audio moves slower
    pub fn increment_range(&self) -> (f32, f32) {
        if self.duration_secs == 0.0 {
            return if self.accelerated { (0.05, 0.4) } else { (0.02, 0.2) };
        }

        let factor = (120.0 / self.duration_secs.max(1.0)).powf(1.2) as f32;
        if self.accelerated {
            (
                (0.05 * factor).clamp(0.02, 0.15),
                (0.4 * factor).clamp(0.2, 0.8),
            )
        } else {
            (
                (0.02 * factor).clamp(0.01, 0.08),
                (0.2 * factor).clamp(0.1, 0.4),
            )
        }
    }

    /// Enter `Running` at [`Self::START`] with a jittered (±30%) interval
    pub fn start<R: Rng>(&mut self, rng: &mut R) {
        if self.phase != AnimatorPhase::Idle {
            return;
        }
        let base = self.base_interval_ms();
        let jittered = rng.gen_range(base * 0.7..=base * 1.3);
        self.interval = Duration::from_millis(jittered as u64);
        self.value = Self::START;
        self.phase = AnimatorPhase::Running;
    }

    /// Time until the next [`tick`](Self::tick), `None` when inactive
    pub fn interval(&self) -> Option<Duration> {
        match self.phase {
            AnimatorPhase::Running => Some(self.interval),
            AnimatorPhase::Ramping => Some(Self::RAMP_INTERVAL),
            AnimatorPhase::Idle | AnimatorPhase::Finished => None,
        }
    }

    /// Advance one step and return the value to display
    pub fn tick<R: Rng>(&mut self, rng: &mut R) -> Option<u8> {
        match self.phase {
            AnimatorPhase::Running => {
                let (min_inc, max_inc) = self.increment_range();
                let increment = rng.gen_range(min_inc..=max_inc);
                self.value = (self.value + increment).min(Self::CEILING);
                Some(self.displayed())
            }
            AnimatorPhase::Ramping => {
                self.value = (self.value + Self::RAMP_STEP).min(Self::HANDOVER);
                if self.value >= Self::HANDOVER {
                    self.phase = AnimatorPhase::Finished;
                }
                Some(self.displayed())
            }
            AnimatorPhase::Idle | AnimatorPhase::Finished => None,
        }
    }

    /// Stop random steps and close the gap to 80 with the ramp
    ///
    /// An animator that never started just finishes.
    pub fn begin_ramp(&mut self) {
        self.phase = match self.phase {
            AnimatorPhase::Running if self.value < Self::HANDOVER => AnimatorPhase::Ramping,
            AnimatorPhase::Ramping => AnimatorPhase::Ramping,
            _ => AnimatorPhase::Finished,
        };
    }

    /// Stop immediately (job ended)
    pub fn stop(&mut self) {
        self.phase = AnimatorPhase::Finished;
    }
}
