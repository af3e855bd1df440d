//! Per-parameter smoothing.
//!
//! Parameter writes land as *targets* at block boundaries; the [`Smoother`]
//! moves the audible value toward the target per sample, so live control
//! never produces zipper noise. Three shapes cover the module library:
//!
//! - `None`: the target is applied instantly (gates, discrete switches).
//! - `Linear(W ms)`: constant-rate ramp reaching the target in W ms; a
//!   retarget mid-ramp restarts the ramp from the current sample value.
//! - `OnePole(W ms)`: RC-style approach whose step response reaches
//!   1 − e⁻¹ of the step in W ms.

use libm::expf;

/// How a parameter moves from its current value to a new target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmoothingMode {
    /// No smoothing; targets apply instantly at the block boundary.
    None,
    /// Straight-line ramp over the window, in milliseconds.
    Linear {
        /// Ramp duration in milliseconds.
        window_ms: f32,
    },
    /// One-pole lowpass whose time constant is the window, in milliseconds.
    OnePole {
        /// Time constant in milliseconds.
        window_ms: f32,
    },
}

/// A smoothed parameter value.
///
/// `set_target` stages a destination; `advance` produces the next audible
/// sample value. Writing a target equal to the current target is idempotent
/// and restarts nothing.
#[derive(Debug, Clone)]
pub struct Smoother {
    mode: SmoothingMode,
    sample_rate: f32,
    current: f32,
    target: f32,
    /// One-pole coefficient, recomputed on rate/mode changes.
    coeff: f32,
    /// Linear increment per sample while a ramp is active.
    step: f32,
    /// Samples remaining in the active linear ramp.
    remaining: u32,
}

impl Smoother {
    /// Creates a smoother holding `initial` with the given mode.
    pub fn new(initial: f32, mode: SmoothingMode, sample_rate: f32) -> Self {
        let mut s = Self {
            mode,
            sample_rate,
            current: initial,
            target: initial,
            coeff: 1.0,
            step: 0.0,
            remaining: 0,
        };
        s.recalculate();
        s
    }

    /// Updates the sample rate and recomputes coefficients.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recalculate();
        if self.remaining > 0 {
            // Re-derive the active ramp at the new rate.
            let target = self.target;
            self.remaining = 0;
            self.start_ramp(target);
        }
    }

    /// Stages a new target for the smoothing path.
    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        match self.mode {
            SmoothingMode::None => {
                self.target = target;
                self.current = target;
            }
            SmoothingMode::Linear { .. } => self.start_ramp(target),
            SmoothingMode::OnePole { .. } => self.target = target,
        }
    }

    /// Applies `value` immediately, bypassing smoothing.
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Advances one sample and returns the audible value.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        match self.mode {
            SmoothingMode::None => {}
            SmoothingMode::Linear { .. } => {
                if self.remaining > 0 {
                    self.current += self.step;
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        self.current = self.target;
                    }
                }
            }
            SmoothingMode::OnePole { .. } => {
                self.current += self.coeff * (self.target - self.current);
            }
        }
        self.current
    }

    /// Advances `samples` steps at once and returns the audible value.
    ///
    /// For modules with low audio-rate sensitivity (filter coefficients)
    /// that consume the smoothed value once per block instead of per sample.
    pub fn advance_by(&mut self, samples: u32) -> f32 {
        match self.mode {
            SmoothingMode::None => {}
            SmoothingMode::Linear { .. } => {
                let n = samples.min(self.remaining);
                self.current += self.step * n as f32;
                self.remaining -= n;
                if self.remaining == 0 {
                    self.current = self.target;
                }
            }
            SmoothingMode::OnePole { .. } => {
                // n one-pole steps collapse to a single exponential step.
                let decay = libm::powf(1.0 - self.coeff, samples as f32);
                self.current = self.target - (self.target - self.current) * decay;
            }
        }
        self.current
    }

    /// Current audible value without advancing.
    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }

    /// Staged target value.
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Whether the value has effectively reached the target.
    #[inline]
    pub fn is_settled(&self) -> bool {
        match self.mode {
            SmoothingMode::Linear { .. } => self.remaining == 0,
            _ => (self.current - self.target).abs() < 1e-6,
        }
    }

    fn start_ramp(&mut self, target: f32) {
        self.target = target;
        let SmoothingMode::Linear { window_ms } = self.mode else {
            return;
        };
        let samples = (window_ms / 1000.0 * self.sample_rate) as u32;
        if samples == 0 {
            self.current = target;
            self.step = 0.0;
            self.remaining = 0;
        } else {
            self.step = (target - self.current) / samples as f32;
            self.remaining = samples;
        }
    }

    /// One-pole coefficient such that a step reaches 1 − e⁻¹ after the
    /// window: `coeff = 1 − exp(−1 / (window_samples))`.
    fn recalculate(&mut self) {
        self.coeff = match self.mode {
            SmoothingMode::OnePole { window_ms } if window_ms > 0.0 && self.sample_rate > 0.0 => {
                let samples = window_ms / 1000.0 * self.sample_rate;
                1.0 - expf(-1.0 / samples)
            }
            _ => 1.0,
        };
    }
}
