//! Gated ADSR envelope, applied as a VCA.

use chronus_core::{Module, ModuleSchema, ParamSpec};
use libm::expf;

const ADSR_SCHEMA: ModuleSchema = ModuleSchema {
    type_name: "adsr",
    max_inputs: 1,
    params: &[
        ParamSpec::time_ms("attack", 0.1, 5000.0, 10.0),
        ParamSpec::time_ms("decay", 0.1, 5000.0, 100.0),
        ParamSpec::raw("sustain", 0.0, 1.0, 0.7),
        ParamSpec::time_ms("release", 0.1, 10000.0, 200.0),
    ],
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Stage {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR envelope gating its input signal.
///
/// `output = input × envelope`. The gate drives the state machine; segment
/// times are unsmoothed (consumed when the segment starts) so they behave
/// like the front-panel knobs of a hardware envelope.
///
/// Segments are exponential. Attack aims above unity (overshoot target) and
/// clips at 1.0 for a snappy onset; decay and release aim at their
/// destination with a time constant chosen so the segment is audibly
/// complete within the named time.
pub struct Adsr {
    stage: Stage,
    level: f32,
    sample_rate: f32,
    attack_ms: f32,
    decay_ms: f32,
    sustain: f32,
    release_ms: f32,
    attack_coeff: f32,
    decay_coeff: f32,
    release_coeff: f32,
}

/// Attack overshoot target; clipping at 1.0 keeps the knee sharp.
const ATTACK_TARGET: f32 = 1.2;
/// Attack/decay time constants fit 3 tau inside the named time.
const SEGMENT_TAU_DIV: f32 = 3.0;
/// Release fits 5 tau inside the named time (< 1% residue at the end).
const RELEASE_TAU_DIV: f32 = 5.0;
/// Below this the envelope is considered closed.
const IDLE_THRESHOLD: f32 = 1e-4;

impl Adsr {
    /// Creates an envelope; call `prepare` before processing.
    pub fn new() -> Self {
        let mut env = Self {
            stage: Stage::Idle,
            level: 0.0,
            sample_rate: 48000.0,
            attack_ms: 10.0,
            decay_ms: 100.0,
            sustain: 0.7,
            release_ms: 200.0,
            attack_coeff: 0.0,
            decay_coeff: 0.0,
            release_coeff: 0.0,
        };
        env.recalculate();
        env
    }

    /// Current envelope level.
    pub fn level(&self) -> f32 {
        self.level
    }

    fn recalculate(&mut self) {
        self.attack_coeff = coeff(self.attack_ms / SEGMENT_TAU_DIV, self.sample_rate);
        self.decay_coeff = coeff(self.decay_ms / SEGMENT_TAU_DIV, self.sample_rate);
        self.release_coeff = coeff(self.release_ms / RELEASE_TAU_DIV, self.sample_rate);
    }

    #[inline]
    fn advance(&mut self) -> f32 {
        match self.stage {
            Stage::Idle => {}
            Stage::Attack => {
                self.level += self.attack_coeff * (ATTACK_TARGET - self.level);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level += self.decay_coeff * (self.sustain - self.level);
                if (self.level - self.sustain).abs() < 1e-3 {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => self.level = self.sustain,
            Stage::Release => {
                self.level += self.release_coeff * (0.0 - self.level);
                if self.level < IDLE_THRESHOLD {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }
}

/// One-pole coefficient for a time constant in milliseconds.
fn coeff(tau_ms: f32, sample_rate: f32) -> f32 {
    let samples = (tau_ms / 1000.0 * sample_rate).max(1.0);
    1.0 - expf(-1.0 / samples)
}

impl Default for Adsr {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Adsr {
    fn schema(&self) -> &'static ModuleSchema {
        &ADSR_SCHEMA
    }

    fn prepare(&mut self, sample_rate: f32, _block_size: usize) {
        self.sample_rate = sample_rate;
        self.stage = Stage::Idle;
        self.level = 0.0;
        self.attack_ms = ADSR_SCHEMA.params[0].default;
        self.decay_ms = ADSR_SCHEMA.params[1].default;
        self.sustain = ADSR_SCHEMA.params[2].default;
        self.release_ms = ADSR_SCHEMA.params[3].default;
        self.recalculate();
    }

    fn set_param(&mut self, name: &str, value: f32, _immediate: bool) -> bool {
        match name {
            "attack" => self.attack_ms = ADSR_SCHEMA.params[0].clamp(value),
            "decay" => self.decay_ms = ADSR_SCHEMA.params[1].clamp(value),
            "sustain" => self.sustain = ADSR_SCHEMA.params[2].clamp(value),
            "release" => self.release_ms = ADSR_SCHEMA.params[3].clamp(value),
            _ => return false,
        }
        self.recalculate();
        true
    }

    fn set_gate(&mut self, on: bool) {
        if on {
            // Keep the current level for smooth retriggering.
            self.stage = Stage::Attack;
        } else if self.stage != Stage::Idle {
            self.stage = Stage::Release;
        }
    }

    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        for (out, inp) in output.iter_mut().zip(input) {
            *out = inp * self.advance();
        }
    }

    fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.level = 0.0;
    }
}
