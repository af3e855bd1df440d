//! Explicit fan-in combiner.
//!
//! The router refuses multiple inputs to ordinary modules; routing several
//! sources into one place goes through a `mixer`, whose schema declares
//! `max_inputs: 4`. The host sums the upstream blocks before calling
//! `process`, so the mixer itself only applies the master gain.

use chronus_core::{Module, ModuleSchema, ParamSpec, Smoother, SmoothingMode};

const MIXER_SCHEMA: ModuleSchema = ModuleSchema {
    type_name: "mixer",
    max_inputs: 4,
    params: &[ParamSpec::amplitude("gain", 2.0, 1.0)],
};

/// Sums up to four inputs through a smoothed master gain.
pub struct Mixer {
    gain: Smoother,
}

impl Mixer {
    /// Creates a mixer; call `prepare` before processing.
    pub fn new() -> Self {
        Self {
            gain: Smoother::new(1.0, SmoothingMode::None, 48000.0),
        }
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Mixer {
    fn schema(&self) -> &'static ModuleSchema {
        &MIXER_SCHEMA
    }

    fn prepare(&mut self, sample_rate: f32, _block_size: usize) {
        let spec = &MIXER_SCHEMA.params[0];
        self.gain = Smoother::new(spec.default, spec.smoothing, sample_rate);
    }

    fn set_param(&mut self, name: &str, value: f32, immediate: bool) -> bool {
        if name != "gain" {
            return false;
        }
        let v = MIXER_SCHEMA.params[0].clamp(value);
        if immediate {
            self.gain.set_immediate(v);
        } else {
            self.gain.set_target(v);
        }
        true
    }

    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        for (out, inp) in output.iter_mut().zip(input) {
            *out = inp * self.gain.advance();
        }
    }

    fn reset(&mut self) {}
}
