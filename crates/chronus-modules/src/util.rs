//! Utility modules: passthrough, gain stage, and the sink limiter.

use chronus_core::{Module, ModuleSchema, ParamSpec, Smoother, SmoothingMode};

const PASSTHROUGH_SCHEMA: ModuleSchema = ModuleSchema {
    type_name: "passthrough",
    max_inputs: 1,
    params: &[],
};

/// Copies input to output unchanged. Useful as a patch point.
pub struct Passthrough;

impl Module for Passthrough {
    fn schema(&self) -> &'static ModuleSchema {
        &PASSTHROUGH_SCHEMA
    }
    fn prepare(&mut self, _sample_rate: f32, _block_size: usize) {}
    fn set_param(&mut self, _name: &str, _value: f32, _immediate: bool) -> bool {
        false
    }
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        output.copy_from_slice(input);
    }
    fn reset(&mut self) {}
}

const GAIN_SCHEMA: ModuleSchema = ModuleSchema {
    type_name: "gain",
    max_inputs: 1,
    params: &[ParamSpec::amplitude("gain", 4.0, 1.0)],
};

/// Smoothed linear gain stage.
pub struct Gain {
    gain: Smoother,
}

impl Gain {
    /// Creates a gain stage; call `prepare` before processing.
    pub fn new() -> Self {
        Self {
            gain: Smoother::new(1.0, SmoothingMode::None, 48000.0),
        }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Gain {
    fn schema(&self) -> &'static ModuleSchema {
        &GAIN_SCHEMA
    }

    fn prepare(&mut self, sample_rate: f32, _block_size: usize) {
        let spec = &GAIN_SCHEMA.params[0];
        self.gain = Smoother::new(spec.default, spec.smoothing, sample_rate);
    }

    fn set_param(&mut self, name: &str, value: f32, immediate: bool) -> bool {
        if name != "gain" {
            return false;
        }
        let v = GAIN_SCHEMA.params[0].clamp(value);
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

const LIMITER_SCHEMA: ModuleSchema = ModuleSchema {
    type_name: "limiter",
    max_inputs: 1,
    params: &[ParamSpec::amplitude("threshold", 1.0, 0.95)],
};

/// Hard limiter for the patch sink.
///
/// The runtime never clips on its own; putting a limiter at the end of the
/// chain keeps a misbehaving patch inside [-threshold, threshold].
pub struct Limiter {
    threshold: f32,
}

impl Limiter {
    /// Creates a limiter; call `prepare` before processing.
    pub fn new() -> Self {
        Self { threshold: 0.95 }
    }
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Limiter {
    fn schema(&self) -> &'static ModuleSchema {
        &LIMITER_SCHEMA
    }

    fn prepare(&mut self, _sample_rate: f32, _block_size: usize) {
        self.threshold = LIMITER_SCHEMA.params[0].default;
    }

    fn set_param(&mut self, name: &str, value: f32, _immediate: bool) -> bool {
        if name != "threshold" {
            return false;
        }
        self.threshold = LIMITER_SCHEMA.params[0].clamp(value).max(0.01);
        true
    }

    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let t = self.threshold;
        for (out, inp) in output.iter_mut().zip(input) {
            *out = inp.clamp(-t, t);
        }
    }

    fn reset(&mut self) {}
}
