//! Audio-rate sources: sine oscillator and white noise.

use core::f32::consts::TAU;

use chronus_core::{Module, ModuleSchema, ParamSpec, Smoother, SmoothingMode};
use libm::sinf;

const SINE_SCHEMA: ModuleSchema = ModuleSchema {
    type_name: "sine",
    max_inputs: 1,
    params: &[
        ParamSpec::frequency("freq", 0.0, 20000.0, 440.0),
        ParamSpec::amplitude("gain", 1.0, 0.5),
    ],
};

/// Phase-accumulator sine oscillator.
///
/// Ignores its input block — sources simply overwrite the output. Frequency
/// and gain are smoothed per sample, so sweeps are click-free.
pub struct SineOsc {
    phase: f32,
    sample_rate: f32,
    freq: Smoother,
    gain: Smoother,
}

impl SineOsc {
    /// Creates an oscillator; call `prepare` before processing.
    pub fn new() -> Self {
        Self {
            phase: 0.0,
            sample_rate: 48000.0,
            freq: Smoother::new(440.0, SmoothingMode::None, 48000.0),
            gain: Smoother::new(0.5, SmoothingMode::None, 48000.0),
        }
    }
}

impl Default for SineOsc {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for SineOsc {
    fn schema(&self) -> &'static ModuleSchema {
        &SINE_SCHEMA
    }

    fn prepare(&mut self, sample_rate: f32, _block_size: usize) {
        self.sample_rate = sample_rate;
        self.phase = 0.0;
        let freq_spec = &SINE_SCHEMA.params[0];
        let gain_spec = &SINE_SCHEMA.params[1];
        self.freq = Smoother::new(freq_spec.default, freq_spec.smoothing, sample_rate);
        self.gain = Smoother::new(gain_spec.default, gain_spec.smoothing, sample_rate);
    }

    fn set_param(&mut self, name: &str, value: f32, immediate: bool) -> bool {
        let (smoother, spec) = match name {
            "freq" => (&mut self.freq, &SINE_SCHEMA.params[0]),
            "gain" => (&mut self.gain, &SINE_SCHEMA.params[1]),
            _ => return false,
        };
        let v = spec.clamp(value);
        if immediate {
            smoother.set_immediate(v);
        } else {
            smoother.set_target(v);
        }
        true
    }

    fn process(&mut self, _input: &[f32], output: &mut [f32]) {
        for sample in output.iter_mut() {
            let freq = self.freq.advance();
            let gain = self.gain.advance();
            *sample = sinf(self.phase * TAU) * gain;
            self.phase += freq / self.sample_rate;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

const NOISE_SCHEMA: ModuleSchema = ModuleSchema {
    type_name: "noise",
    max_inputs: 1,
    params: &[ParamSpec::amplitude("gain", 1.0, 0.5)],
};

/// White noise source (xorshift32).
pub struct Noise {
    state: u32,
    gain: Smoother,
}

impl Noise {
    /// Creates a noise source; call `prepare` before processing.
    pub fn new() -> Self {
        Self {
            state: 0x12345678,
            gain: Smoother::new(0.5, SmoothingMode::None, 48000.0),
        }
    }

    #[inline]
    fn next_sample(&mut self) -> f32 {
        // xorshift32
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

impl Default for Noise {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Noise {
    fn schema(&self) -> &'static ModuleSchema {
        &NOISE_SCHEMA
    }

    fn prepare(&mut self, sample_rate: f32, _block_size: usize) {
        let spec = &NOISE_SCHEMA.params[0];
        self.gain = Smoother::new(spec.default, spec.smoothing, sample_rate);
        self.state = 0x12345678;
    }

    fn set_param(&mut self, name: &str, value: f32, immediate: bool) -> bool {
        if name != "gain" {
            return false;
        }
        let v = NOISE_SCHEMA.params[0].clamp(value);
        if immediate {
            self.gain.set_immediate(v);
        } else {
            self.gain.set_target(v);
        }
        true
    }

    fn process(&mut self, _input: &[f32], output: &mut [f32]) {
        for sample in output.iter_mut() {
            *sample = self.next_sample() * self.gain.advance();
        }
    }

    fn reset(&mut self) {
        self.state = 0x12345678;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronus_core::rms;

    #[test]
    fn sine_produces_expected_frequency() {
        let mut osc = SineOsc::new();
        osc.prepare(48000.0, 512);
        osc.set_param("freq", 1000.0, true);
        osc.set_param("gain", 1.0, true);

        // Count zero crossings over one second of audio.
        let mut crossings = 0u32;
        let mut prev = 0.0f32;
        let mut block = [0.0f32; 512];
        let input = [0.0f32; 512];
        for _ in 0..(48000 / 512) {
            osc.process(&input, &mut block);
            for &s in &block {
                if prev < 0.0 && s >= 0.0 {
                    crossings += 1;
                }
                prev = s;
            }
        }
        // 93 full blocks = 0.992 s -> ~992 positive-going crossings.
        assert!(
            (crossings as i32 - 992).abs() <= 3,
            "got {crossings} crossings"
        );
    }

    #[test]
    fn sine_amplitude_tracks_gain() {
        let mut osc = SineOsc::new();
        osc.prepare(48000.0, 256);
        osc.set_param("freq", 440.0, true);
        osc.set_param("gain", 0.5, true);

        let input = [0.0f32; 256];
        let mut block = [0.0f32; 256];
        // Let any smoothing settle, then measure.
        for _ in 0..20 {
            osc.process(&input, &mut block);
        }
        let level = rms(&block);
        let expected = 0.5 / core::f32::consts::SQRT_2;
        assert!(
            (level - expected).abs() < 0.02,
            "rms {level}, expected ~{expected}"
        );
    }

    #[test]
    fn sine_gain_clamped_to_schema() {
        let mut osc = SineOsc::new();
        osc.prepare(48000.0, 64);
        osc.set_param("gain", 9.0, true);
        let input = [0.0f32; 64];
        let mut block = [0.0f32; 64];
        for _ in 0..10 {
            osc.process(&input, &mut block);
        }
        assert!(chronus_core::peak(&block) <= 1.0 + 1e-6);
    }

    #[test]
    fn noise_is_nonsilent_and_bounded() {
        let mut noise = Noise::new();
        noise.prepare(48000.0, 512);
        noise.set_param("gain", 1.0, true);
        let input = [0.0f32; 512];
        let mut block = [0.0f32; 512];
        noise.process(&input, &mut block);
        assert!(rms(&block) > 0.1);
        assert!(chronus_core::peak(&block) <= 1.0);
    }

    #[test]
    fn unknown_param_rejected() {
        let mut osc = SineOsc::new();
        assert!(!osc.set_param("detune", 1.0, true));
    }
}
