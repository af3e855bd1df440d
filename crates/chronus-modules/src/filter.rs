//! Biquad lowpass filter (RBJ cookbook coefficients).

use core::f32::consts::TAU;

use chronus_core::{Module, ModuleSchema, ParamSpec, Smoother, SmoothingMode};
use libm::{cosf, sinf};

const LOWPASS_SCHEMA: ModuleSchema = ModuleSchema {
    type_name: "biquad_lowpass",
    max_inputs: 1,
    params: &[
        ParamSpec::cutoff("cutoff", 20.0, 20000.0, 1000.0),
        ParamSpec::q("q", 0.1, 10.0, 0.707),
    ],
};

/// Second-order lowpass, transposed direct form II.
///
/// Cutoff and Q are smoothed at block rate: coefficient recomputation is
/// cheap but not free, and a lowpass's audio-rate sensitivity to control
/// changes is low, so the smoothers step once per block.
pub struct BiquadLowpass {
    sample_rate: f32,
    cutoff: Smoother,
    q: Smoother,
    // Normalized coefficients.
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    // DF2T state.
    s1: f32,
    s2: f32,
    // Values the current coefficients were computed for.
    active_cutoff: f32,
    active_q: f32,
}

impl BiquadLowpass {
    /// Creates a filter; call `prepare` before processing.
    pub fn new() -> Self {
        let mut f = Self {
            sample_rate: 48000.0,
            cutoff: Smoother::new(1000.0, SmoothingMode::None, 48000.0),
            q: Smoother::new(0.707, SmoothingMode::None, 48000.0),
            b0: 0.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            s1: 0.0,
            s2: 0.0,
            active_cutoff: 0.0,
            active_q: 0.0,
        };
        f.recalculate(1000.0, 0.707);
        f
    }

    fn recalculate(&mut self, cutoff: f32, q: f32) {
        // Keep the pole inside Nyquist regardless of schema range vs rate.
        let cutoff = cutoff.clamp(1.0, self.sample_rate * 0.49);
        let q = q.max(0.01);
        let omega = TAU * cutoff / self.sample_rate;
        let (sin_w, cos_w) = (sinf(omega), cosf(omega));
        let alpha = sin_w / (2.0 * q);

        let a0 = 1.0 + alpha;
        self.b1 = (1.0 - cos_w) / a0;
        self.b0 = self.b1 * 0.5;
        self.b2 = self.b0;
        self.a1 = (-2.0 * cos_w) / a0;
        self.a2 = (1.0 - alpha) / a0;

        self.active_cutoff = cutoff;
        self.active_q = q;
    }
}

impl Default for BiquadLowpass {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for BiquadLowpass {
    fn schema(&self) -> &'static ModuleSchema {
        &LOWPASS_SCHEMA
    }

    fn prepare(&mut self, sample_rate: f32, _block_size: usize) {
        self.sample_rate = sample_rate;
        let cut = &LOWPASS_SCHEMA.params[0];
        let q = &LOWPASS_SCHEMA.params[1];
        self.cutoff = Smoother::new(cut.default, cut.smoothing, sample_rate);
        self.q = Smoother::new(q.default, q.smoothing, sample_rate);
        self.s1 = 0.0;
        self.s2 = 0.0;
        self.recalculate(cut.default, q.default);
    }

    fn set_param(&mut self, name: &str, value: f32, immediate: bool) -> bool {
        let (smoother, spec) = match name {
            "cutoff" => (&mut self.cutoff, &LOWPASS_SCHEMA.params[0]),
            "q" => (&mut self.q, &LOWPASS_SCHEMA.params[1]),
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

    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let n = output.len() as u32;
        let cutoff = self.cutoff.advance_by(n);
        let q = self.q.advance_by(n);
        if cutoff != self.active_cutoff || q != self.active_q {
            self.recalculate(cutoff, q);
        }

        for (out, inp) in output.iter_mut().zip(input) {
            let x = *inp;
            let y = self.b0 * x + self.s1;
            self.s1 = self.b1 * x - self.a1 * y + self.s2;
            self.s2 = self.b2 * x - self.a2 * y;
            *out = y;
        }
    }

    fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronus_core::rms;
    use libm::sinf;

    fn tone(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| sinf(TAU * freq * i as f32 / sample_rate))
            .collect()
    }

    fn filtered_rms(filter: &mut BiquadLowpass, freq: f32) -> f32 {
        let input = tone(freq, 48000.0, 48000);
        let mut output = vec![0.0f32; 48000];
        for (i_chunk, o_chunk) in input.chunks(512).zip(output.chunks_mut(512)) {
            filter.process(i_chunk, o_chunk);
        }
        // Skip the transient at the head.
        rms(&output[4800..])
    }

    #[test]
    fn passes_band_below_cutoff() {
        let mut f = BiquadLowpass::new();
        f.prepare(48000.0, 512);
        f.set_param("cutoff", 1000.0, true);
        let level = filtered_rms(&mut f, 100.0);
        let unity = 1.0 / core::f32::consts::SQRT_2;
        assert!((level - unity).abs() < 0.05, "passband rms {level}");
    }

    #[test]
    fn attenuates_above_cutoff() {
        let mut f = BiquadLowpass::new();
        f.prepare(48000.0, 512);
        f.set_param("cutoff", 1000.0, true);
        // Two octaves up: a 2nd-order lowpass gives ~ -24 dB.
        let level = filtered_rms(&mut f, 4000.0);
        assert!(level < 0.1, "stopband rms {level}");
    }

    #[test]
    fn stays_bounded_at_extreme_settings() {
        let mut f = BiquadLowpass::new();
        f.prepare(48000.0, 512);
        f.set_param("cutoff", 20000.0, true);
        f.set_param("q", 10.0, true);
        let input = tone(440.0, 48000.0, 4096);
        let mut output = vec![0.0f32; 4096];
        for (i_chunk, o_chunk) in input.chunks(512).zip(output.chunks_mut(512)) {
            f.process(i_chunk, o_chunk);
        }
        assert!(output.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn smoothed_cutoff_moves_between_blocks() {
        let mut f = BiquadLowpass::new();
        f.prepare(48000.0, 512);
        f.set_param("cutoff", 200.0, true);
        let before = f.active_cutoff;
        f.set_param("cutoff", 5000.0, false);

        let input = [0.0f32; 512];
        let mut output = [0.0f32; 512];
        f.process(&input, &mut output);
        assert!(f.active_cutoff > before);
        assert!(f.active_cutoff < 5000.0, "cutoff must glide, not jump");
    }
}
