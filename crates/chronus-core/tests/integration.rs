//! Cross-module tests: command records through a host, and the packed-form
//! round-trip laws under proptest.

use chronus_core::{
    CommandRecord, CommandValue, Ident, Module, ModuleHost, ModuleSchema, ParamSpec, Smoother,
    SmoothingMode,
};

fn id(s: &str) -> Ident {
    Ident::new(s).unwrap()
}

/// Constant-level source with smoothed gain, enough to observe boundary
/// semantics end to end.
struct Osc {
    gain: Smoother,
}

const OSC_SCHEMA: ModuleSchema = ModuleSchema {
    type_name: "osc",
    max_inputs: 1,
    params: &[ParamSpec::amplitude("gain", 1.0, 0.0)],
};

impl Module for Osc {
    fn schema(&self) -> &'static ModuleSchema {
        &OSC_SCHEMA
    }
    fn prepare(&mut self, sample_rate: f32, _block_size: usize) {
        self.gain = Smoother::new(0.0, SmoothingMode::OnePole { window_ms: 8.0 }, sample_rate);
    }
    fn set_param(&mut self, name: &str, value: f32, immediate: bool) -> bool {
        if name != "gain" {
            return false;
        }
        let v = OSC_SCHEMA.params[0].clamp(value);
        if immediate {
            self.gain.set_immediate(v);
        } else {
            self.gain.set_target(v);
        }
        true
    }
    fn process(&mut self, _input: &[f32], output: &mut [f32]) {
        for sample in output.iter_mut() {
            *sample = self.gain.advance();
        }
    }
    fn reset(&mut self) {}
}

#[test]
fn staged_set_takes_effect_next_block_not_mid_block() {
    let mut host = ModuleHost::new(48000.0, 64);
    host.add_module(id("osc1"), Box::new(Osc { gain: Smoother::new(0.0, SmoothingMode::None, 1.0) }))
        .unwrap();

    // First block: default gain, all zero.
    let first: Vec<f32> = host.process_chain().to_vec();
    assert!(first.iter().all(|&s| s == 0.0));

    // A command enqueued now is invisible until the next boundary.
    host.enqueue(CommandRecord::set(
        id("osc1"),
        id("gain"),
        CommandValue::Float(1.0),
    ));
    let second: Vec<f32> = host.process_chain().to_vec();
    // Smoothing starts at the boundary: strictly rising within the block.
    assert!(second[0] > 0.0);
    assert!(second[63] > second[0]);
}

#[test]
fn smoothing_converges_within_window_tolerance() {
    let mut host = ModuleHost::new(48000.0, 64);
    host.add_module(id("osc1"), Box::new(Osc { gain: Smoother::new(0.0, SmoothingMode::None, 1.0) }))
        .unwrap();
    host.enqueue(CommandRecord::set(
        id("osc1"),
        id("gain"),
        CommandValue::Float(0.5),
    ));

    // 8 ms window; run 5 windows worth of blocks.
    let blocks = (48000.0_f32 * 0.040 / 64.0).ceil() as usize;
    let mut last = 0.0;
    for _ in 0..blocks {
        let out = host.process_chain();
        last = out[out.len() - 1];
    }
    assert!((last - 0.5).abs() < 0.01, "expected ~0.5, got {last}");
}

mod record_laws {
    use super::*;
    use chronus_core::{COMMAND_RECORD_LEN, Opcode};
    use proptest::prelude::*;

    fn ident_strategy() -> impl Strategy<Value = Ident> {
        "[a-z0-9_]{1,16}".prop_map(|s| Ident::new(&s).unwrap())
    }

    fn value_strategy() -> impl Strategy<Value = CommandValue> {
        prop_oneof![
            any::<f64>().prop_map(CommandValue::Float),
            any::<i64>().prop_map(CommandValue::Int),
            any::<bool>().prop_map(CommandValue::Bool),
        ]
    }

    proptest! {
        #[test]
        fn unpack_pack_is_identity(module in ident_strategy(),
                                   param in ident_strategy(),
                                   value in value_strategy()) {
            let rec = CommandRecord::set(module, param, value);
            let bytes = rec.pack();
            let back = CommandRecord::unpack(&bytes).unwrap();
            // NaN payloads compare by bits, not by value.
            prop_assert_eq!(back.pack(), bytes);
            prop_assert_eq!(back.op, Opcode::Set);
            prop_assert_eq!(back.module, module);
            prop_assert_eq!(back.param, param);
        }

        #[test]
        fn random_bytes_never_panic(bytes in prop::array::uniform32(any::<u8>())) {
            // Widen to a full record with zero tail; unpack must either
            // succeed or return an error, never panic.
            let mut full = [0u8; COMMAND_RECORD_LEN];
            full[..32].copy_from_slice(&bytes);
            let _ = CommandRecord::unpack(&full);
        }
    }
}
