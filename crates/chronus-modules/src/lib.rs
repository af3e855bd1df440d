//! Built-in DSP modules for the chronus runtime.
//!
//! Every type here implements [`chronus_core::Module`]: zero allocation
//! after `prepare`, exactly one block written per `process`, parameters
//! smoothed per the schema. Instantiation normally goes through
//! `chronus-registry` by type name:
//!
//! | type name        | role                               |
//! |------------------|------------------------------------|
//! | `sine`           | sine oscillator (freq, gain)       |
//! | `noise`          | white noise source (gain)          |
//! | `adsr`           | gated ADSR envelope, VCA style     |
//! | `biquad_lowpass` | RBJ lowpass (cutoff, q)            |
//! | `gain`           | smoothed gain stage                |
//! | `passthrough`    | identity patch point               |
//! | `mixer`          | explicit fan-in combiner (4 in)    |
//! | `limiter`        | hard sink limiter (threshold)      |

#![cfg_attr(not(feature = "std"), no_std)]

pub mod envelope;
pub mod filter;
pub mod mixer;
pub mod oscillator;
pub mod util;

pub use envelope::Adsr;
pub use filter::BiquadLowpass;
pub use mixer::Mixer;
pub use oscillator::{Noise, SineOsc};
pub use util::{Gain, Limiter, Passthrough};
