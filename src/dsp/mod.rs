//! DSP building blocks: pure Rust synthesis and effects.
//!
//! The same code runs in the realtime graph (pulled block by block from the
//! host's audio callback) and in offline renders.

pub mod delay;
pub mod envelope;
pub mod filter;
pub mod limiter;
pub mod note;
pub mod oscillator;
pub mod param;
pub mod reverb;
pub mod synth;
pub mod voice;
