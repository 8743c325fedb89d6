//! A software reimplementation of the CASIO SW-10 General MIDI tone
//! generator: MIDI decoding, polyphonic voice allocation with envelope/LFO
//! modulation, wavetable sample generation against a ROM image, and a
//! feedback reverb, exposed behind a single [`synth::Synth`] facade.
//!
//! The render path (`Synth::render_block`) never blocks and never fails;
//! only construction and parameter changes are fallible, returned as
//! [`error::SynthError`] (or the `bool`-returning convenience wrappers
//! `Synth::set_*`).

pub mod channel;
pub mod config;
pub mod decoder;
pub mod envelope;
pub mod error;
pub mod generator;
pub mod midi_ring;
pub mod program;
pub mod reverb;
pub mod rom;
pub mod synth;
pub mod tables;
pub mod velocity;
pub mod voice;

pub use config::{ReverbMode, SampleRate, SynthConfig};
pub use error::{SynthError, SynthResult};
pub use rom::{Rom, RomError};
pub use synth::Synth;
