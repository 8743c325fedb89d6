//! The 8-phase-per-quantum envelope and LFO integrator.
//!
//! Every `output_size_para` frames the synth advances each active voice's
//! envelope phase counter through 8 sub-phases (0..8). Within those 8
//! sub-phases:
//! - every phase: a fast envelope step interpolates through
//!   [`crate::tables::ENVELOPE_SHAPE`] toward the current segment target.
//! - phases 1 and 5: the slow envelope segment steps once (attack/decay/
//!   release rate application), possibly advancing to the next segment.
//! - phase 0: the LFO integrator advances by the program's LFO rate.
//! - phases 3 and 7: the voice's playback pitch is recomputed from the
//!   current envelope + LFO state.
//! - phase 4: the voice's output amplitude is recomputed.
//!
//! Grounded in `ProcessPhase`, `sub_C0036FE0`, `sub_C0037140`, `voice_set_freq`,
//! `voice_set_flags`, and `voice_set_flags2` in the original firmware.

use crate::program::ProgramData;
use crate::tables::{ENVELOPE_SHAPE, FINE_TABLE, PITCH_TABLE};
use crate::voice::{Voice, VoicePhase};

/// One full pass of the 8 envelope sub-phases for a single voice, called
/// once per `output_size_para` frames by [`crate::synth::Synth::render_block`].
///
/// `output_frequency` is the synth's current sample rate in Hz; it scales the
/// resulting phase increment so a given pitch advances the wavetable at the
/// correct per-sample rate regardless of output rate (see [`update_pitch`]).
pub fn advance_voice(
    voice: &mut Voice,
    program: &ProgramData,
    pitch_bend: i32,
    fine_tune: i32,
    output_frequency: u32,
) {
    for sub_phase in 0..8u32 {
        fast_envelope_step(voice);

        if sub_phase == 1 || sub_phase == 5 {
            slow_segment_step(voice, program);
        }
        if sub_phase == 0 {
            lfo_integrator_step(voice, program);
        }
        if sub_phase == 3 || sub_phase == 7 {
            update_pitch(voice, program, pitch_bend, fine_tune, output_frequency);
        }
        if sub_phase == 4 {
            update_amplitude(voice, program);
        }
    }
}

/// Interpolate the fast envelope counter one step through the 17-entry
/// exponential shape table toward `env_fast_target`, using 11 fractional
/// bits of sub-table resolution (`>>11` on the table delta).
fn fast_envelope_step(voice: &mut Voice) {
    let target = voice.env_fast_target;
    let current = voice.env_fast_counter;
    if current == target {
        return;
    }

    let table_index = (current >> 11).min(15) as usize;
    let frac = (current & 0x7FF) as u32;
    let lo = ENVELOPE_SHAPE[table_index] as u32;
    let hi = ENVELOPE_SHAPE[table_index + 1] as u32;
    let interpolated = lo + (((hi - lo) * frac) >> 11);

    voice.env_fast_counter = interpolated as u16;
}

/// Step the slow envelope segment (attack/decay/sustain/release) once,
/// advancing `env_slow_level` toward `env_slow_target` by `env_slow_rate`,
/// and transition the voice's coarse [`VoicePhase`] when a segment completes.
fn slow_segment_step(voice: &mut Voice, program: &ProgramData) {
    match voice.phase {
        VoicePhase::Attack => {
            voice.env_slow_target = 0x7FFF;
            voice.env_slow_rate = (program.amp_attack as i32).max(1) * 64;
            voice.env_slow_level = (voice.env_slow_level + voice.env_slow_rate).min(0x7FFF);
            if voice.env_slow_level >= 0x7FFF {
                voice.phase = VoicePhase::Decay;
            }
        }
        VoicePhase::Decay => {
            voice.env_slow_rate = (program.amp_decay as i32).max(1) * 32;
            let sustain_level = (program.amp_sustain as i32) << 8;
            voice.env_slow_level = (voice.env_slow_level - voice.env_slow_rate).max(sustain_level);
            if voice.env_slow_level <= sustain_level {
                voice.phase = VoicePhase::Sustain;
            }
        }
        VoicePhase::Sustain => {
            // Level holds; a note-off transitions the phase to Release
            // externally (see `VoicePool::release_note`).
        }
        VoicePhase::Release => {
            voice.env_slow_rate = (program.amp_release as i32).max(1) * 32;
            voice.env_slow_level = (voice.env_slow_level - voice.env_slow_rate).max(0);
            if voice.env_slow_level <= 0 {
                *voice = Voice::default();
            }
        }
        VoicePhase::Free => {}
    }
}

/// Advance the LFO phase integrator by the program's LFO rate, read from
/// [`PITCH_TABLE`]'s low range (indices 0..112, selected by `lfo_rate`).
fn lfo_integrator_step(voice: &mut Voice, program: &ProgramData) {
    let rate_index = (program.lfo_rate as usize) & 0xFF;
    let increment = PITCH_TABLE[rate_index.min(111)];
    voice.lfo_phase = voice.lfo_phase.wrapping_add(increment);
}

/// Recompute the voice's sample-advance rate from its note-dependent base
/// pitch ([`Voice::base_freq`]), the channel's fine tune and pitch-bend
/// (already scaled `>>13` by the caller), and the program's pitch envelope
/// depth and LFO.
///
/// Matches `voice_set_freq`: `pitch_bend`, `base_freq`, and `fine_tune` are
/// folded into a single combined index *before* the table lookups —
/// `idx = bend + base_freq + fine_tune + 2180` — rather than being added to
/// the looked-up value afterward. `idx >> 8` selects the coarse octave-table
/// entry (`PITCH_TABLE[216..256]`) and `idx & 0xFF` selects the fine-tune
/// table entry; the two are multiplied together.
///
/// The raw table product is scaled by `11025 / output_frequency` before the
/// final `>>17` so the resulting phase increment lands in the same units
/// regardless of the synth's current sample rate. At the three rates the
/// original firmware special-cased (11025/22050/44100Hz) this collapses to
/// the documented shift constants of 17/18/19; the general form additionally
/// covers 16538Hz and 48000Hz without a lookup table.
fn update_pitch(voice: &mut Voice, program: &ProgramData, pitch_bend: i32, fine_tune: i32, output_frequency: u32) {
    let idx = pitch_bend + voice.base_freq + fine_tune + 2180;
    let octave_index = (216 + (idx >> 8)).clamp(0, 255) as usize;
    let fine_index = (idx & 0xFF) as usize;
    let base = PITCH_TABLE[octave_index] as i64;
    let fine = FINE_TABLE[fine_index] as i64;

    let lfo_depth = program.lfo_depth as i64;
    let lfo_wave = (((voice.lfo_phase >> 22) & 0xFF) as i64 - 128) * lfo_depth;

    let pitch_env = (voice.env_slow_level as i64 * program.pitch_depth as i64) >> 15;

    let combined = base * fine >> 15;
    let modulated = combined + (combined * (lfo_wave + pitch_env) >> 15);

    let output_frequency = output_frequency.max(1) as i64;
    let scaled = (modulated * 11025 / output_frequency) >> 17;

    voice.pitch_step = scaled.clamp(1, u32::MAX as i64) as u32;
}

/// Recompute the voice's linear output amplitude from its envelope level,
/// velocity, and the program's key-scaling rate.
fn update_amplitude(voice: &mut Voice, program: &ProgramData) {
    let velocity_scale = voice.velocity as i32 + 1;
    let key_scale = program.key_scale as i32;
    let level = (voice.env_slow_level * velocity_scale) >> 7;
    voice.amplitude = (level - (level * key_scale >> 8)).max(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::Voice;

    fn program() -> ProgramData {
        ProgramData {
            amp_attack: 40,
            amp_decay: 20,
            amp_sustain: 64,
            amp_release: 10,
            pitch_depth: 0,
            lfo_rate: 10,
            lfo_depth: 0,
            key_scale: 0,
            ..Default::default()
        }
    }

    #[test]
    fn attack_segment_rises_until_full_scale_then_moves_to_decay() {
        let mut voice = Voice::default();
        voice.phase = VoicePhase::Attack;
        let pgm = program();
        for _ in 0..2000 {
            slow_segment_step(&mut voice, &pgm);
            if voice.phase != VoicePhase::Attack {
                break;
            }
        }
        assert_eq!(voice.phase, VoicePhase::Decay);
    }

    #[test]
    fn decay_segment_settles_at_sustain_level() {
        let mut voice = Voice::default();
        voice.phase = VoicePhase::Decay;
        voice.env_slow_level = 0x7FFF;
        let pgm = program();
        for _ in 0..2000 {
            slow_segment_step(&mut voice, &pgm);
            if voice.phase != VoicePhase::Decay {
                break;
            }
        }
        assert_eq!(voice.phase, VoicePhase::Sustain);
        assert_eq!(voice.env_slow_level, (pgm.amp_sustain as i32) << 8);
    }

    #[test]
    fn release_segment_frees_the_voice_at_zero() {
        let mut voice = Voice::default();
        voice.phase = VoicePhase::Release;
        voice.channel = Some(2);
        voice.note_number = Some(64);
        voice.env_slow_level = 1000;
        let pgm = program();
        for _ in 0..2000 {
            slow_segment_step(&mut voice, &pgm);
            if voice.phase == VoicePhase::Free {
                break;
            }
        }
        assert_eq!(voice.phase, VoicePhase::Free);
        assert_eq!(voice.note_number, None);
    }

    #[test]
    fn fast_envelope_step_converges_to_target() {
        let mut voice = Voice::default();
        voice.env_fast_target = 32768;
        for _ in 0..32 {
            fast_envelope_step(&mut voice);
        }
        assert!(voice.env_fast_counter > 0);
    }

    #[test]
    fn lfo_integrator_wraps_without_panicking() {
        let mut voice = Voice::default();
        voice.lfo_phase = u32::MAX - 10;
        let pgm = program();
        for _ in 0..20 {
            lfo_integrator_step(&mut voice, &pgm);
        }
    }

    #[test]
    fn update_pitch_depends_on_voice_base_freq_not_program_fields() {
        let pgm = program();
        let mut low = Voice::default();
        low.base_freq = 0;
        update_pitch(&mut low, &pgm, 0, 0, 44100);

        let mut high = Voice::default();
        high.base_freq = 12 * 256; // one octave above `low`
        update_pitch(&mut high, &pgm, 0, 0, 44100);

        assert!(high.pitch_step > low.pitch_step);
        // A full octave of base_freq roughly doubles the phase increment.
        let ratio = high.pitch_step as f64 / low.pitch_step as f64;
        assert!((1.8..2.2).contains(&ratio), "ratio was {ratio}");
    }

    #[test]
    fn update_pitch_bend_increases_phase_increment() {
        let pgm = program();
        let mut unbent = Voice::default();
        update_pitch(&mut unbent, &pgm, 0, 0, 44100);

        let mut bent = Voice::default();
        update_pitch(&mut bent, &pgm, 512, 0, 44100);

        assert!(bent.pitch_step > unbent.pitch_step);
    }
}
