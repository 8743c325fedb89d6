//! The fixed voice pool and its allocation/stealing policy.
//!
//! Grounded in `Voice_Data` and the `FindAvailableVoice` / `FindVoice` /
//! `StartPlayingVoice` / `DefragmentVoices` / `ReduceActiveVoices` /
//! `SetMaximumVoices` family of functions in the original firmware. The
//! 255-as-"no note" sentinel used throughout the original struct is
//! re-expressed here as `Option<u8>`.

pub const MAX_VOICES: usize = 128;

/// Envelope phase, advanced by [`crate::envelope`]'s phase-counter state
/// machine. `Release` voices are eligible for stealing before any other
/// phase; `Free` voices are always preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePhase {
    Free,
    Attack,
    Decay,
    Sustain,
    Release,
}

impl Default for VoicePhase {
    fn default() -> Self {
        VoicePhase::Free
    }
}

/// One synthesis voice's full runtime state.
#[derive(Debug, Clone, Copy)]
pub struct Voice {
    pub phase: VoicePhase,
    pub channel: Option<u8>,
    pub note_number: Option<u8>,
    pub velocity: u8,
    pub is_drum: bool,
    /// Which of the channel's two program records (0 or 1) this voice was
    /// started from. A note-on allocates a layer-1 voice alongside layer 0
    /// only when layer 0's program has [`crate::program::LAYER_ENABLE_BIT`]
    /// set on its `base_pitch` field.
    pub layer: u8,

    /// Note-dependent pitch origin, set once at note-on by combining the
    /// note number (plus channel coarse tune, octave-folded the way the
    /// original does for melodic channels) with the waveform header's
    /// recorded base-frequency word. Matches `voice_data_ptr->base_freq` in
    /// the original; see [`crate::envelope::advance_voice`] for how it feeds
    /// the pitch table lookup.
    pub base_freq: i32,
    /// Current sample-advance rate (fixed point, 22.10).
    pub pitch_step: u32,
    /// Playback position, fixed point (22.10): the integer part is a decoded
    /// sample index relative to `wv_start`, not a ROM byte address directly —
    /// the ROM stores two delta-coded samples per 16-bit word, so the byte
    /// cursor ([`Voice::wv_pos`]) advances at half the rate of the sample index.
    pub play_pos: u32,
    /// ROM byte offset of the waveform header's first sample word.
    pub wv_start: u32,
    /// Sample index (relative to `wv_start`) where the waveform ends: on
    /// reaching it, the voice either loops to `wv_loop_start` or, if
    /// `wv_end == wv_loop_start` (a one-shot sample), is freed.
    pub wv_end: u32,
    /// Sample index (relative to `wv_start`) to resume at when looping.
    pub wv_loop_start: u32,
    /// ROM byte offset of the next undecoded word.
    pub wv_pos: u32,
    /// Count of delta-coded samples decoded so far (relative to `wv_start`).
    pub decoded_upto: u32,
    pub wave_bank: u16,

    /// Fast envelope phase-counter fields, matching `field_52`/`field_50`.
    pub env_fast_counter: u16,
    pub env_fast_target: u16,
    /// Slow segment fields, matching `field_48`/`field_4A`/`field_4C`.
    pub env_slow_level: i32,
    pub env_slow_rate: i32,
    pub env_slow_target: i32,
    /// LFO integrator phase.
    pub lfo_phase: u32,

    pub amplitude: i32,
    pub pan: i16,

    /// One-pole lowpass smoothing state for the delta decoder.
    pub lowpass_state: i32,
    /// Delta decoder's last reconstructed sample pair, for interpolation.
    pub sample_prev: i16,
    pub sample_curr: i16,
    /// Second delta sample decoded from the most recent ROM word but not yet
    /// consumed (each word yields two samples; playback consumes one at a
    /// time).
    pub pending_delta: Option<i16>,
    /// Running quantization-shift accumulator, adjusted by each decoded
    /// word's 2-bit control field (see [`crate::tables::QUANT_SHIFT_DELTA`]).
    pub quant_shift: i32,

    /// Used by the voice-stealing scan to resume from where it left off.
    pub recency_tiebreak: u32,
}

impl Default for Voice {
    fn default() -> Self {
        Voice {
            phase: VoicePhase::Free,
            channel: None,
            note_number: None,
            velocity: 0,
            is_drum: false,
            layer: 0,
            base_freq: 0,
            pitch_step: 0,
            play_pos: 0,
            wv_start: 0,
            wv_end: 0,
            wv_loop_start: 0,
            wv_pos: 0,
            decoded_upto: 0,
            wave_bank: 0,
            env_fast_counter: 0,
            env_fast_target: 0,
            env_slow_level: 0,
            env_slow_rate: 0,
            env_slow_target: 0,
            lfo_phase: 0,
            amplitude: 0,
            pan: 0,
            lowpass_state: 0,
            sample_prev: 0,
            sample_curr: 0,
            pending_delta: None,
            quant_shift: 0,
            recency_tiebreak: 0,
        }
    }
}

impl Voice {
    pub fn is_free(&self) -> bool {
        self.phase == VoicePhase::Free
    }

    pub fn matches(&self, channel: u8, note: u8) -> bool {
        self.channel == Some(channel) && self.note_number == Some(note)
    }

    fn reset(&mut self) {
        *self = Voice::default();
    }

    /// Prime the wavetable-playback fields from a resolved waveform header
    /// (`wv_start`/`wv_loop_start`/`wv_end` are byte/sample offsets already
    /// resolved against the ROM by the caller — see the synth facade's
    /// program/wavetable lookup).
    pub fn set_wavetable(&mut self, wv_start: u32, wv_loop_start: u32, wv_end: u32) {
        self.wv_start = wv_start;
        self.wv_loop_start = wv_loop_start;
        self.wv_end = wv_end.max(wv_loop_start);
        self.wv_pos = wv_start;
        self.play_pos = 0;
        self.decoded_upto = 0;
        self.sample_prev = 0;
        self.sample_curr = 0;
        self.pending_delta = None;
        self.quant_shift = 0;
    }
}

/// Owns the fixed voice pool and its allocation/stealing state.
pub struct VoicePool {
    voices: Vec<Voice>,
    max_voices: usize,
    recent_voice_index: usize,
}

impl VoicePool {
    pub fn new(max_voices: u32) -> Self {
        let max_voices = (max_voices as usize).clamp(1, MAX_VOICES);
        VoicePool {
            voices: vec![Voice::default(); MAX_VOICES],
            max_voices,
            recent_voice_index: 0,
        }
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices[..self.max_voices]
    }

    pub fn voices_mut(&mut self) -> &mut [Voice] {
        let max = self.max_voices;
        &mut self.voices[..max]
    }

    pub fn voice(&self, index: usize) -> &Voice {
        &self.voices[index]
    }

    pub fn voice_mut(&mut self, index: usize) -> &mut Voice {
        &mut self.voices[index]
    }

    /// Change the active voice count, matching `SetMaximumVoices`: voices
    /// beyond the new limit are force-released immediately.
    pub fn set_maximum_voices(&mut self, max_voices: u32) {
        let max_voices = (max_voices as usize).clamp(1, MAX_VOICES);
        if max_voices < self.max_voices {
            for v in &mut self.voices[max_voices..self.max_voices] {
                v.reset();
            }
        }
        self.max_voices = max_voices;
        if self.recent_voice_index >= self.max_voices {
            self.recent_voice_index = 0;
        }
    }

    /// Exact note match for note-off / sustain-pedal handling, scanning the
    /// active voice range only.
    pub fn find_voice(&self, channel: u8, note: u8) -> Option<usize> {
        self.voices[..self.max_voices]
            .iter()
            .position(|v| !v.is_free() && v.matches(channel, note))
    }

    /// Find a voice to (re)use for a new note-on, following the original's
    /// stealing priority: first a fully free voice, then the oldest voice in
    /// `Release` phase scanning circularly from just after
    /// `recent_voice_index`, then — on the drum channel — any drum voice
    /// circularly, and finally the voice immediately after
    /// `recent_voice_index` regardless of phase.
    pub fn find_available_voice(&self, is_drum: bool) -> usize {
        if let Some(i) = self.voices[..self.max_voices].iter().position(Voice::is_free) {
            return i;
        }

        let n = self.max_voices;
        for offset in 1..=n {
            let i = (self.recent_voice_index + offset) % n;
            if self.voices[i].phase == VoicePhase::Release {
                return i;
            }
        }

        if is_drum {
            for offset in 1..=n {
                let i = (self.recent_voice_index + offset) % n;
                if self.voices[i].is_drum {
                    return i;
                }
            }
        }

        (self.recent_voice_index + 1) % n
    }

    /// Commit `index` as the most recently allocated voice and mark it
    /// playing with the given note/channel/velocity.
    pub fn start_playing_voice(
        &mut self,
        index: usize,
        channel: u8,
        note: u8,
        velocity: u8,
        is_drum: bool,
    ) {
        let v = &mut self.voices[index];
        v.reset();
        v.phase = VoicePhase::Attack;
        v.channel = Some(channel);
        v.note_number = Some(note);
        v.velocity = velocity;
        v.is_drum = is_drum;
        self.recent_voice_index = index;
    }

    /// Move every active voice's contents into the lowest-indexed free slots,
    /// preserving playback order. Used after `set_maximum_voices` shrinks the
    /// pool, or periodically to keep the free-voice scan cheap.
    pub fn defragment_voices(&mut self) {
        let max = self.max_voices;
        let mut write = 0;
        for read in 0..max {
            if !self.voices[read].is_free() {
                if write != read {
                    self.voices[write] = self.voices[read];
                    self.voices[read].reset();
                }
                write += 1;
            }
        }
    }

    /// Force-release every voice beyond `target` active voices, oldest first
    /// by pool index, matching `ReduceActiveVoices`.
    pub fn reduce_active_voices(&mut self, target: usize) {
        let active: Vec<usize> = self.voices[..self.max_voices]
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_free())
            .map(|(i, _)| i)
            .collect();
        if active.len() > target {
            for &i in &active[..active.len() - target] {
                self.voices[i].phase = VoicePhase::Release;
            }
        }
    }

    /// Release (to `Release` phase, not immediately freed — the envelope
    /// engine still runs the release segment) every voice matching
    /// `channel`/`note`.
    pub fn release_note(&mut self, channel: u8, note: u8) {
        for v in self.voices[..self.max_voices].iter_mut() {
            if v.matches(channel, note) && v.phase != VoicePhase::Release {
                v.phase = VoicePhase::Release;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_free_voice_over_stealing() {
        let mut pool = VoicePool::new(4);
        pool.start_playing_voice(0, 0, 60, 100, false);
        let idx = pool.find_available_voice(false);
        assert_eq!(idx, 1);
    }

    #[test]
    fn steals_release_phase_voice_circularly() {
        let mut pool = VoicePool::new(4);
        for i in 0..4 {
            pool.start_playing_voice(i, 0, 60 + i as u8, 100, false);
        }
        pool.voice_mut(2).phase = VoicePhase::Release;
        let idx = pool.find_available_voice(false);
        assert_eq!(idx, 2);
    }

    #[test]
    fn set_maximum_voices_releases_voices_beyond_new_limit() {
        let mut pool = VoicePool::new(4);
        for i in 0..4 {
            pool.start_playing_voice(i, 0, 60 + i as u8, 100, false);
        }
        pool.set_maximum_voices(2);
        assert!(pool.voice(2).is_free());
        assert!(pool.voice(3).is_free());
    }

    #[test]
    fn defragment_packs_active_voices_to_the_front() {
        let mut pool = VoicePool::new(4);
        pool.start_playing_voice(1, 0, 61, 100, false);
        pool.start_playing_voice(3, 0, 63, 100, false);
        pool.defragment_voices();
        assert!(!pool.voice(0).is_free());
        assert!(!pool.voice(1).is_free());
        assert!(pool.voice(2).is_free());
        assert!(pool.voice(3).is_free());
    }

    #[test]
    fn reduce_active_voices_releases_oldest_first() {
        let mut pool = VoicePool::new(4);
        for i in 0..4 {
            pool.start_playing_voice(i, 0, 60 + i as u8, 100, false);
        }
        pool.reduce_active_voices(2);
        assert_eq!(pool.voice(0).phase, VoicePhase::Release);
        assert_eq!(pool.voice(1).phase, VoicePhase::Release);
        assert_eq!(pool.voice(2).phase, VoicePhase::Attack);
        assert_eq!(pool.voice(3).phase, VoicePhase::Attack);
    }

    #[test]
    fn find_voice_matches_exact_channel_and_note() {
        let mut pool = VoicePool::new(4);
        pool.start_playing_voice(0, 3, 64, 100, false);
        assert_eq!(pool.find_voice(3, 64), Some(0));
        assert_eq!(pool.find_voice(3, 65), None);
    }
}
