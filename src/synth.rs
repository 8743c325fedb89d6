//! The `Synth` facade: owns every subsystem and exposes the init/parameter/
//! render surface described in the reference interface.
//!
//! Grounded in the reference workspace's `SynthProcessor` (see the bundled
//! `synth` example): a single struct owning voices, per-channel state, and a
//! pending-event list, with `render_block` draining sample-accurate events as
//! it walks the frame loop. Re-expressed per DESIGN.md's "single owning
//! struct" note: the original device kept this all as file-scope statics.

use crate::channel::{ChannelState, DRUM_CHANNEL, NUM_CHANNELS};
use crate::config::{ReverbMode, SampleRate, SynthConfig};
use crate::decoder::{ChannelEvent, DecodedEvent, MidiDecoder, SysExEvent};
use crate::envelope;
use crate::error::{SynthError, SynthResult};
use crate::generator;
use crate::midi_ring::{Drain, MidiRingBuffer};
use crate::program::{self, ProgramData, RECORDS_PER_CHANNEL};
use crate::reverb::Reverb;
use crate::rom::Rom;
use crate::tables;
use crate::velocity;
use crate::voice::{Voice, VoicePhase, VoicePool};

/// ROM bank indices used by the synth facade to resolve program, wavetable,
/// and pan data. See `SPEC_FULL.md` §3/§4.6 for what each bank holds.
pub mod bank {
    pub const PROGRAM: u32 = 1;
    pub const VOICE_INDEX: u32 = 2;
    pub const NOTE_INDEX: u32 = 3;
    pub const PAN_GAIN: u32 = 17;
    pub const DRUM_PAN: u32 = 18;
    pub const PROGRAM_REMAP: u32 = 19;
}

/// Wall-clock overrun thresholds (ms) that trigger adaptive polyphony
/// reduction, and the fraction of the last requested ceiling each level
/// reduces to.
const OVERRUN_MILD_MS: u32 = 16;
const OVERRUN_SEVERE_MS: u32 = 20;
const OVERRUN_CRITICAL_MS: u32 = 300;

/// A MIDI message queued by [`Synth::submit_event`] for sample-accurate
/// application partway through a render block. Short messages only (no
/// SysEx) — at most 3 bytes, matching the longest channel-voice message.
#[derive(Debug, Clone, Copy)]
struct PendingEvent {
    sample_offset: u32,
    bytes: [u8; 3],
    len: u8,
}

/// Owns every piece of synth state: ROM, per-channel controller state,
/// program records, the voice pool, the reverb, and the MIDI decode path.
///
/// Render is wait-free and infallible (see §5/§7 of `SPEC_FULL.md`): once
/// constructed, `render_block` never blocks and never returns an error, even
/// with no ROM bound (it writes silence). Only construction-time and
/// parameter-setting calls are fallible.
pub struct Synth {
    config: SynthConfig,
    rom: Option<Rom>,
    channels: [ChannelState; NUM_CHANNELS],
    programs: [ProgramData; crate::program::NUM_PROGRAM_RECORDS],
    voices: VoicePool,
    reverb: Reverb,
    decoder: MidiDecoder,
    midi_ring: MidiRingBuffer,
    pending: Vec<PendingEvent>,
    time_source: Option<fn() -> u32>,
    sample_rate: SampleRate,
    velocity_curve: u32,
    requested_polyphony: u32,
    frame_in_quantum: u32,
    playing: bool,
}

impl Synth {
    /// Construct a synth in a valid, silent, ROM-less state. Call
    /// [`Synth::try_set_rom`] (or [`Synth::set_rom`]) before rendering audio.
    pub fn new(config: SynthConfig) -> Self {
        Synth {
            config,
            rom: None,
            channels: [ChannelState::new(); NUM_CHANNELS],
            programs: [ProgramData::default(); crate::program::NUM_PROGRAM_RECORDS],
            voices: VoicePool::new(config.polyphony),
            reverb: build_reverb(config.reverb),
            decoder: MidiDecoder::new(),
            midi_ring: MidiRingBuffer::new(),
            pending: Vec::new(),
            time_source: None,
            sample_rate: config.sample_rate,
            velocity_curve: config.velocity_curve,
            requested_polyphony: config.polyphony,
            frame_in_quantum: 0,
            playing: false,
        }
    }

    // ---------------------------------------------------------------
    // Init / parameters
    // ---------------------------------------------------------------

    /// Bind a 2 MiB ROM image. Replaces any previously bound ROM and resets
    /// all voices, since wavetable pointers from the old image are invalid
    /// against the new one.
    pub fn try_set_rom(&mut self, data: Vec<u8>) -> SynthResult<()> {
        let rom = Rom::new(data)?;
        log::info!("ROM image bound ({} bytes)", crate::rom::ROM_SIZE);
        self.rom = Some(rom);
        self.kill_all_voices();
        Ok(())
    }

    pub fn set_rom(&mut self, data: Vec<u8>) -> bool {
        self.try_set_rom(data).is_ok()
    }

    /// Frequency parameter codes: 0→11025, 1→22050, 2→44100, 3→16538, 4→48000.
    pub fn try_set_frequency(&mut self, code: u32) -> SynthResult<()> {
        let rate = match code {
            0 => SampleRate::Hz11025,
            1 => SampleRate::Hz22050,
            2 => SampleRate::Hz44100,
            3 => SampleRate::Hz16538,
            4 => SampleRate::Hz48000,
            _ => return Err(SynthError::BadParameter { code }),
        };
        log::info!("sample rate set to {} Hz", rate.hz());
        self.sample_rate = rate;
        self.frame_in_quantum = 0;
        Ok(())
    }

    pub fn set_frequency(&mut self, code: u32) -> bool {
        self.try_set_frequency(code).is_ok()
    }

    /// Polyphony parameter codes: 0x10→24, 0x11→32, 0x12→48, 0x13→64, 0x14→128.
    pub fn try_set_polyphony(&mut self, code: u32) -> SynthResult<()> {
        let count = match code {
            0x10 => 24,
            0x11 => 32,
            0x12 => 48,
            0x13 => 64,
            0x14 => 128,
            _ => return Err(SynthError::BadParameter { code }),
        };
        log::info!("polyphony set to {count}");
        self.requested_polyphony = count;
        self.voices.set_maximum_voices(count);
        Ok(())
    }

    pub fn set_polyphony(&mut self, code: u32) -> bool {
        self.try_set_polyphony(code).is_ok()
    }

    /// Effect parameter codes: 0x20→off, 0x21→standard, 0x22→high.
    pub fn try_set_effect(&mut self, code: u32) -> SynthResult<()> {
        let mode = match code {
            0x20 => ReverbMode::Off,
            0x21 => ReverbMode::Standard,
            0x22 => ReverbMode::High,
            _ => return Err(SynthError::BadParameter { code }),
        };
        self.apply_reverb_mode(mode);
        Ok(())
    }

    pub fn set_effect(&mut self, code: u32) -> bool {
        self.try_set_effect(code).is_ok()
    }

    /// Velocity-curve parameter codes: 0x40..=0x4B → curves 0..=11.
    pub fn try_set_velocity_curve(&mut self, code: u32) -> SynthResult<()> {
        if !(0x40..=0x4B).contains(&code) {
            return Err(SynthError::BadParameter { code });
        }
        self.velocity_curve = code - 0x40;
        Ok(())
    }

    pub fn set_velocity_curve(&mut self, code: u32) -> bool {
        self.try_set_velocity_curve(code).is_ok()
    }

    /// Install the host-supplied monotonic millisecond clock. Never called
    /// from inside this crate's render path directly (see §5 of
    /// `SPEC_FULL.md`) — only through this indirection.
    pub fn set_time_source(&mut self, source: fn() -> u32) {
        self.time_source = Some(source);
    }

    pub fn playback_start(&mut self) {
        self.playing = true;
    }

    pub fn playback_stop(&mut self) {
        self.playing = false;
        self.kill_all_voices();
    }

    /// Count of MIDI bytes dropped because the ring buffer was full.
    pub fn dropped_midi_bytes(&self) -> u64 {
        self.midi_ring.dropped_bytes() as u64
    }

    /// Count of currently active (non-free) voices.
    pub fn active_voice_count(&self) -> u32 {
        self.voices.voices().iter().filter(|v| !v.is_free()).count() as u32
    }

    // ---------------------------------------------------------------
    // MIDI input
    // ---------------------------------------------------------------

    /// Append raw MIDI bytes, each timestamped with the current time source
    /// value, for the render thread to drain on the next `render_block`.
    pub fn write(&mut self, bytes: &[u8]) {
        let now = self.now();
        for &b in bytes {
            self.midi_ring.push(now, b);
        }
    }

    /// Queue a complete short MIDI message (no SysEx) for application at a
    /// specific frame offset within the next `render_block` call.
    pub fn submit_event(&mut self, msg: &[u8], sample_offset: u32) {
        if msg.is_empty() || msg.len() > 3 {
            return;
        }
        let mut bytes = [0u8; 3];
        bytes[..msg.len()].copy_from_slice(msg);
        self.pending.push(PendingEvent {
            sample_offset,
            bytes,
            len: msg.len() as u8,
        });
    }

    fn now(&self) -> u32 {
        self.time_source.map(|f| f()).unwrap_or(0)
    }

    /// Drain every complete record currently queued in the MIDI ring buffer,
    /// feeding bytes through the running-status decoder and dispatching
    /// whatever falls out.
    fn drain_ring(&mut self) {
        let now = self.now();
        loop {
            match self.midi_ring.pop(now) {
                Drain::Byte(b) => {
                    if let Some(event) = self.decoder.feed(b) {
                        self.dispatch(event);
                    }
                }
                Drain::Empty => break,
                Drain::Stale => {
                    log::warn!("MIDI ring buffer stale, flushing all voices");
                    self.kill_all_voices();
                    break;
                }
            }
        }
    }

    /// Apply every queued [`PendingEvent`] whose offset has reached `frame`.
    fn apply_due_events(&mut self, frame: u32) {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].sample_offset <= frame {
                let ev = self.pending.remove(i);
                if let Some(event) = decode_short_message(&ev.bytes[..ev.len as usize]) {
                    self.dispatch(DecodedEvent::Channel(event));
                }
            } else {
                i += 1;
            }
        }
    }

    fn dispatch(&mut self, event: DecodedEvent) {
        match event {
            DecodedEvent::Channel(ev) => self.dispatch_channel_event(ev),
            DecodedEvent::SysEx(ev) => self.dispatch_sysex(ev),
        }
    }

    fn dispatch_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::NoteOn { channel, note, velocity } => self.note_on(channel, note, velocity),
            ChannelEvent::NoteOff { channel, note } => self.note_off(channel, note),
            ChannelEvent::ControlChange { channel, controller, value } => {
                self.control_change(channel, controller, value)
            }
            ChannelEvent::ProgramChange { channel, program } => self.program_change(channel, program),
            ChannelEvent::ChannelPressure { channel, pressure } => {
                self.channels[channel as usize & 0x0F].channel_pressure = pressure as i16;
            }
            ChannelEvent::PitchBend { channel, value } => {
                self.channels[channel as usize & 0x0F].pitch_bend = value;
            }
        }
    }

    fn dispatch_sysex(&mut self, event: SysExEvent) {
        match event {
            SysExEvent::GmReset => self.global_reset("GM"),
            SysExEvent::GsReset => self.global_reset("GS"),
            SysExEvent::SetPolyphony(n) => {
                self.requested_polyphony = n;
                self.voices.set_maximum_voices(n);
            }
            SysExEvent::SetReverb(mode) => self.apply_reverb_mode(mode),
            SysExEvent::SetVelocityCurve(c) => self.velocity_curve = c,
        }
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        let ch = channel as usize & 0x0F;
        match controller {
            // All-sounds-off and all-notes-off act on the voice pool, not
            // channel controller state — intercepted here rather than in
            // `decoder::apply_control_change`.
            120 => self.kill_channel(channel),
            123 => self.release_channel(channel),
            64 => {
                let was_sustained = self.channels[ch].sustain();
                crate::decoder::apply_control_change(&mut self.channels, channel, controller, value);
                if was_sustained && !self.channels[ch].sustain() {
                    self.release_sustained_notes(channel);
                }
            }
            _ => crate::decoder::apply_control_change(&mut self.channels, channel, controller, value),
        }
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(channel, note);
            return;
        }
        if self.rom.is_none() {
            return;
        }
        let is_drum = channel as usize == DRUM_CHANNEL;

        if is_drum {
            self.apply_drum_exclusion(channel, note);
        }

        self.play_layer(channel, note, velocity, 0, is_drum);

        // A second, stacked voice plays alongside layer 0 whenever layer 0's
        // program has the layer-enable bit set on its `base_pitch` field —
        // `NoteOn(1)` only runs when `program_data_ptr->field_02 & 0x8000` in
        // the original dispatch for 0x90.
        let layer0 = self.programs[channel as usize * RECORDS_PER_CHANNEL];
        if layer0.base_pitch & program::LAYER_ENABLE_BIT != 0 {
            self.play_layer(channel, note, velocity, 1, is_drum);
        }
    }

    /// Allocate and start one voice playing `channel`/`note` against the
    /// given program layer (0 or 1). Layer 1 is only invoked by [`Synth::note_on`]
    /// when the program requests it; both layers share the same velocity,
    /// drum-exclusion handling, and allocation policy.
    fn play_layer(&mut self, channel: u8, note: u8, velocity: u8, layer: usize, is_drum: bool) {
        let Some(rom_ptr) = self.rom_ptr() else { return };
        let program = self.programs[channel as usize * RECORDS_PER_CHANNEL + layer];
        let lookup_note = if is_drum {
            note as i32
        } else {
            note as i32 + self.channels[channel as usize].coarse_tune as i32
        };
        let lookup_note = lookup_note.clamp(0, 127) as u8;

        // Safety: `rom_ptr` was derived from `self.rom` a moment ago and
        // nothing in this function touches `self.rom`.
        let rom = unsafe { &*rom_ptr };
        let (wv_start, wv_loop_start, wv_end, header_base_freq) = resolve_waveform(rom, &program, lookup_note);
        if wv_start == 0 && wv_loop_start == 0 && wv_end == 0 {
            log::debug!("note {note} on channel {channel} layer {layer} resolved an empty wavetable header");
        }

        let shaped = velocity::lookup(self.velocity_curve, velocity);
        let shaped = if self.channels[channel as usize].soft() { shaped / 2 } else { shaped };
        let shaped = shaped.clamp(0, 127) as u8;

        let idx = self.voices.find_available_voice(is_drum);
        self.voices.start_playing_voice(idx, channel, note, shaped, is_drum);
        let voice = self.voices.voice_mut(idx);
        voice.layer = layer as u8;
        voice.set_wavetable(wv_start, wv_loop_start, wv_end);
        voice.base_freq = resolve_base_freq(
            note,
            self.channels[channel as usize].coarse_tune,
            header_base_freq,
            is_drum,
        );
        voice.pan = resolve_pan(rom, self.channels[channel as usize].pan, program.pan, note, is_drum);
        voice.wave_bank = program.wave_bank;
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        if channel as usize == DRUM_CHANNEL {
            // `program_change` on the drum channel is stored as 128 + the
            // resolved kit index (see `program_change`), so Orchestra Kit
            // (kit index 7) reads back as 135 here and in
            // `apply_drum_exclusion` — both checks share one representation.
            let program_raw = self.channels[DRUM_CHANNEL].program_change;
            if program_raw != 135 || note != 88 {
                return;
            }
        }
        if self.channels[channel as usize & 0x0F].sustain() {
            return;
        }
        self.voices.release_note(channel, note);
    }

    fn program_change(&mut self, channel: u8, program: u8) {
        let ch = channel as usize & 0x0F;
        let (resolved, stored) = if ch == DRUM_CHANNEL {
            if !tables::DRUM_KITS.contains(&program) {
                return;
            }
            let kit = program::resolve_drum_kit(program);
            // Stored as 128 + kit index so the orchestra-kit check in
            // `apply_drum_exclusion`/`note_off` (spec's literal "program ==
            // 135") and the ROM lookup share one representation.
            (kit, 128 + kit as u16)
        } else {
            (program, program as u16)
        };
        self.channels[ch].program_change = stored;
        self.load_program_layers(ch, resolved);
        if self.rom.is_none() {
            log::debug!("program change on channel {channel} before a ROM was bound");
        }
    }

    /// Load both program layers for channel `ch` via the bank-19
    /// program-number remap, matching the device's `ProgramChange` (it always
    /// resolves the raw program number through that remap table before
    /// indexing bank 1, for melodic and drum-kit program numbers alike).
    fn load_program_layers(&mut self, ch: usize, resolved_program: u8) {
        let Some(rom) = self.rom.as_ref() else { return };
        let remap_base = rom.change_bank(bank::PROGRAM_REMAP, 0).offset();
        let layers = ProgramData::load_layer_pair(rom, remap_base, bank::PROGRAM, resolved_program as i32);
        self.programs[ch * RECORDS_PER_CHANNEL] = layers[0];
        self.programs[ch * RECORDS_PER_CHANNEL + 1] = layers[1];
    }

    fn apply_drum_exclusion(&mut self, channel: u8, note: u8) {
        let orchestra = self.channels[channel as usize & 0x0F].program_change == 135;
        let start = if orchestra { tables::DRUM_EXC_ORCHESTRA_START } else { 0 };
        let mut targets = [false; 256];
        for t in tables::drum_exclusion_targets(start, note) {
            targets[t as usize] = true;
        }
        for voice in self.voices.voices_mut() {
            if voice.channel == Some(channel) {
                if let Some(n) = voice.note_number {
                    if targets[n as usize] {
                        *voice = Voice::default();
                    }
                }
            }
        }
    }

    fn release_sustained_notes(&mut self, channel: u8) {
        for voice in self.voices.voices_mut() {
            if voice.channel == Some(channel) && voice.phase == VoicePhase::Sustain {
                voice.phase = VoicePhase::Release;
            }
        }
    }

    fn kill_channel(&mut self, channel: u8) {
        for voice in self.voices.voices_mut() {
            if voice.channel == Some(channel) {
                *voice = Voice::default();
            }
        }
    }

    fn release_channel(&mut self, channel: u8) {
        for voice in self.voices.voices_mut() {
            if voice.channel == Some(channel) && voice.phase != VoicePhase::Free {
                voice.phase = VoicePhase::Release;
            }
        }
    }

    fn kill_all_voices(&mut self) {
        for voice in self.voices.voices_mut() {
            *voice = Voice::default();
        }
    }

    fn global_reset(&mut self, label: &str) {
        log::info!("{label} reset received");
        self.kill_all_voices();
        for ch in 0..NUM_CHANNELS {
            self.channels[ch].reset_controllers();
            self.channels[ch].program_change = 0;
            self.load_program_layers(ch, 0);
        }
    }

    fn apply_reverb_mode(&mut self, mode: ReverbMode) {
        log::info!("reverb mode set to {mode:?}");
        self.config.reverb = mode;
        self.reverb.set_enabled(mode != ReverbMode::Off);
        self.reverb.set_attenuate(mode == ReverbMode::Standard);
    }

    /// Raw pointer to the bound ROM, used to sidestep a long-lived immutable
    /// borrow of `self.rom` across calls that also need `&mut self.voices`.
    fn rom_ptr(&self) -> Option<*const Rom> {
        self.rom.as_ref().map(|r| r as *const Rom)
    }

    // ---------------------------------------------------------------
    // Render
    // ---------------------------------------------------------------

    /// Render `n_frames` of stereo audio into `outputs[0]` (left) and
    /// `outputs[1]` (right), draining queued MIDI first. Never fails: with no
    /// ROM bound or playback stopped, the buffers are zeroed instead.
    pub fn render_block(&mut self, outputs: &mut [&mut [f64]], n_frames: usize) -> u32 {
        if self.rom.is_none() || !self.playing || outputs.len() < 2 {
            for ch in outputs.iter_mut() {
                for s in ch.iter_mut().take(n_frames) {
                    *s = 0.0;
                }
            }
            return 0;
        }

        let start = self.now();
        self.drain_ring();

        for frame in 0..n_frames as u32 {
            self.apply_due_events(frame);

            self.frame_in_quantum += 1;
            if self.frame_in_quantum >= self.sample_rate.output_size_para() {
                self.frame_in_quantum = 0;
                self.advance_envelopes();
            }

            let (left, right) = self.generate_frame();
            outputs[0][frame as usize] = left;
            outputs[1][frame as usize] = right;
        }

        for ev in self.pending.iter_mut() {
            ev.sample_offset = ev.sample_offset.saturating_sub(n_frames as u32);
        }

        let elapsed = self.now().wrapping_sub(start);
        self.adapt_polyphony(elapsed);

        self.active_voice_count()
    }

    fn advance_envelopes(&mut self) {
        let sample_rate_hz = self.sample_rate.hz();
        let programs = &self.programs;
        let channels = &self.channels;
        for voice in self.voices.voices_mut() {
            if voice.is_free() {
                continue;
            }
            let Some(channel) = voice.channel else { continue };
            let program = &programs[channel as usize * RECORDS_PER_CHANNEL + voice.layer as usize];
            let pitch_bend = resolve_pitch_bend(&channels[channel as usize]);
            let fine_tune = channels[channel as usize].fine_tune as i32;
            envelope::advance_voice(voice, program, pitch_bend, fine_tune, sample_rate_hz);
        }
    }

    fn generate_frame(&mut self) -> (f64, f64) {
        let Some(rom_ptr) = self.rom_ptr() else { return (0.0, 0.0) };
        // Safety: no other reference to `self.rom` is alive during this call.
        let rom = unsafe { &*rom_ptr };

        let mut left: i64 = 0;
        let mut right: i64 = 0;
        for voice in self.voices.voices_mut() {
            if voice.is_free() {
                continue;
            }
            match generator::next_sample(voice, rom) {
                Some(sample) => generator::mix_into(voice, sample, &mut left, &mut right),
                None => *voice = Voice::default(),
            }
        }

        let sum = (left + right) as i32;
        let (wet_left, wet_right) = self.reverb.process(sum);

        (
            saturate_i16(left + wet_left as i64) as f64,
            saturate_i16(right + wet_right as i64) as f64,
        )
    }

    /// Lower the voice cap when the last block's wall-clock render time
    /// overran the thresholds in §5, restoring it once things recover.
    fn adapt_polyphony(&mut self, elapsed_ms: u32) {
        if self.time_source.is_none() {
            return;
        }
        let ceiling = self.requested_polyphony;
        if elapsed_ms > OVERRUN_CRITICAL_MS {
            let target = (ceiling / 2).max(1);
            log::warn!("render overran {elapsed_ms}ms, forcing polyphony down to {target}");
            self.voices.set_maximum_voices(target);
        } else if elapsed_ms > OVERRUN_SEVERE_MS {
            let target = ((ceiling * 3 / 4).max(1)) as usize;
            log::warn!("render overran {elapsed_ms}ms, releasing down to {target} voices");
            self.voices.reduce_active_voices(target);
        } else if elapsed_ms > OVERRUN_MILD_MS {
            let target = ((ceiling * 7 / 8).max(1)) as usize;
            self.voices.reduce_active_voices(target);
        } else {
            self.voices.set_maximum_voices(ceiling);
        }
    }
}

fn build_reverb(mode: ReverbMode) -> Reverb {
    let mut reverb = Reverb::new();
    reverb.set_enabled(mode != ReverbMode::Off);
    reverb.set_attenuate(mode == ReverbMode::Standard);
    reverb
}

fn resolve_pitch_bend(ch: &ChannelState) -> i32 {
    (ch.pitch_bend as i32 * ch.pitch_bend_sense as i32) >> 13
}

fn saturate_i16(value: i64) -> i32 {
    value.clamp(i16::MIN as i64, i16::MAX as i64) as i32
}

/// Resolve a note's wavetable header: bank 3 maps a (wave-bank-adjusted) note
/// number to a voice index, and bank 2 holds that voice's 5-word header
/// (`wv_start` as a 32-bit sample index split across two words, then
/// `wv_loop_start` and `wv_end` each as a single word, then a signed
/// base-frequency word used to seed [`Voice::base_freq`]). This layout is a
/// simplification recorded in DESIGN.md: the literal header fields in
/// `SPEC_FULL.md` §4.6 (start, loop start, end, base frequency, quantization
/// shift) don't specify exact word widths.
fn resolve_waveform(rom: &Rom, program: &ProgramData, note: u8) -> (u32, u32, u32, i32) {
    let mut note_cursor = rom.change_bank(bank::NOTE_INDEX, program.wave_bank as i32 + note as i32);
    let voice_index = note_cursor.read_word(rom) as i32;

    let mut header_cursor = rom.change_bank(bank::VOICE_INDEX, voice_index);
    let start_lo = header_cursor.read_word(rom) as u32;
    let start_hi = header_cursor.read_word(rom) as u32;
    let wv_start = start_lo | (start_hi << 16);
    let wv_loop_start = header_cursor.read_word(rom) as u32;
    let wv_end = header_cursor.read_word(rom) as u32;
    let header_base_freq = header_cursor.read_word(rom) as i16 as i32;

    (wv_start, wv_loop_start, wv_end, header_base_freq)
}

/// Note units per semitone in the combined pitch-table index (`idx >> 8`
/// selects the coarse octave-table entry, so 256 units == one table step).
const SEMITONE_UNITS: i32 = 256;

/// This crate's waveform header has no per-sample root-note byte (the
/// original's `wv_un1_hi`), so note offsets are taken relative to a fixed
/// middle-C root; see DESIGN.md.
const NOTE_PITCH_ROOT: i32 = 60;

/// Derive a voice's note-dependent pitch origin: the note number (folded
/// into a 12..108 register and offset by the channel's coarse tune, for
/// melodic channels only, matching `StartPlayingVoice`'s octave-wrap guard)
/// combined with the waveform header's recorded base-frequency word.
fn resolve_base_freq(note: u8, coarse_tune: i16, header_base_freq: i32, is_drum: bool) -> i32 {
    let mut n = note as i32;
    if !is_drum {
        n += coarse_tune as i32;
        if n < 12 {
            n += 12 * ((23 - n) / 12);
        } else if n > 108 {
            n -= 12 * ((n - 97) / 12);
        }
    }
    (n - NOTE_PITCH_ROOT) * SEMITONE_UNITS + header_base_freq
}

/// Resolve a voice's pan: melodic voices look up bank 17 by the channel pan
/// plus the program's panpot field (clamped into the table's 0..127 range);
/// drum voices look up bank 18 directly by note.
fn resolve_pan(rom: &Rom, channel_pan: i16, program_pan: u16, note: u8, is_drum: bool) -> i16 {
    let mut cursor = if is_drum {
        rom.change_bank(bank::DRUM_PAN, note as i32)
    } else {
        let idx = (channel_pan as i32 + program_pan as i32 + 64).clamp(0, 127);
        rom.change_bank(bank::PAN_GAIN, idx)
    };
    (cursor.read_word(rom) as i16 - 64).clamp(-64, 64)
}

/// Decode a complete, self-contained short MIDI message (status byte
/// included, no running status) for [`Synth::submit_event`]'s sample-accurate
/// path. SysEx is not supported here — only channel-voice messages.
fn decode_short_message(bytes: &[u8]) -> Option<ChannelEvent> {
    let mut dec = MidiDecoder::new();
    let mut last = None;
    for &b in bytes {
        if let Some(DecodedEvent::Channel(ev)) = dec.feed(b) {
            last = Some(ev);
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK_TABLE_OFFSET: u32 = 65588;

    fn write_bank_header(data: &mut [u8], bank: u32, header: u32, record_width: u16) {
        let entry = (BANK_TABLE_OFFSET + 4 * bank) as usize;
        data[entry] = 0; // padding
        data[entry + 1] = (header & 0xFF) as u8;
        data[entry + 2] = ((header >> 8) & 0xFF) as u8;
        data[entry + 3] = ((header >> 16) & 0xFF) as u8;
        data[header as usize + 2] = (record_width & 0xFF) as u8;
        data[header as usize + 3] = (record_width >> 8) as u8;
    }

    fn write_word(data: &mut [u8], offset: usize, value: u16) {
        data[offset] = (value & 0xFF) as u8;
        data[offset + 1] = (value >> 8) as u8;
    }

    /// Build a minimal synthetic ROM: a program bank with one all-zero
    /// program record, a note-index bank mapping every note to voice 0, and
    /// a voice-index bank with a single short looping wavetable header.
    fn test_rom_bytes() -> Vec<u8> {
        let mut data = vec![0u8; crate::rom::ROM_SIZE];

        write_bank_header(&mut data, bank::PROGRAM, 0x2000, 28); // 14 words
        write_bank_header(&mut data, bank::NOTE_INDEX, 0x3000, 2); // 1 word
        write_bank_header(&mut data, bank::VOICE_INDEX, 0x4000, 10); // 5 words
        write_bank_header(&mut data, bank::PAN_GAIN, 0x5000, 2);
        write_bank_header(&mut data, bank::DRUM_PAN, 0x6000, 2);

        // program 0 record: all zero is fine except we need attack/decay
        // rates nonzero so envelopes actually move.
        let prog0 = 0x2000 + 4 + 0 * 28;
        write_word(&mut data, prog0 + 4, 0x2800); // amp_attack rescaled -> 0x28
        write_word(&mut data, prog0 + 6, 0x1400); // amp_decay -> 0x14
        write_word(&mut data, prog0 + 8, 0x4000); // amp_sustain -> 0x40
        write_word(&mut data, prog0 + 10, 0x0A00); // amp_release -> 0x0A

        // note index: every note resolves to voice_index 0
        for note in 0..128u32 {
            let entry = 0x3000 + 4 + note * 2;
            write_word(&mut data, entry as usize, 0);
        }

        // voice index 0's wavetable header: start=0, loop_start=4, end=1000
        let hdr = 0x4000 + 4;
        write_word(&mut data, hdr, 0); // wv_start low
        write_word(&mut data, hdr + 2, 0); // wv_start high
        write_word(&mut data, hdr + 4, 4); // wv_loop_start
        write_word(&mut data, hdr + 6, 1000); // wv_end
        write_word(&mut data, hdr + 8, 0); // base frequency

        data
    }

    fn playing_synth() -> Synth {
        let mut synth = Synth::new(SynthConfig::new().with_sample_rate(SampleRate::Hz44100));
        synth.try_set_rom(test_rom_bytes()).unwrap();
        synth.playback_start();
        synth
    }

    #[test]
    fn empty_stream_renders_silence() {
        let mut synth = playing_synth();
        let mut left = vec![1.0; 64];
        let mut right = vec![1.0; 64];
        {
            let mut outs: Vec<&mut [f64]> = vec![&mut left, &mut right];
            synth.render_block(&mut outs, 64);
        }
        assert!(left.iter().all(|&s| s == 0.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn note_on_allocates_a_voice() {
        let mut synth = playing_synth();
        synth.note_on(0, 60, 100);
        assert_eq!(synth.active_voice_count(), 1);
    }

    #[test]
    fn note_on_then_off_eventually_frees_the_voice() {
        let mut synth = playing_synth();
        synth.note_on(0, 60, 100);
        synth.note_off(0, 60);
        let mut left = vec![0.0; 256];
        let mut right = vec![0.0; 256];
        for _ in 0..200 {
            let mut outs: Vec<&mut [f64]> = vec![&mut left, &mut right];
            synth.render_block(&mut outs, 256);
        }
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn all_sounds_off_kills_voices_immediately() {
        let mut synth = playing_synth();
        synth.note_on(0, 60, 100);
        synth.control_change(0, 120, 127);
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn all_notes_off_releases_rather_than_kills() {
        let mut synth = playing_synth();
        synth.note_on(0, 60, 100);
        synth.control_change(0, 123, 127);
        assert_eq!(synth.voices.voice(0).phase, VoicePhase::Release);
    }

    #[test]
    fn gm_reset_frees_all_voices_and_resets_program() {
        let mut synth = playing_synth();
        synth.note_on(0, 60, 100);
        synth.channels[0].volume = 10;
        synth.global_reset("GM");
        assert_eq!(synth.active_voice_count(), 0);
        assert_eq!(synth.channels[0].volume, 100);
    }

    #[test]
    fn unrecognized_frequency_code_is_rejected() {
        let mut synth = Synth::new(SynthConfig::new());
        assert_eq!(
            synth.try_set_frequency(99),
            Err(SynthError::BadParameter { code: 99 })
        );
    }

    #[test]
    fn polyphony_code_maps_to_documented_counts() {
        let mut synth = Synth::new(SynthConfig::new());
        synth.try_set_polyphony(0x12).unwrap();
        assert_eq!(synth.requested_polyphony, 48);
    }

    #[test]
    fn layer_enable_bit_allocates_a_second_voice() {
        let mut data = test_rom_bytes();
        let prog0 = 0x2000 + 4;
        write_word(&mut data, prog0 + 2, 0x8000); // base_pitch: set layer-enable bit
        // Layer 1's record sits right after layer 0's (both read from one
        // cursor by `ProgramData::load_layer_pair`); give it distinct
        // envelope rates so it's clearly a separate record.
        let prog1 = prog0 + 28;
        write_word(&mut data, prog1 + 4, 0x2800);
        write_word(&mut data, prog1 + 6, 0x1400);
        write_word(&mut data, prog1 + 8, 0x4000);
        write_word(&mut data, prog1 + 10, 0x0A00);

        let mut synth = Synth::new(SynthConfig::new().with_sample_rate(SampleRate::Hz44100));
        synth.try_set_rom(data).unwrap();
        synth.playback_start();
        synth.program_change(0, 0);

        synth.note_on(0, 60, 100);
        assert_eq!(synth.active_voice_count(), 2);
        assert_eq!(synth.voices.voice(0).layer, 0);
        assert_eq!(synth.voices.voice(1).layer, 1);
    }

    #[test]
    fn no_layer_enable_bit_allocates_one_voice() {
        let mut synth = playing_synth();
        synth.note_on(0, 60, 100);
        assert_eq!(synth.active_voice_count(), 1);
        assert_eq!(synth.voices.voice(0).layer, 0);
    }

    #[test]
    fn submit_event_applies_at_the_right_frame() {
        let mut synth = playing_synth();
        synth.submit_event(&[0x90, 60, 100], 10);
        let mut left = vec![0.0; 32];
        let mut right = vec![0.0; 32];
        {
            let mut outs: Vec<&mut [f64]> = vec![&mut left, &mut right];
            synth.render_block(&mut outs, 32);
        }
        assert_eq!(synth.active_voice_count(), 1);
    }
}
