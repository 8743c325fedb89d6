//! Construction-time configuration for a [`crate::synth::Synth`].
//!
//! Mirrors the reference workspace's `PluginConfig` pattern: a small, `const
//! fn`-constructible builder for the handful of choices that make sense to
//! fix at construction rather than thread through a runtime `set_*` call.

/// Sample rates the original device firmware recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRate {
    Hz11025,
    Hz16538,
    Hz22050,
    Hz44100,
    Hz48000,
}

impl SampleRate {
    pub const fn hz(self) -> u32 {
        match self {
            SampleRate::Hz11025 => 11025,
            SampleRate::Hz16538 => 16538,
            SampleRate::Hz22050 => 22050,
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
        }
    }

    /// Internal envelope-phase quantum, in frames, for this rate.
    pub const fn output_size_para(self) -> u32 {
        match self {
            SampleRate::Hz11025 => 64,
            SampleRate::Hz16538 => 96,
            SampleRate::Hz22050 => 128,
            SampleRate::Hz44100 => 256,
            SampleRate::Hz48000 => 384,
        }
    }
}

/// Reverb configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverbMode {
    Off,
    /// Output taps shifted right by 1 ("standard" reverb).
    Standard,
    /// Output taps shifted right by 0 ("high" reverb, more headroom).
    High,
}

/// Construction-time configuration for a [`crate::synth::Synth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthConfig {
    pub(crate) sample_rate: SampleRate,
    pub(crate) polyphony: u32,
    pub(crate) velocity_curve: u32,
    pub(crate) reverb: ReverbMode,
}

impl SynthConfig {
    /// Default configuration: 44.1 kHz, 24-voice polyphony, velocity curve 6
    /// (the device firmware's own default), reverb off.
    pub const fn new() -> Self {
        SynthConfig {
            sample_rate: SampleRate::Hz44100,
            polyphony: 24,
            velocity_curve: 6,
            reverb: ReverbMode::Off,
        }
    }

    pub const fn with_sample_rate(mut self, rate: SampleRate) -> Self {
        self.sample_rate = rate;
        self
    }

    pub const fn with_polyphony(mut self, polyphony: u32) -> Self {
        self.polyphony = polyphony;
        self
    }

    pub const fn with_velocity_curve(mut self, curve: u32) -> Self {
        self.velocity_curve = curve;
        self
    }

    pub const fn with_reverb(mut self, reverb: ReverbMode) -> Self {
        self.reverb = reverb;
        self
    }
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self::new()
    }
}
