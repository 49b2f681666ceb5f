//! Reverberation unit
//!
//! The reverse reverb engine treats its reverb as an opaque, 100%-wet block
//! processor with a single `decay` setting. [`ReverbUnit`] is that seam;
//! [`Freeverb`] is the default implementation:
//! - 8 parallel lowpass-feedback comb filters per channel
//! - 4 series allpass filters per channel for diffusion
//! - comb feedback derived from the decay time (RT60)
//!
//! Predelay and wet/dry mixing belong to the caller.

use tracing::debug;

use crate::engine::AudioBuffer;
use crate::error::{FxError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Reference sample rate for the tuning tables
const REFERENCE_SAMPLE_RATE: f32 = 44100.0;

/// Comb filter delays at 44100 Hz (8 filters)
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delays at 44100 Hz (4 filters)
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Right channel offset in samples
const STEREO_SPREAD: usize = 23;

const ALLPASS_GAIN: f32 = 0.5;

/// Input attenuation ahead of the comb bank
const INPUT_GAIN: f32 = 0.015;

/// Upper bound on comb feedback so the tank always decays
const MAX_FEEDBACK: f32 = 0.98;

/// Fixed high-frequency damping in the comb feedback path
const DAMPING: f32 = 0.2;

/// Shortest accepted decay in seconds
pub const MIN_DECAY_SECS: f32 = 0.1;

/// Longest accepted decay in seconds
pub const MAX_DECAY_SECS: f32 = 20.0;

/// Default decay in seconds
pub const DEFAULT_DECAY_SECS: f32 = 4.0;

// ============================================================================
// ReverbUnit trait
// ============================================================================

/// An opaque reverberation stage
pub trait ReverbUnit: Send + std::fmt::Debug {
    /// Replace the buffer with the reverb's wet output
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Set the tail length in seconds (clamped to [0.1, 20])
    fn set_decay(&mut self, seconds: f32);

    fn decay(&self) -> f32;

    /// Resize internal state for a new sample rate
    fn prepare(&mut self, sample_rate: u32);

    /// Clear the tail
    fn reset(&mut self);

    /// Release internal buffers
    ///
    /// Returns [`FxError::Disposed`] if already released.
    fn dispose(&mut self) -> Result<()>;
}

// ============================================================================
// Filter Components
// ============================================================================

/// Lowpass-feedback comb filter
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
    feedback: f32,
}

impl CombFilter {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
            filter_state: 0.0,
            feedback: 0.5,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_state = output * (1.0 - DAMPING) + self.filter_state * DAMPING;
        self.buffer[self.pos] = input + self.filter_state * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn delay(&self) -> usize {
        self.buffer.len()
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.pos = 0;
    }
}

/// Schroeder allpass for diffusion
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let output = delayed - ALLPASS_GAIN * input;
        self.buffer[self.pos] = input + ALLPASS_GAIN * output;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// One channel of the tank
#[derive(Debug, Clone)]
struct Tank {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl Tank {
    fn new(sample_rate: u32, spread: usize) -> Self {
        let scale = sample_rate as f32 / REFERENCE_SAMPLE_RATE;
        let scaled = |delay: usize| (((delay + spread) as f32 * scale) as usize).max(1);
        Self {
            combs: COMB_DELAYS.iter().map(|&d| CombFilter::new(scaled(d))).collect(),
            allpasses: ALLPASS_DELAYS
                .iter()
                .map(|&d| AllpassFilter::new(scaled(d)))
                .collect(),
        }
    }

    /// Set each comb's feedback so it falls 60 dB over `decay` seconds
    fn set_decay(&mut self, decay: f32, sample_rate: u32) {
        for comb in &mut self.combs {
            let delay_secs = comb.delay() as f32 / sample_rate as f32;
            comb.feedback = 10f32.powf(-3.0 * delay_secs / decay).min(MAX_FEEDBACK);
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let mut out = self.combs.iter_mut().map(|c| c.process(input)).sum::<f32>();
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::clear);
        self.allpasses.iter_mut().for_each(AllpassFilter::clear);
    }
}

// ============================================================================
// Freeverb
// ============================================================================

/// Freeverb-style stereo reverb with a decay-time control
#[derive(Debug, Clone)]
pub struct Freeverb {
    left: Tank,
    right: Tank,
    decay: f32,
    sample_rate: u32,
    disposed: bool,
}

impl Freeverb {
    pub fn new(decay: f32, sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        let mut reverb = Self {
            left: Tank::new(sample_rate, 0),
            right: Tank::new(sample_rate, STEREO_SPREAD),
            decay: clamp_decay(decay),
            sample_rate,
            disposed: false,
        };
        reverb.update_feedback();
        reverb
    }

    fn update_feedback(&mut self) {
        self.left.set_decay(self.decay, self.sample_rate);
        self.right.set_decay(self.decay, self.sample_rate);
    }
}

impl Default for Freeverb {
    fn default() -> Self {
        Self::new(DEFAULT_DECAY_SECS, crate::engine::DEFAULT_SAMPLE_RATE)
    }
}

fn clamp_decay(seconds: f32) -> f32 {
    if seconds.is_finite() {
        seconds.clamp(MIN_DECAY_SECS, MAX_DECAY_SECS)
    } else {
        DEFAULT_DECAY_SECS
    }
}

impl ReverbUnit for Freeverb {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.disposed {
            buffer.clear();
            return;
        }
        let stereo = buffer.num_channels() >= 2;
        for i in 0..buffer.num_samples() {
            let (l, r) = buffer.frame(i);
            let input = (l + r) * 0.5 * INPUT_GAIN;
            let wet_left = self.left.process(input);
            let wet_right = self.right.process(input);
            if stereo {
                buffer.set_frame(i, wet_left, wet_right);
            } else {
                buffer.channel_mut(0)[i] = wet_left;
            }
        }
    }

    fn set_decay(&mut self, seconds: f32) {
        self.decay = clamp_decay(seconds);
        self.update_feedback();
    }

    fn decay(&self) -> f32 {
        self.decay
    }

    fn prepare(&mut self, sample_rate: u32) {
        let sample_rate = sample_rate.max(1);
        if self.disposed || sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.left = Tank::new(sample_rate, 0);
        self.right = Tank::new(sample_rate, STEREO_SPREAD);
        self.update_feedback();
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
    }

    fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Err(FxError::Disposed {
                component: "freeverb".to_string(),
            });
        }
        self.disposed = true;
        self.left = Tank {
            combs: Vec::new(),
            allpasses: Vec::new(),
        };
        self.right = self.left.clone();
        debug!("freeverb released");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
