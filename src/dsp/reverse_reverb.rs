//! Reverse Reverb Engine
//!
//! Captures a short window of input, reverses it and plays it back through
//! a predelay and a reverberation unit, producing the "swell into the note"
//! effect.
//!
//! ```text
//! Idle -> Recording -> Reversing -> Playing -> Idle
//!   \________________ dispose() ________________/-> Disabled
//! ```
//!
//! Triggers come from [`ReverseReverbEngine::trigger_reverse`] or from the
//! monitor, which checks the RMS of the input every `monitor_interval_ms`.
//! Either way a trigger is rejected while a capture is in flight or while
//! the cooldown since the last accepted trigger has not elapsed.
//!
//! Recording never blocks: the capture window is counted in samples as
//! blocks arrive through [`EffectUnit::process`]. A finished capture starts
//! its playback voice on the following block.

use std::fmt;

use serde_json::{json, Value};
use tracing::{debug, warn, Span};

use crate::config::ReverseReverbConfig;
use crate::dsp::effect::{ensure_live, number, EffectUnit, UnitParams};
use crate::dsp::ramp::RampedParam;
use crate::dsp::reverb::{Freeverb, ReverbUnit};
use crate::engine::{
    dispose_isolated, wire, AudioBuffer, AudioNode, GainNode, RoutingNode, SharedClock,
};
use crate::error::{FxError, Result};
use crate::impl_unit_common;

// ============================================================================
// Constants
// ============================================================================

/// Fade applied at the start and end of every playback voice
pub const FADE_SECS: f32 = 0.01;

/// A capture must contain at least one sample above this magnitude
pub const SILENCE_THRESHOLD: f32 = 0.001;

pub const MIN_PREDELAY_MS: f32 = 0.0;
pub const MAX_PREDELAY_MS: f32 = 100.0;

pub const MIN_RECORD_LENGTH_SECS: f32 = 0.1;
pub const MAX_RECORD_LENGTH_SECS: f32 = 10.0;

const COMPONENT: &str = "reverse reverb";

// ============================================================================
// State
// ============================================================================

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Recording,
    Reversing,
    Playing,
    /// Terminal; reached only through `dispose`
    Disabled,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Recording => "recording",
            EngineState::Reversing => "reversing",
            EngineState::Playing => "playing",
            EngineState::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// Reentrancy guard for triggers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerState {
    pub is_recording: bool,
    /// Clock time of the last accepted trigger
    pub last_trigger_ms: Option<u64>,
    pub cooldown_ms: u64,
}

impl TriggerState {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            is_recording: false,
            last_trigger_ms: None,
            cooldown_ms,
        }
    }

    /// Decide whether a trigger at `now_ms` may start a capture
    pub fn check(&self, now_ms: u64) -> TriggerOutcome {
        if self.is_recording {
            return TriggerOutcome::RejectedRecording;
        }
        match self.last_trigger_ms {
            Some(last) if now_ms.saturating_sub(last) < self.cooldown_ms => {
                TriggerOutcome::RejectedCooldown
            }
            _ => TriggerOutcome::Started,
        }
    }
}

/// Result of a trigger attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// A capture is already in flight
    RejectedRecording,
    /// Too soon after the last accepted trigger
    RejectedCooldown,
    /// The engine has been disposed
    RejectedDisabled,
}

impl TriggerOutcome {
    pub fn is_started(self) -> bool {
        self == TriggerOutcome::Started
    }
}

/// Check that a capture is worth playing back
///
/// Fails with [`FxError::CaptureFailed`] if the buffer is empty or no sample
/// in any channel exceeds [`SILENCE_THRESHOLD`].
pub fn validate_capture(buffer: &AudioBuffer) -> Result<()> {
    if buffer.is_empty() {
        return Err(FxError::CaptureFailed {
            reason: "empty recording".to_string(),
        });
    }
    if !buffer.has_signal_above(SILENCE_THRESHOLD) {
        return Err(FxError::CaptureFailed {
            reason: "silent recording".to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Capture and playback
// ============================================================================

/// Input being accumulated for one trigger
#[derive(Debug)]
struct Capture {
    channels: [Vec<f32>; 2],
    target_len: usize,
}

impl Capture {
    fn new(target_len: usize) -> Self {
        Self {
            channels: [Vec::with_capacity(target_len), Vec::with_capacity(target_len)],
            target_len,
        }
    }

    /// Append frames from `buffer` until the window is full
    fn append(&mut self, buffer: &AudioBuffer) {
        let take = self.remaining().min(buffer.num_samples());
        for i in 0..take {
            let (left, right) = buffer.frame(i);
            self.channels[0].push(left);
            self.channels[1].push(right);
        }
    }

    fn remaining(&self) -> usize {
        self.target_len.saturating_sub(self.channels[0].len())
    }

    fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    fn into_buffer(self, sample_rate: u32) -> Result<AudioBuffer> {
        let [left, right] = self.channels;
        AudioBuffer::from_channels(vec![left, right], sample_rate)
    }
}

/// One transient playback of a reversed capture
#[derive(Debug)]
pub struct PlaybackVoice {
    buffer: AudioBuffer,
    position: usize,
    source: RoutingNode,
    fade: GainNode,
    fade_len: usize,
    fading_out: bool,
    sample_rate: f32,
}

impl PlaybackVoice {
    /// Start a voice with a 10 ms fade-in
    pub fn new(buffer: AudioBuffer, sample_rate: u32) -> Self {
        let mut source = RoutingNode::new("reverse_reverb.voice");
        let mut fade = GainNode::new("reverse_reverb.fade", 0.0, sample_rate as f32);
        wire(COMPONENT, &mut source, &fade);
        fade.gain_mut().ramp_to(1.0, FADE_SECS);
        Self {
            buffer,
            position: 0,
            source,
            fade,
            fade_len: (FADE_SECS * sample_rate as f32).round() as usize,
            fading_out: false,
            sample_rate: sample_rate as f32,
        }
    }

    /// Next faded frame, or `None` once the buffer is exhausted
    pub fn next_frame(&mut self) -> Option<(f32, f32)> {
        if self.is_finished() {
            return None;
        }
        let remaining = self.buffer.num_samples() - self.position;
        if !self.fading_out && remaining <= self.fade_len {
            // Land on zero exactly at the last sample
            self.fade
                .gain_mut()
                .ramp_to(0.0, remaining as f32 / self.sample_rate);
            self.fading_out = true;
        }
        let level = self.fade.gain_mut().next();
        let (left, right) = self.buffer.frame(self.position);
        self.position += 1;
        Some((left * level, right * level))
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.buffer.num_samples() || self.fade.is_disposed()
    }

    pub fn is_fading_out(&self) -> bool {
        self.fading_out
    }

    /// Render up to one fade length of what is left, ramped linearly to zero
    ///
    /// Used when the voice is cut short so it stops without a click.
    pub fn release_tail(&mut self) -> AudioBuffer {
        let remaining = self.buffer.num_samples().saturating_sub(self.position);
        let len = if self.fade.is_disposed() {
            0
        } else {
            self.fade_len.min(remaining)
        };
        let mut tail = AudioBuffer::with_sample_rate(len, 2, self.sample_rate as u32);
        for i in 0..len {
            let Some((left, right)) = self.next_frame() else {
                break;
            };
            let level = 1.0 - (i + 1) as f32 / len as f32;
            tail.set_frame(i, left * level, right * level);
        }
        tail
    }

    /// Release the buffer and both nodes; returns how many nodes were released
    pub fn dispose(&mut self) -> usize {
        self.buffer = AudioBuffer::default();
        dispose_isolated(COMPONENT, &mut [&mut self.source, &mut self.fade])
    }
}

/// Stereo delay line with a ramped, fractional delay in milliseconds
#[derive(Debug)]
struct PredelayLine {
    left: Vec<f32>,
    right: Vec<f32>,
    write_pos: usize,
    delay_ms: RampedParam,
    sample_rate: f32,
}

impl PredelayLine {
    fn new(delay_ms: f32, sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1) as f32;
        let capacity = Self::capacity(sample_rate);
        Self {
            left: vec![0.0; capacity],
            right: vec![0.0; capacity],
            write_pos: 0,
            delay_ms: RampedParam::new(delay_ms, sample_rate)
                .with_range(MIN_PREDELAY_MS, MAX_PREDELAY_MS),
            sample_rate,
        }
    }

    fn capacity(sample_rate: f32) -> usize {
        (MAX_PREDELAY_MS / 1000.0 * sample_rate).ceil() as usize + 2
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        let sample_rate = sample_rate.max(1) as f32;
        let capacity = Self::capacity(sample_rate);
        self.sample_rate = sample_rate;
        self.delay_ms.set_sample_rate(sample_rate);
        self.left = vec![0.0; capacity];
        self.right = vec![0.0; capacity];
        self.write_pos = 0;
    }

    #[inline]
    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let len = self.left.len();
        self.left[self.write_pos] = left;
        self.right[self.write_pos] = right;

        let delay = self.delay_ms.next() / 1000.0 * self.sample_rate;
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;
        let a = (self.write_pos + len - whole) % len;
        let b = (a + len - 1) % len;
        let out_left = self.left[a] + frac * (self.left[b] - self.left[a]);
        let out_right = self.right[a] + frac * (self.right[b] - self.right[a]);

        self.write_pos = (self.write_pos + 1) % len;
        (out_left, out_right)
    }

    fn clear(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
        self.write_pos = 0;
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Capture, reverse and replay engine with an auto-trigger monitor
pub struct ReverseReverbEngine {
    unit: UnitParams,
    state: EngineState,
    trigger: TriggerState,
    clock: SharedClock,
    reverb: Box<dyn ReverbUnit>,
    capture: Option<Capture>,
    voice: Option<PlaybackVoice>,
    /// Faded remainder of a preempted voice, mixed ahead of the predelay
    release_tail: AudioBuffer,
    release_pos: usize,
    predelay: PredelayLine,
    dry_gain: GainNode,
    wet_gain: GainNode,
    output: RoutingNode,
    wet: f32,
    wet_bus: AudioBuffer,
    amplitude_threshold: f32,
    record_length_secs: f32,
    monitor_interval_ms: u64,
    last_monitor_ms: u64,
    monitor_sum_sq: f64,
    monitor_count: usize,
    voices_started: u64,
    sample_rate: u32,
    span: Span,
}

impl fmt::Debug for ReverseReverbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReverseReverbEngine")
            .field("id", &self.unit.id)
            .field("state", &self.state)
            .field("trigger", &self.trigger)
            .field("has_voice", &self.voice.is_some())
            .field("wet", &self.wet)
            .finish()
    }
}

impl ReverseReverbEngine {
    /// Create an engine with default settings around `reverb`
    pub fn new(reverb: Box<dyn ReverbUnit>, clock: SharedClock, sample_rate: u32) -> Self {
        Self::from_config(&ReverseReverbConfig::default(), reverb, clock, sample_rate)
    }

    /// Create an engine with the default [`Freeverb`]
    pub fn with_default_reverb(
        config: &ReverseReverbConfig,
        clock: SharedClock,
        sample_rate: u32,
    ) -> Self {
        let reverb = Box::new(Freeverb::new(config.decay_secs, sample_rate));
        Self::from_config(config, reverb, clock, sample_rate)
    }

    pub fn from_config(
        config: &ReverseReverbConfig,
        mut reverb: Box<dyn ReverbUnit>,
        clock: SharedClock,
        sample_rate: u32,
    ) -> Self {
        let sample_rate = sample_rate.max(1);
        let wet = clamp_unit(config.wet, 0.5);
        reverb.prepare(sample_rate);
        reverb.set_decay(config.decay_secs);

        let mut dry_gain = GainNode::new("reverse_reverb.dry", 1.0 - wet, sample_rate as f32);
        let mut wet_gain = GainNode::new("reverse_reverb.wet", wet, sample_rate as f32);
        let output = RoutingNode::new("reverse_reverb.output");
        wire(COMPONENT, &mut dry_gain, &output);
        wire(COMPONENT, &mut wet_gain, &output);

        let now = clock.now_ms();
        Self {
            unit: UnitParams::default(),
            state: EngineState::Idle,
            trigger: TriggerState::new(config.cooldown_ms),
            clock,
            reverb,
            capture: None,
            voice: None,
            release_tail: AudioBuffer::default(),
            release_pos: 0,
            predelay: PredelayLine::new(config.predelay_ms, sample_rate),
            dry_gain,
            wet_gain,
            output,
            wet,
            wet_bus: AudioBuffer::with_sample_rate(0, 2, sample_rate),
            amplitude_threshold: clamp_threshold(config.amplitude_threshold),
            record_length_secs: clamp_record_length(config.record_length_secs),
            monitor_interval_ms: config.monitor_interval_ms.max(1),
            last_monitor_ms: now,
            monitor_sum_sq: 0.0,
            monitor_count: 0,
            voices_started: 0,
            sample_rate,
            span: tracing::debug_span!("reverse_reverb"),
        }
    }

    /// Record this engine's events under `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    // ------------------------------------------------------------------------
    // Triggering
    // ------------------------------------------------------------------------

    /// Start a capture if the reentrancy guard allows it
    pub fn trigger_reverse(&mut self) -> TriggerOutcome {
        let _enter = self.span.enter();
        if self.unit.disposed {
            return TriggerOutcome::RejectedDisabled;
        }
        let now = self.clock.now_ms();
        let outcome = self.trigger.check(now);
        if !outcome.is_started() {
            debug!(?outcome, state = %self.state, "trigger rejected");
            return outcome;
        }

        let target_len = (self.record_length_secs * self.sample_rate as f32).round() as usize;
        self.trigger.last_trigger_ms = Some(now);
        self.trigger.is_recording = true;
        self.capture = Some(Capture::new(target_len));
        self.state = EngineState::Recording;
        debug!(now, target_len, "recording started");
        outcome
    }

    /// Run the periodic auto-trigger check
    ///
    /// Does nothing until `monitor_interval_ms` has passed since the last
    /// check. Returns the trigger outcome when the measured RMS exceeded the
    /// amplitude threshold.
    pub fn poll_monitor(&mut self) -> Option<TriggerOutcome> {
        if self.unit.disposed {
            return None;
        }
        let now = self.clock.now_ms();
        if now.saturating_sub(self.last_monitor_ms) < self.monitor_interval_ms {
            return None;
        }
        self.last_monitor_ms = now;

        let rms = if self.monitor_count == 0 {
            0.0
        } else {
            (self.monitor_sum_sq / self.monitor_count as f64).sqrt() as f32
        };
        self.monitor_sum_sq = 0.0;
        self.monitor_count = 0;

        if rms > self.amplitude_threshold && !self.trigger.is_recording {
            Some(self.trigger_reverse())
        } else {
            None
        }
    }

    fn finish_recording(&mut self) {
        let Some(capture) = self.capture.take() else {
            return;
        };
        self.trigger.is_recording = false;

        let span = self.span.clone();
        let _enter = span.enter();
        let captured = capture
            .into_buffer(self.sample_rate)
            .and_then(|buffer| validate_capture(&buffer).map(|()| buffer));

        match captured {
            Ok(buffer) => {
                self.state = EngineState::Reversing;
                let reversed = buffer.reversed();
                debug!(samples = reversed.num_samples(), "capture reversed");
                self.start_playback(reversed);
            }
            Err(err) => {
                warn!(%err, "capture discarded");
                self.state = if self.voice.is_some() {
                    EngineState::Playing
                } else {
                    EngineState::Idle
                };
            }
        }
    }

    /// Replace any existing voice with one playing `buffer`
    ///
    /// A preempted voice is faded out over [`FADE_SECS`] on the wet path; its
    /// nodes are released before the new voice is built.
    fn start_playback(&mut self, buffer: AudioBuffer) {
        if let Some(mut previous) = self.voice.take() {
            self.release_tail = previous.release_tail();
            self.release_pos = 0;
            let released = previous.dispose();
            debug!(
                released,
                tail = self.release_tail.num_samples(),
                "previous voice preempted"
            );
        }
        self.voice = Some(PlaybackVoice::new(buffer, self.sample_rate));
        self.voices_started += 1;
        self.state = EngineState::Playing;
        debug!(voices_started = self.voices_started, "playback started");
    }

    fn release_voice(&mut self) {
        if let Some(mut voice) = self.voice.take() {
            voice.dispose();
            if self.state == EngineState::Playing {
                self.state = EngineState::Idle;
            }
            let _enter = self.span.enter();
            debug!("voice released");
        }
    }

    // ------------------------------------------------------------------------
    // Controls
    // ------------------------------------------------------------------------

    /// Ramp the wet/dry mix to `wet` (clamped to [0, 1]) over the unit ramp time
    pub fn set_wet(&mut self, wet: f32) {
        if !wet.is_finite() {
            return;
        }
        self.wet = wet.clamp(0.0, 1.0);
        self.wet_gain
            .gain_mut()
            .ramp_to(self.wet, self.unit.ramp_seconds);
        self.dry_gain
            .gain_mut()
            .ramp_to(1.0 - self.wet, self.unit.ramp_seconds);
    }

    /// Ramp the predelay to `ms` (clamped to [0, 100]) over the unit ramp time
    pub fn set_predelay(&mut self, ms: f32) {
        self.predelay.delay_ms.ramp_to(ms, self.unit.ramp_seconds);
    }

    /// Forward a decay time to the reverberation unit
    pub fn set_decay(&mut self, seconds: f32) {
        self.reverb.set_decay(seconds);
    }

    /// RMS level above which the monitor triggers
    pub fn set_threshold(&mut self, threshold: f32) {
        if threshold.is_finite() {
            self.amplitude_threshold = clamp_threshold(threshold);
        }
    }

    pub fn set_cooldown_ms(&mut self, ms: u64) {
        self.trigger.cooldown_ms = ms;
    }

    /// Capture window for the next trigger, clamped to [0.1, 10] s
    pub fn set_record_length(&mut self, seconds: f32) {
        if seconds.is_finite() {
            self.record_length_secs = clamp_record_length(seconds);
        }
    }

    // ------------------------------------------------------------------------
    // Telemetry
    // ------------------------------------------------------------------------

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn trigger_state(&self) -> &TriggerState {
        &self.trigger
    }

    pub fn is_recording(&self) -> bool {
        self.trigger.is_recording
    }

    pub fn has_voice(&self) -> bool {
        self.voice.is_some()
    }

    /// Number of live playback voices (never more than one)
    pub fn voice_count(&self) -> usize {
        usize::from(self.voice.is_some())
    }

    /// Total voices started over the engine's lifetime
    pub fn voices_started(&self) -> u64 {
        self.voices_started
    }

    pub fn wet(&self) -> f32 {
        self.wet
    }

    /// Predelay the line is settling on, in ms
    pub fn predelay_ms(&self) -> f32 {
        self.predelay.delay_ms.target()
    }

    pub fn decay(&self) -> f32 {
        self.reverb.decay()
    }

    pub fn amplitude_threshold(&self) -> f32 {
        self.amplitude_threshold
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.trigger.cooldown_ms
    }

    pub fn record_length_secs(&self) -> f32 {
        self.record_length_secs
    }

    /// Whether a preempted voice is still fading out
    pub fn is_releasing(&self) -> bool {
        self.release_pos < self.release_tail.num_samples()
    }

    fn next_release_frame(&mut self) -> Option<(f32, f32)> {
        if !self.is_releasing() {
            return None;
        }
        let frame = self.release_tail.frame(self.release_pos);
        self.release_pos += 1;
        if !self.is_releasing() {
            self.clear_release_tail();
        }
        Some(frame)
    }

    fn clear_release_tail(&mut self) {
        self.release_tail = AudioBuffer::default();
        self.release_pos = 0;
    }

    fn accumulate_monitor(&mut self, buffer: &AudioBuffer) {
        for ch in 0..buffer.num_channels() {
            for &sample in buffer.channel(ch) {
                if sample.is_finite() {
                    self.monitor_sum_sq += (sample as f64) * (sample as f64);
                }
            }
        }
        self.monitor_count += buffer.num_samples() * buffer.num_channels();
    }
}

fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

fn clamp_threshold(threshold: f32) -> f32 {
    clamp_unit(threshold, 0.01)
}

fn clamp_record_length(seconds: f32) -> f32 {
    if seconds.is_nan() {
        return 2.0;
    }
    seconds.clamp(MIN_RECORD_LENGTH_SECS, MAX_RECORD_LENGTH_SECS)
}

impl EffectUnit for ReverseReverbEngine {
    impl_unit_common!("reverseReverb");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.unit.disposed {
            return;
        }
        let num_samples = buffer.num_samples();

        self.accumulate_monitor(buffer);
        if let Some(capture) = self.capture.as_mut() {
            capture.append(buffer);
        }

        // Wet path: voice -> predelay -> reverb
        if self.wet_bus.num_samples() != num_samples {
            self.wet_bus = AudioBuffer::with_sample_rate(num_samples, 2, self.sample_rate);
        }
        for i in 0..num_samples {
            let (mut left, mut right) = self
                .voice
                .as_mut()
                .and_then(PlaybackVoice::next_frame)
                .unwrap_or((0.0, 0.0));
            if let Some((tail_left, tail_right)) = self.next_release_frame() {
                left += tail_left;
                right += tail_right;
            }
            let (left, right) = self.predelay.process(left, right);
            self.wet_bus.set_frame(i, left, right);
        }
        self.reverb.process(&mut self.wet_bus);

        for i in 0..num_samples {
            let dry = self.dry_gain.gain_mut().next();
            let wet = self.wet_gain.gain_mut().next();
            let (in_left, in_right) = buffer.frame(i);
            let (wet_left, wet_right) = self.wet_bus.frame(i);
            let left = in_left * dry + wet_left * wet;
            let right = in_right * dry + wet_right * wet;
            buffer.set_frame(
                i,
                if left.is_finite() { left } else { 0.0 },
                if right.is_finite() { right } else { 0.0 },
            );
        }

        if self.voice.as_ref().is_some_and(PlaybackVoice::is_finished) {
            self.release_voice();
        }
        if self.capture.as_ref().is_some_and(Capture::is_complete) {
            self.finish_recording();
        }
        self.poll_monitor();
    }

    fn prepare(&mut self, sample_rate: u32, max_block_size: usize) {
        let sample_rate = sample_rate.max(1);
        self.sample_rate = sample_rate;
        self.reverb.prepare(sample_rate);
        self.predelay.set_sample_rate(sample_rate);
        self.dry_gain.gain_mut().set_sample_rate(sample_rate as f32);
        self.wet_gain.gain_mut().set_sample_rate(sample_rate as f32);
        self.wet_bus = AudioBuffer::with_sample_rate(max_block_size, 2, sample_rate);
    }

    fn reset(&mut self) {
        if self.unit.disposed {
            return;
        }
        self.release_voice();
        self.clear_release_tail();
        self.capture = None;
        self.trigger.is_recording = false;
        self.state = EngineState::Idle;
        self.predelay.clear();
        self.reverb.reset();
        self.monitor_sum_sq = 0.0;
        self.monitor_count = 0;
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> Result<()> {
        ensure_live(&self.unit, "reverseReverb")?;
        let v = number(name, value)?;
        match name {
            "wet" => self.set_wet(v),
            "predelay" => self.set_predelay(v),
            "decay" => self.set_decay(v),
            "threshold" => self.set_threshold(v),
            "cooldown" => self.set_cooldown_ms(v.max(0.0) as u64),
            "recordLength" | "record_length" => self.set_record_length(v),
            _ => {
                return Err(FxError::UnknownSelector {
                    kind: "reverseReverb parameter",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn get_params(&self) -> Value {
        json!({
            "wet": self.wet,
            "predelay": self.predelay_ms(),
            "decay": self.decay(),
            "threshold": self.amplitude_threshold,
            "cooldown": self.trigger.cooldown_ms,
            "recordLength": self.record_length_secs,
            "state": self.state.to_string(),
        })
    }

    fn dispose(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.unit.disposed {
            debug!("reverse reverb already disposed");
            return;
        }
        self.unit.disposed = true;
        self.state = EngineState::Disabled;
        self.trigger.is_recording = false;
        self.capture = None;
        self.monitor_sum_sq = 0.0;
        self.monitor_count = 0;

        self.clear_release_tail();
        let mut released = self.voice.take().map_or(0, |mut voice| voice.dispose());
        released += dispose_isolated(
            COMPONENT,
            &mut [&mut self.dry_gain, &mut self.wet_gain, &mut self.output],
        );
        if let Err(err) = self.reverb.dispose() {
            warn!(%err, "reverb dispose failed");
        }
        self.wet_bus = AudioBuffer::default();
        debug!(released, "reverse reverb disposed");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ManualClock;
    use approx::assert_abs_diff_eq;
    use serde_json::json;

    const SR: u32 = 8000;

    fn engine(clock: &ManualClock, record_length_secs: f32) -> ReverseReverbEngine {
        let config = ReverseReverbConfig {
            record_length_secs,
            ..ReverseReverbConfig::default()
        };
        ReverseReverbEngine::with_default_reverb(&config, clock.shared(), SR)
    }

    fn constant(value: f32, len: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::with_sample_rate(len, 2, SR);
        for ch in 0..2 {
            buffer.channel_mut(ch).fill(value);
        }
        buffer
    }

    fn ramp(len: usize) -> AudioBuffer {
        let samples: Vec<f32> = (0..len).map(|i| (i + 1) as f32 / len as f32).collect();
        AudioBuffer::from_channels(vec![samples.clone(), samples], SR).unwrap()
    }

    #[test]
    fn test_validate_capture() {
        assert!(matches!(
            validate_capture(&AudioBuffer::default()),
            Err(FxError::CaptureFailed { .. })
        ));
        assert!(validate_capture(&constant(0.0005, 10)).is_err());
        assert!(validate_capture(&constant(0.01, 10)).is_ok());
    }

    #[test]
    fn test_trigger_state_guard() {
        let mut state = TriggerState::new(3000);
        assert_eq!(state.check(0), TriggerOutcome::Started);
        state.last_trigger_ms = Some(1000);
        assert_eq!(state.check(3999), TriggerOutcome::RejectedCooldown);
        assert_eq!(state.check(4000), TriggerOutcome::Started);
        state.is_recording = true;
        assert_eq!(state.check(10_000), TriggerOutcome::RejectedRecording);
    }

    #[test]
    fn test_defaults() {
        let clock = ManualClock::new(0);
        let engine = ReverseReverbEngine::new(Box::new(Freeverb::default()), clock.shared(), SR);
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.amplitude_threshold(), 0.01);
        assert_eq!(engine.cooldown_ms(), 3000);
        assert_eq!(engine.record_length_secs(), 2.0);
        assert_eq!(engine.predelay_ms(), 30.0);
        assert_eq!(engine.wet(), 0.5);
        assert_eq!(engine.decay(), 4.0);
    }

    #[test]
    fn test_silent_capture_never_plays() {
        let clock = ManualClock::new(10_000);
        let mut engine = engine(&clock, 0.1);

        assert_eq!(engine.trigger_reverse(), TriggerOutcome::Started);
        assert!(engine.is_recording());
        engine.process(&mut constant(0.0, 800));

        assert!(!engine.is_recording());
        assert!(!engine.has_voice());
        assert_eq!(engine.voices_started(), 0);
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_loud_capture_plays_reversed_then_releases() {
        let clock = ManualClock::new(10_000);
        let mut engine = engine(&clock, 0.1);
        engine.set_predelay(0.0);

        engine.trigger_reverse();
        engine.process(&mut constant(0.5, 800));
        assert!(engine.has_voice());
        assert_eq!(engine.state(), EngineState::Playing);

        let mut out = constant(0.0, 800);
        engine.process(&mut out);
        assert!(out.peak() > 0.0);
        assert!(out.is_finite());
        assert!(!engine.has_voice());
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_second_trigger_within_cooldown_rejected() {
        let clock = ManualClock::new(10_000);
        let mut engine = engine(&clock, 0.1);

        assert!(engine.trigger_reverse().is_started());
        engine.process(&mut constant(0.5, 800));

        clock.advance_ms(1000);
        assert_eq!(engine.trigger_reverse(), TriggerOutcome::RejectedCooldown);
        assert!(!engine.is_recording());

        clock.advance_ms(2000);
        assert_eq!(engine.trigger_reverse(), TriggerOutcome::Started);
    }

    #[test]
    fn test_trigger_while_recording_rejected() {
        let clock = ManualClock::new(10_000);
        let mut engine = engine(&clock, 0.1);

        engine.trigger_reverse();
        engine.process(&mut constant(0.5, 400));
        assert!(engine.is_recording());

        clock.advance_ms(5000);
        assert_eq!(engine.trigger_reverse(), TriggerOutcome::RejectedRecording);
        assert_eq!(engine.trigger_state().last_trigger_ms, Some(10_000));
    }

    #[test]
    fn test_monitor_auto_triggers_on_loud_input() {
        let clock = ManualClock::new(10_000);
        let mut engine = engine(&clock, 0.1);

        engine.process(&mut constant(0.5, 256));
        assert!(!engine.is_recording());

        clock.advance_ms(500);
        engine.process(&mut constant(0.5, 256));
        assert!(engine.is_recording());
        assert_eq!(engine.state(), EngineState::Recording);
    }

    #[test]
    fn test_monitor_ignores_quiet_input() {
        let clock = ManualClock::new(10_000);
        let mut engine = engine(&clock, 0.1);

        engine.process(&mut constant(0.005, 256));
        clock.advance_ms(500);
        assert_eq!(engine.poll_monitor(), None);
        assert!(!engine.is_recording());
    }

    #[test]
    fn test_monitor_waits_for_interval() {
        let clock = ManualClock::new(10_000);
        let mut engine = engine(&clock, 0.1);

        engine.process(&mut constant(0.5, 256));
        clock.advance_ms(499);
        assert_eq!(engine.poll_monitor(), None);
        clock.advance_ms(1);
        assert_eq!(engine.poll_monitor(), Some(TriggerOutcome::Started));
    }

    #[test]
    fn test_new_trigger_preempts_previous_voice() {
        let clock = ManualClock::new(10_000);
        let mut engine = engine(&clock, 0.2);

        engine.trigger_reverse();
        engine.process(&mut constant(0.5, 1600));
        assert_eq!(engine.voice_count(), 1);

        clock.advance_ms(3000);
        engine.set_record_length(0.1);
        assert!(engine.trigger_reverse().is_started());
        engine.process(&mut constant(0.5, 800));

        // First voice was only half played when the second capture finished
        assert_eq!(engine.voices_started(), 2);
        assert_eq!(engine.voice_count(), 1);
        assert_eq!(engine.state(), EngineState::Playing);

        // and fades out over 10 ms instead of stopping dead
        assert!(engine.is_releasing());
        assert_eq!(engine.release_tail.num_samples(), 80);
        let (first, _) = engine.release_tail.frame(0);
        assert!(first > 0.4);
        engine.process(&mut constant(0.0, 100));
        assert!(!engine.is_releasing());
        assert_eq!(engine.voice_count(), 1);
    }

    #[test]
    fn test_release_tail_ramps_to_zero() {
        let mut voice = PlaybackVoice::new(constant(1.0, 800), SR);
        for _ in 0..200 {
            voice.next_frame();
        }
        let tail = voice.release_tail();
        assert_eq!(tail.num_samples(), 80);
        assert_abs_diff_eq!(tail.channel(0)[0], 1.0 - 1.0 / 80.0, epsilon = 1e-5);
        assert_eq!(tail.channel(0)[79], 0.0);
        assert!(tail.channel(0).windows(2).all(|pair| pair[1] <= pair[0]));

        // Only what is left of the buffer is rendered
        let mut short = PlaybackVoice::new(constant(1.0, 30), SR);
        assert_eq!(short.release_tail().num_samples(), 30);
        short.dispose();
        assert_eq!(short.release_tail().num_samples(), 0);
    }

    #[test]
    fn test_voice_fades_in_and_out() {
        let mut voice = PlaybackVoice::new(constant(1.0, 800), SR);
        let (first, _) = voice.next_frame().unwrap();
        assert!(first < 0.05);

        let mut last = first;
        let mut count = 1;
        while let Some((left, _)) = voice.next_frame() {
            if count == 400 {
                assert_abs_diff_eq!(left, 1.0, epsilon = 1e-6);
            }
            last = left;
            count += 1;
        }
        assert_eq!(count, 800);
        assert!(voice.is_fading_out());
        assert_abs_diff_eq!(last, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_reversed_buffer_is_played_backwards() {
        let clock = ManualClock::new(0);
        let mut engine = engine(&clock, 0.1);
        engine.start_playback(ramp(800).reversed());
        let voice = engine.voice.as_mut().unwrap();
        // Skip past the fade-in
        for _ in 0..100 {
            voice.next_frame();
        }
        let (left, _) = voice.next_frame().unwrap();
        assert_abs_diff_eq!(left, 700.0 / 800.0, epsilon = 1e-6);
    }

    #[test]
    fn test_controls_clamp() {
        let clock = ManualClock::new(0);
        let mut engine = engine(&clock, 0.1);
        engine.set_wet(3.0);
        assert_eq!(engine.wet(), 1.0);
        engine.set_wet(f32::NAN);
        assert_eq!(engine.wet(), 1.0);
        engine.set_predelay(500.0);
        assert_eq!(engine.predelay_ms(), MAX_PREDELAY_MS);
        engine.set_predelay(-1.0);
        assert_eq!(engine.predelay_ms(), MIN_PREDELAY_MS);
        engine.set_record_length(60.0);
        assert_eq!(engine.record_length_secs(), MAX_RECORD_LENGTH_SECS);
        engine.set_decay(0.0);
        assert_eq!(engine.decay(), 0.1);
    }

    #[test]
    fn test_set_parameter() {
        let clock = ManualClock::new(0);
        let mut engine = engine(&clock, 0.1);
        engine.set_parameter("wet", &json!(0.25)).unwrap();
        engine.set_parameter("cooldown", &json!(1500)).unwrap();
        engine.set_parameter("recordLength", &json!(0.5)).unwrap();
        assert_eq!(engine.wet(), 0.25);
        assert_eq!(engine.cooldown_ms(), 1500);
        assert_eq!(engine.record_length_secs(), 0.5);
        assert!(engine.set_parameter("size", &json!(1.0)).is_err());
    }

    #[test]
    fn test_dispose_mid_recording() {
        let clock = ManualClock::new(10_000);
        let mut engine = engine(&clock, 0.1);
        engine.trigger_reverse();
        engine.process(&mut constant(0.5, 400));

        engine.dispose();
        assert_eq!(engine.state(), EngineState::Disabled);
        assert!(!engine.is_recording());
        assert!(!engine.has_voice());
        assert_eq!(engine.trigger_reverse(), TriggerOutcome::RejectedDisabled);

        clock.advance_ms(10_000);
        assert_eq!(engine.poll_monitor(), None);

        // Second dispose is a no-op
        engine.dispose();
        assert!(engine.set_parameter("wet", &json!(0.1)).is_err());

        let mut dry = constant(0.3, 16);
        engine.process(&mut dry);
        assert_eq!(dry.channel(0)[15], 0.3);
    }

    #[test]
    fn test_dispose_clears_release_tail() {
        let clock = ManualClock::new(0);
        let mut engine = engine(&clock, 0.1);
        engine.start_playback(constant(0.5, 800));
        engine.start_playback(constant(0.5, 800));
        assert!(engine.is_releasing());
        engine.dispose();
        assert!(!engine.is_releasing());
    }

    #[test]
    fn test_dispose_during_playback_releases_voice() {
        let clock = ManualClock::new(10_000);
        let mut engine = engine(&clock, 0.1);
        engine.trigger_reverse();
        engine.process(&mut constant(0.5, 800));
        assert!(engine.has_voice());

        engine.dispose();
        assert!(!engine.has_voice());
        assert_eq!(engine.state(), EngineState::Disabled);
    }
}
