//! Sidechain Ducker
//!
//! Makes one bus's gain inversely track another signal's envelope:
//!
//! ```text
//! trigger -> envelope follower -> multiply(-ratio) -> add(1) -> target gain
//! ```
//!
//! With the follower at 0.8 and a ratio of 0.7 the target is scaled by
//! `0.8 * -0.7 + 1 = 0.44`.

use serde_json::{json, Value};
use tracing::{debug, Span};

use crate::config::DuckerConfig;
use crate::dsp::effect::{ensure_live, number, EffectUnit, UnitParams};
use crate::dsp::envelope::EnvelopeFollower;
use crate::engine::{dispose_isolated, wire, AudioBuffer, GainNode, RoutingNode};
use crate::error::{FxError, Result};
use crate::impl_unit_common;

/// Gain factor applied to the target for a given envelope and ratio
#[inline]
pub fn gain_factor(envelope: f32, ratio: f32) -> f32 {
    envelope * -ratio + 1.0
}

/// Envelope-follower-driven gain modulator
///
/// Feed the trigger signal with [`SidechainDucker::feed_sidechain`], then
/// run the target bus through [`EffectUnit::process`]. Per-sample gain
/// factors computed from the last sidechain block are applied in order; if
/// the target block is longer, the last factor is held.
#[derive(Debug)]
pub struct SidechainDucker {
    unit: UnitParams,
    follower: EnvelopeFollower,
    /// Multiply-by-(-ratio) stage
    scale: GainNode,
    /// Add-constant-1 stage
    offset: RoutingNode,
    ratio: f32,
    factors: Vec<f32>,
    last_factor: f32,
    span: Span,
}

impl SidechainDucker {
    /// Create a ducker
    ///
    /// * `ratio` - fraction of duck in [0, 1]
    /// * `attack` - envelope smoothing time in seconds
    /// * `release` - envelope recovery time in seconds
    pub fn new(ratio: f32, attack: f32, release: f32, sample_rate: u32) -> Self {
        let ratio = clamp_ratio(ratio);
        let sample_rate = sample_rate.max(1) as f32;
        let mut scale = GainNode::new("ducker.multiply", -ratio, sample_rate);
        let offset = RoutingNode::new("ducker.add");
        wire("ducker", &mut scale, &offset);
        Self {
            unit: UnitParams::default(),
            follower: EnvelopeFollower::new(attack, release, sample_rate),
            scale,
            offset,
            ratio,
            factors: Vec::new(),
            last_factor: 1.0,
            span: tracing::debug_span!("ducker"),
        }
    }

    pub fn from_config(config: &DuckerConfig, sample_rate: u32) -> Self {
        Self::new(config.ratio, config.attack, config.release, sample_rate)
    }

    /// Record this unit's events under `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Ramp the duck ratio to `next`, clamped to [0, 1], over the unit ramp time
    pub fn set_ratio(&mut self, next: f32) {
        if !next.is_finite() {
            return;
        }
        self.ratio = clamp_ratio(next);
        self.scale.gain_mut().ramp_to(-self.ratio, self.unit.ramp_seconds);
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn set_attack(&mut self, seconds: f32) {
        if seconds.is_finite() {
            self.follower.set_attack(seconds);
        }
    }

    pub fn set_release(&mut self, seconds: f32) {
        if seconds.is_finite() {
            self.follower.set_release(seconds);
        }
    }

    pub fn attack(&self) -> f32 {
        self.follower.attack()
    }

    pub fn release(&self) -> f32 {
        self.follower.release()
    }

    /// Run one follower output through the multiply and add stages
    #[inline]
    pub fn compute_gain(&mut self, envelope: f32) -> f32 {
        self.scale.process(envelope) + 1.0
    }

    /// Feed a block of the trigger signal
    pub fn feed_sidechain(&mut self, trigger: &AudioBuffer) {
        if self.unit.disposed {
            return;
        }
        self.factors.clear();
        let channels = trigger.num_channels().max(1) as f32;
        for i in 0..trigger.num_samples() {
            let sum: f32 = (0..trigger.num_channels())
                .map(|ch| trigger.channel(ch)[i].abs())
                .sum();
            let envelope = self.follower.process(sum / channels);
            let factor = self.compute_gain(envelope);
            self.factors.push(factor);
        }
    }

    /// Most recent gain factor applied to the target
    pub fn current_gain(&self) -> f32 {
        self.last_factor
    }
}

fn clamp_ratio(ratio: f32) -> f32 {
    if ratio.is_nan() {
        0.0
    } else {
        ratio.clamp(0.0, 1.0)
    }
}

impl EffectUnit for SidechainDucker {
    impl_unit_common!("ducker");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.unit.disposed {
            return;
        }
        for i in 0..buffer.num_samples() {
            let factor = self.factors.get(i).copied().unwrap_or(self.last_factor);
            self.last_factor = factor;
            for ch in 0..buffer.num_channels() {
                buffer.channel_mut(ch)[i] *= factor;
            }
        }
        self.factors.clear();
    }

    fn prepare(&mut self, sample_rate: u32, max_block_size: usize) {
        self.follower.set_sample_rate(sample_rate as f32);
        self.scale.gain_mut().set_sample_rate(sample_rate as f32);
        self.factors.reserve(max_block_size);
    }

    fn reset(&mut self) {
        self.follower.reset();
        self.factors.clear();
        self.last_factor = 1.0;
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> Result<()> {
        ensure_live(&self.unit, "ducker")?;
        match name {
            "ratio" => self.set_ratio(number(name, value)?),
            "attack" => self.set_attack(number(name, value)?),
            "release" => self.set_release(number(name, value)?),
            _ => {
                return Err(FxError::UnknownSelector {
                    kind: "ducker parameter",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn get_params(&self) -> Value {
        json!({
            "ratio": self.ratio,
            "attack": self.follower.attack(),
            "release": self.follower.release(),
        })
    }

    fn dispose(&mut self) {
        let _enter = self.span.enter();
        if self.unit.disposed {
            debug!("ducker already disposed");
            return;
        }
        self.unit.disposed = true;
        self.follower.reset();
        self.factors = Vec::new();
        let released = dispose_isolated("ducker", &mut [&mut self.scale, &mut self.offset]);
        debug!(released, "ducker disposed");
    }
}

// ============================================================================
// Tests
// ============================================================================
