//! Master Limiter
//!
//! Brickwall limiter placed at the final stage of the signal path.
//! The threshold is a ramped control; the current gain reduction is exposed
//! as read-only telemetry.

use serde_json::{json, Value};
use tracing::debug;

use crate::dsp::curves::{db_to_gain, gain_to_db};
use crate::dsp::effect::{ensure_live, number, EffectUnit, UnitParams};
use crate::dsp::ramp::RampedParam;
use crate::engine::AudioBuffer;
use crate::error::{FxError, Result};
use crate::impl_unit_common;

// ============================================================================
// Constants
// ============================================================================

/// Minimum threshold in dB
pub const MIN_THRESHOLD_DB: f32 = -20.0;
/// Maximum threshold in dB
pub const MAX_THRESHOLD_DB: f32 = 0.0;
/// Default threshold in dB
pub const DEFAULT_THRESHOLD_DB: f32 = -3.0;

/// Minimum release time in ms
const MIN_RELEASE_MS: f32 = 10.0;
/// Maximum release time in ms
const MAX_RELEASE_MS: f32 = 1000.0;

/// Very fast attack time for brickwall limiting (0.1ms)
const ATTACK_MS: f32 = 0.1;

/// Calculate envelope coefficient from time constant
#[inline]
fn time_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    (-1.0 / (time_ms * sample_rate / 1000.0)).exp()
}

// ============================================================================
// Master Limiter
// ============================================================================

/// Brickwall limiter with a ramped threshold
///
/// # Parameters
/// - `threshold`: ceiling in dB (-20 to 0), ramped over the unit ramp time
/// - `release_ms`: gain recovery time (10 to 1000 ms)
#[derive(Debug, Clone)]
pub struct MasterLimiter {
    unit: UnitParams,
    threshold_db: RampedParam,
    release_ms: f32,
    /// Current gain reduction in dB (positive while limiting)
    envelope: f32,
    sample_rate: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl MasterLimiter {
    pub fn new(threshold_db: f32, sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1) as f32;
        let mut limiter = Self {
            unit: UnitParams::default(),
            threshold_db: RampedParam::new(DEFAULT_THRESHOLD_DB, sample_rate)
                .with_range(MIN_THRESHOLD_DB, MAX_THRESHOLD_DB),
            release_ms: 100.0,
            envelope: 0.0,
            sample_rate,
            attack_coeff: 0.0,
            release_coeff: 0.0,
        };
        limiter.threshold_db.set_immediate(threshold_db);
        limiter.update_coefficients();
        limiter
    }

    /// Ramp the threshold to `db`, clamped to [-20, 0] dB
    pub fn set_threshold(&mut self, db: f32, ramp_seconds: f32) {
        self.threshold_db.ramp_to(db, ramp_seconds);
    }

    /// Threshold the limiter is settling on, in dB
    pub fn threshold(&self) -> f32 {
        self.threshold_db.target()
    }

    /// Current gain reduction in dB (0 or negative)
    pub fn reduction(&self) -> f32 {
        if self.envelope > 0.0 {
            -self.envelope
        } else {
            0.0
        }
    }

    /// Set release time in milliseconds
    pub fn set_release_ms(&mut self, ms: f32) {
        self.release_ms = ms.clamp(MIN_RELEASE_MS, MAX_RELEASE_MS);
        self.release_coeff = time_to_coeff(self.release_ms, self.sample_rate);
    }

    pub fn release_ms(&self) -> f32 {
        self.release_ms
    }

    fn update_coefficients(&mut self) {
        self.attack_coeff = time_to_coeff(ATTACK_MS, self.sample_rate);
        self.release_coeff = time_to_coeff(self.release_ms, self.sample_rate);
    }
}

impl EffectUnit for MasterLimiter {
    impl_unit_common!("limiter");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.unit.disposed {
            return;
        }

        let num_channels = buffer.num_channels();
        for i in 0..buffer.num_samples() {
            let threshold_db = self.threshold_db.next();
            let ceiling = db_to_gain(threshold_db);

            let mut peak = 0.0_f32;
            for ch in 0..num_channels {
                peak = peak.max(buffer.channel(ch)[i].abs());
            }

            let target_reduction = if peak > ceiling {
                (gain_to_db(peak) - threshold_db).max(0.0)
            } else {
                0.0
            };

            let coeff = if target_reduction > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * target_reduction;

            let gain = db_to_gain(-self.envelope);
            for ch in 0..num_channels {
                let sample = &mut buffer.channel_mut(ch)[i];
                *sample *= gain;
                // Final hard clip so the ceiling is never exceeded
                if sample.abs() > ceiling {
                    *sample = sample.signum() * ceiling;
                }
                if !sample.is_finite() {
                    *sample = 0.0;
                }
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        self.sample_rate = sample_rate.max(1) as f32;
        self.threshold_db.set_sample_rate(self.sample_rate);
        self.update_coefficients();
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> Result<()> {
        ensure_live(&self.unit, "limiter")?;
        match name {
            "threshold" | "threshold_db" => {
                self.set_threshold(number(name, value)?, self.unit.ramp_seconds);
                Ok(())
            }
            "release" | "release_ms" => {
                self.set_release_ms(number(name, value)?);
                Ok(())
            }
            _ => Err(FxError::UnknownSelector {
                kind: "limiter parameter",
                name: name.to_string(),
            }),
        }
    }

    fn get_params(&self) -> Value {
        json!({
            "threshold": self.threshold(),
            "release_ms": self.release_ms,
            "reduction": self.reduction(),
        })
    }

    fn dispose(&mut self) {
        if !self.unit.disposed {
            debug!(id = %self.unit.id, "master limiter disposed");
        }
        self.unit.disposed = true;
        self.envelope = 0.0;
    }
}

// ============================================================================
// Tests
// ============================================================================
