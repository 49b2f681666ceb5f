//! Trim
//!
//! Small range-bounded gain adjustment used between processing stages.
//! The level is set in dB and applied as a ramped linear gain.

use serde_json::{json, Value};

use crate::dsp::curves::{db_to_gain, gain_to_db};
use crate::dsp::effect::{ensure_live, number, EffectUnit, UnitParams};
use crate::dsp::ramp::RampedParam;
use crate::engine::AudioBuffer;
use crate::error::{FxError, Result};
use crate::impl_unit_common;

/// Minimum trim in dB
pub const MIN_TRIM_DB: f32 = -12.0;

/// Maximum trim in dB
pub const MAX_TRIM_DB: f32 = 3.0;

/// Bounded trim gain
///
/// # Example
/// ```
/// use fxcore::dsp::Trim;
///
/// let mut trim = Trim::new(-20.0, 48000);
/// assert_eq!(trim.level_db(), -12.0);
/// trim.set_level(1.5, 0.05);
/// assert_eq!(trim.level_db(), 1.5);
/// ```
#[derive(Debug, Clone)]
pub struct Trim {
    unit: UnitParams,
    level_db: f32,
    gain: RampedParam,
}

impl Trim {
    pub fn new(initial_db: f32, sample_rate: u32) -> Self {
        let level_db = clamp_db(initial_db);
        Self {
            unit: UnitParams::default(),
            level_db,
            gain: RampedParam::new(db_to_gain(level_db), sample_rate.max(1) as f32)
                .with_range(db_to_gain(MIN_TRIM_DB), db_to_gain(MAX_TRIM_DB)),
        }
    }

    /// Ramp to `db` (clamped to [-12, +3] dB) over `ramp_seconds`
    pub fn set_level(&mut self, db: f32, ramp_seconds: f32) {
        if !db.is_finite() {
            return;
        }
        self.level_db = clamp_db(db);
        self.gain.ramp_to(db_to_gain(self.level_db), ramp_seconds);
    }

    /// Level in dB the trim is settling on
    pub fn level_db(&self) -> f32 {
        self.level_db
    }

    /// Current linear gain (mid-ramp value)
    pub fn gain_linear(&self) -> f32 {
        self.gain.value()
    }

    /// Current gain expressed in dB
    pub fn current_db(&self) -> f32 {
        gain_to_db(self.gain.value())
    }
}

fn clamp_db(db: f32) -> f32 {
    if db.is_nan() {
        0.0
    } else {
        db.clamp(MIN_TRIM_DB, MAX_TRIM_DB)
    }
}

impl Default for Trim {
    fn default() -> Self {
        Self::new(0.0, crate::engine::DEFAULT_SAMPLE_RATE)
    }
}

impl EffectUnit for Trim {
    impl_unit_common!("trim");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.unit.disposed {
            return;
        }

        // Unity gain optimization
        if !self.gain.is_ramping() && (self.gain.value() - 1.0).abs() < f32::EPSILON {
            return;
        }

        for i in 0..buffer.num_samples() {
            let gain = self.gain.next();
            for ch in 0..buffer.num_channels() {
                buffer.channel_mut(ch)[i] *= gain;
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        self.gain.set_sample_rate(sample_rate as f32);
    }

    fn reset(&mut self) {
        self.gain.set_immediate(db_to_gain(self.level_db));
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> Result<()> {
        ensure_live(&self.unit, "trim")?;
        match name {
            "level" | "level_db" | "gain" => {
                self.set_level(number(name, value)?, self.unit.ramp_seconds);
                Ok(())
            }
            _ => Err(FxError::UnknownSelector {
                kind: "trim parameter",
                name: name.to_string(),
            }),
        }
    }

    fn get_params(&self) -> Value {
        json!({
            "level": self.level_db,
            "gain_linear": self.gain.target(),
        })
    }

    fn dispose(&mut self) {
        self.unit.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChannelLayout;
    use approx::assert_abs_diff_eq;
    use serde_json::json;

    #[test]
    fn test_trim_clamps() {
        assert_eq!(Trim::new(-30.0, 48000).level_db(), MIN_TRIM_DB);
        assert_eq!(Trim::new(10.0, 48000).level_db(), MAX_TRIM_DB);
        assert_eq!(Trim::new(f32::NAN, 48000).level_db(), 0.0);
    }

    #[test]
    fn test_trim_db_linear_conversion() {
        let trim = Trim::new(-6.0, 48000);
        assert_abs_diff_eq!(trim.gain_linear(), 0.501187, epsilon = 1e-4);
        assert_abs_diff_eq!(trim.current_db(), -6.0, epsilon = 1e-3);
    }

    #[test]
    fn test_trim_ramps_then_applies() {
        let mut trim = Trim::new(0.0, 1000);
        trim.set_level(-12.0, 0.05);
        assert_eq!(trim.gain_linear(), 1.0);

        let mut buffer = AudioBuffer::with_sample_rate(100, 2, 1000);
        for ch in 0..2 {
            buffer.channel_mut(ch).fill(1.0);
        }
        trim.process(&mut buffer);

        // First sample only a step into the ramp, last sample at target
        assert!(buffer.channel(0)[0] > 0.9);
        assert_abs_diff_eq!(buffer.channel(1)[99], db_to_gain(-12.0), epsilon = 1e-5);
    }

    #[test]
    fn test_trim_unity_is_passthrough() {
        let mut trim = Trim::default();
        let mut buffer = AudioBuffer::new(4, ChannelLayout::Mono);
        buffer.channel_mut(0).copy_from_slice(&[0.1, 0.2, 0.3, 0.4]);
        trim.process(&mut buffer);
        assert_eq!(buffer.channel(0), &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_trim_set_parameter() {
        let mut trim = Trim::default();
        trim.set_parameter("level", &json!(2.0)).unwrap();
        assert_eq!(trim.level_db(), 2.0);
        assert!(trim.set_parameter("pan", &json!(0.0)).is_err());
    }
}
