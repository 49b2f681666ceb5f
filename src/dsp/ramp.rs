//! Parameter ramping for click-free control changes
//!
//! Every numeric audio control moves to a new value over a bounded time
//! instead of jumping. [`RampedParam`] is advanced once per sample by the
//! owning unit; [`PlainParam`] is a scalar that can only be set outright.
//! [`Param`] closes the two over a tagged variant so callers pick the
//! capability at construction time.
//!
//! ```
//! use fxcore::dsp::ramp::{Param, RampedParam};
//!
//! let mut gain = Param::Ramped(RampedParam::new(0.0, 1000.0));
//! gain.ramp_to(1.0, 0.01); // 10 samples at 1 kHz
//! for _ in 0..10 {
//!     gain.next();
//! }
//! assert_eq!(gain.value(), 1.0);
//! ```

use tracing::warn;

/// Default ramp time for parameter changes (50 ms)
pub const DEFAULT_RAMP_SECONDS: f32 = 0.05;

/// Clean up a configured ramp time: negative becomes 0 (snap), non-finite
/// falls back to [`DEFAULT_RAMP_SECONDS`]
pub fn sanitize_ramp_seconds(seconds: f32) -> f32 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        DEFAULT_RAMP_SECONDS
    }
}

/// Shape of the approach to the target value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RampShape {
    /// Constant increment per sample
    #[default]
    Linear,
    /// Constant ratio per sample; falls back to linear when the start and
    /// target do not share a strictly positive sign
    Exponential,
}

/// A control value that approaches its target over a bounded number of samples
#[derive(Debug, Clone)]
pub struct RampedParam {
    current: f32,
    target: f32,
    /// Per-sample increment (linear) or factor (exponential)
    step: f32,
    remaining: u32,
    exponential: bool,
    shape: RampShape,
    sample_rate: f32,
    min: f32,
    max: f32,
}

impl RampedParam {
    /// Create a linear ramped parameter at rest on `initial`
    pub fn new(initial: f32, sample_rate: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
            exponential: false,
            shape: RampShape::Linear,
            sample_rate: sample_rate.max(1.0),
            min: f32::MIN,
            max: f32::MAX,
        }
    }

    /// Restrict every target to `[min, max]`
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self.current = self.current.clamp(min, max);
        self.target = self.target.clamp(min, max);
        self
    }

    /// Select the ramp shape for subsequent ramps
    pub fn with_shape(mut self, shape: RampShape) -> Self {
        self.shape = shape;
        self
    }

    /// Start a ramp from the current value to `target` over `seconds`
    ///
    /// Non-positive durations snap immediately. Non-finite targets are
    /// ignored so they never reach the render path.
    pub fn ramp_to(&mut self, target: f32, seconds: f32) {
        if !target.is_finite() {
            warn!(target, "ignoring non-finite ramp target");
            return;
        }
        let target = target.clamp(self.min, self.max);
        let samples = if seconds.is_finite() && seconds > 0.0 {
            (seconds * self.sample_rate).round() as u32
        } else {
            0
        };

        if samples == 0 || target == self.current {
            self.set_immediate(target);
            return;
        }

        self.target = target;
        self.remaining = samples;
        self.exponential = self.shape == RampShape::Exponential
            && self.current > 0.0
            && target > 0.0;
        self.step = if self.exponential {
            (target / self.current).powf(1.0 / samples as f32)
        } else {
            (target - self.current) / samples as f32
        };
    }

    /// Jump to `value` and cancel any ramp in progress
    pub fn set_immediate(&mut self, value: f32) {
        if !value.is_finite() {
            warn!(value, "ignoring non-finite parameter value");
            return;
        }
        let value = value.clamp(self.min, self.max);
        self.current = value;
        self.target = value;
        self.remaining = 0;
        self.step = 0.0;
    }

    /// Advance one sample and return the new current value
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            } else if self.exponential {
                self.current *= self.step;
            } else {
                self.current += self.step;
            }
        }
        self.current
    }

    /// Advance `samples` samples at once
    pub fn skip(&mut self, samples: usize) {
        if samples as u64 >= self.remaining as u64 {
            self.current = self.target;
            self.remaining = 0;
            return;
        }
        for _ in 0..samples {
            self.next();
        }
    }

    /// Current (possibly mid-ramp) value
    #[inline]
    pub fn value(&self) -> f32 {
        self.current
    }

    /// Value the ramp is heading towards
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// True while a ramp is in progress
    #[inline]
    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Samples left in the current ramp
    pub fn remaining_samples(&self) -> u32 {
        self.remaining
    }

    /// Update the sample rate used to convert ramp seconds into samples
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
    }
}

/// A scalar control with no ramping capability
#[derive(Debug, Clone)]
pub struct PlainParam {
    value: f32,
    min: f32,
    max: f32,
}

impl PlainParam {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            min: f32::MIN,
            max: f32::MAX,
        }
    }

    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self.value = self.value.clamp(min, max);
        self
    }

    pub fn set(&mut self, value: f32) {
        if !value.is_finite() {
            warn!(value, "ignoring non-finite parameter value");
            return;
        }
        self.value = value.clamp(self.min, self.max);
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

/// A control parameter with its capability fixed at construction
#[derive(Debug, Clone)]
pub enum Param {
    Ramped(RampedParam),
    Plain(PlainParam),
}

impl Param {
    /// Move towards `target`: ramped when supported, immediate otherwise
    pub fn ramp_to(&mut self, target: f32, seconds: f32) {
        match self {
            Param::Ramped(param) => param.ramp_to(target, seconds),
            Param::Plain(param) => param.set(target),
        }
    }

    /// Set the value outright on either variant
    pub fn set_immediate(&mut self, value: f32) {
        match self {
            Param::Ramped(param) => param.set_immediate(value),
            Param::Plain(param) => param.set(value),
        }
    }

    /// Advance one sample (plain parameters are constant)
    #[inline]
    pub fn next(&mut self) -> f32 {
        match self {
            Param::Ramped(param) => param.next(),
            Param::Plain(param) => param.value(),
        }
    }

    pub fn value(&self) -> f32 {
        match self {
            Param::Ramped(param) => param.value(),
            Param::Plain(param) => param.value(),
        }
    }

    /// Final value once any ramp completes
    pub fn target(&self) -> f32 {
        match self {
            Param::Ramped(param) => param.target(),
            Param::Plain(param) => param.value(),
        }
    }

    pub fn is_rampable(&self) -> bool {
        matches!(self, Param::Ramped(_))
    }

    /// Update the ramp sample rate; plain parameters ignore it
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if let Param::Ramped(param) = self {
            param.set_sample_rate(sample_rate);
        }
    }
}

impl From<RampedParam> for Param {
    fn from(param: RampedParam) -> Self {
        Param::Ramped(param)
    }
}

impl From<PlainParam> for Param {
    fn from(param: PlainParam) -> Self {
        Param::Plain(param)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sanitize_ramp_seconds() {
        assert_eq!(sanitize_ramp_seconds(0.2), 0.2);
        assert_eq!(sanitize_ramp_seconds(-1.0), 0.0);
        assert_eq!(sanitize_ramp_seconds(f32::NAN), DEFAULT_RAMP_SECONDS);
        assert_eq!(sanitize_ramp_seconds(f32::INFINITY), DEFAULT_RAMP_SECONDS);
    }

    #[test]
    fn test_linear_ramp_reaches_target_exactly() {
        let mut p = RampedParam::new(0.0, 48000.0);
        p.ramp_to(1.0, DEFAULT_RAMP_SECONDS);
        assert!(p.is_ramping());
        assert_eq!(p.remaining_samples(), 2400);

        let mut last = 0.0;
        for _ in 0..2400 {
            let v = p.next();
            assert!(v >= last, "linear ramp must be monotonic");
            last = v;
        }
        assert_eq!(p.value(), 1.0);
        assert!(!p.is_ramping());
    }

    #[test]
    fn test_linear_ramp_midpoint() {
        let mut p = RampedParam::new(0.0, 1000.0);
        p.ramp_to(1.0, 0.1);
        p.skip(50);
        assert_abs_diff_eq!(p.value(), 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_no_instant_jump() {
        let mut p = RampedParam::new(0.0, 48000.0);
        p.ramp_to(1.0, 0.05);
        let first = p.next();
        assert!(first < 0.01, "first sample after ramp start jumped to {}", first);
    }

    #[test]
    fn test_zero_duration_snaps() {
        let mut p = RampedParam::new(0.0, 48000.0);
        p.ramp_to(0.7, 0.0);
        assert_eq!(p.value(), 0.7);
        assert!(!p.is_ramping());
    }

    #[test]
    fn test_exponential_ramp() {
        let mut p = RampedParam::new(0.1, 1000.0).with_shape(RampShape::Exponential);
        p.ramp_to(1.0, 0.01);
        p.skip(5);
        // Geometric midpoint of 0.1 and 1.0
        assert_abs_diff_eq!(p.value(), 0.316_227_8, epsilon = 1e-4);
        p.skip(5);
        assert_eq!(p.value(), 1.0);
    }

    #[test]
    fn test_exponential_falls_back_to_linear_through_zero() {
        let mut p = RampedParam::new(1.0, 1000.0).with_shape(RampShape::Exponential);
        p.ramp_to(0.0, 0.01);
        p.skip(5);
        assert_abs_diff_eq!(p.value(), 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_range_clamps_targets() {
        let mut p = RampedParam::new(0.5, 1000.0).with_range(0.0, 1.0);
        p.ramp_to(5.0, 0.0);
        assert_eq!(p.value(), 1.0);
        p.set_immediate(-3.0);
        assert_eq!(p.value(), 0.0);
    }

    #[test]
    fn test_non_finite_target_ignored() {
        let mut p = RampedParam::new(0.5, 1000.0);
        p.ramp_to(f32::NAN, 0.05);
        p.ramp_to(f32::INFINITY, 0.05);
        p.set_immediate(f32::NEG_INFINITY);
        assert_eq!(p.value(), 0.5);
        assert!(!p.is_ramping());
    }

    #[test]
    fn test_plain_param_falls_back_to_immediate() {
        let mut p = Param::Plain(PlainParam::new(0.0).with_range(0.0, 2.0));
        assert!(!p.is_rampable());
        p.ramp_to(1.5, 0.05);
        assert_eq!(p.value(), 1.5);
        p.ramp_to(9.0, 0.05);
        assert_eq!(p.value(), 2.0);
    }

    #[test]
    fn test_ramped_param_prefers_ramping() {
        let mut p: Param = RampedParam::new(0.0, 1000.0).into();
        assert!(p.is_rampable());
        p.ramp_to(1.0, 0.05);
        assert_eq!(p.value(), 0.0);
        assert_eq!(p.target(), 1.0);
    }
}
