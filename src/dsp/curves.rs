//! Control curve mapping
//!
//! Stateless conversions between a normalized control position `v` and the
//! physical unit a parameter lives in. All `map_*` functions clamp `v` to
//! `[0, 1]` first, so no input (including NaN) produces a value outside the
//! documented range.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::dsp::ramp::{Param, DEFAULT_RAMP_SECONDS};
use crate::error::FxError;

// ============================================================================
// Constants
// ============================================================================

/// Default frequency range in Hz
pub const MIN_FREQUENCY_HZ: f32 = 20.0;
pub const MAX_FREQUENCY_HZ: f32 = 20000.0;

/// Default gain range in dB
pub const MIN_GAIN_DB: f32 = -60.0;
pub const MAX_GAIN_DB: f32 = 0.0;

/// Default time range in seconds
pub const MIN_TIME_SECS: f32 = 0.001;
pub const MAX_TIME_SECS: f32 = 10.0;

/// Default filter Q range
pub const MIN_Q: f32 = 0.1;
pub const MAX_Q: f32 = 30.0;

/// Default compression ratio range
pub const MIN_RATIO: f32 = 1.0;
pub const MAX_RATIO: f32 = 20.0;

/// Amplitude floor for `gain_to_db` (-120 dB)
pub const GAIN_FLOOR: f32 = 1e-6;

// ============================================================================
// Mapping Functions
// ============================================================================

/// Clamp a control value to `[0, 1]`, mapping NaN to 0
#[inline]
fn normalize(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Smallest lower bound an exponential range may have
const MIN_EXPONENTIAL_BOUND: f32 = 1e-6;

/// Make `[min, max]` usable by an exponential curve
///
/// Non-finite bounds fall back to `defaults`, inverted bounds are swapped and
/// the lower bound is floored at [`MIN_EXPONENTIAL_BOUND`], so `max / min` is
/// always finite and at least 1.
fn exponential_range(min: f32, max: f32, defaults: (f32, f32)) -> (f32, f32) {
    let (min, max) = if min.is_finite() && max.is_finite() {
        (min, max)
    } else {
        defaults
    };
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let lo = lo.max(MIN_EXPONENTIAL_BOUND);
    (lo, hi.max(lo))
}

/// `min * (max / min) ^ v`: equal steps in `v` give equal ratios
#[inline]
fn exponential(v: f32, min: f32, max: f32, defaults: (f32, f32)) -> f32 {
    let (lo, hi) = exponential_range(min, max, defaults);
    let v = normalize(v);
    if v == 0.0 {
        return lo;
    }
    if v == 1.0 {
        return hi;
    }
    (lo * (hi / lo).powf(v)).clamp(lo, hi)
}

/// Map a control value to a frequency in Hz on an exponential curve
pub fn map_frequency(v: f32, min: f32, max: f32) -> f32 {
    exponential(v, min, max, (MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ))
}

/// Exact inverse of [`map_frequency`]; `hz` is clamped to `[min, max]` first
pub fn unmap_frequency(hz: f32, min: f32, max: f32) -> f32 {
    let (lo, hi) = exponential_range(min, max, (MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ));
    if hi <= lo {
        return 0.0;
    }
    let hz = if hz.is_nan() { lo } else { hz.clamp(lo, hi) };
    normalize((hz / lo).ln() / (hi / lo).ln())
}

/// Map a control value to decibels, linear in dB space
///
/// Non-finite bounds fall back to the default `-60..0 dB` range.
pub fn map_gain(v: f32, min_db: f32, max_db: f32) -> f32 {
    let (min_db, max_db) = if min_db.is_finite() && max_db.is_finite() {
        (min_db, max_db)
    } else {
        (MIN_GAIN_DB, MAX_GAIN_DB)
    };
    min_db + normalize(v) * (max_db - min_db)
}

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, floored at [`GAIN_FLOOR`]
///
/// Zero, negative and NaN inputs all return -120 dB, never `-inf` or NaN.
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    let gain = if gain.is_nan() { GAIN_FLOOR } else { gain.max(GAIN_FLOOR) };
    20.0 * gain.log10()
}

/// Map a control value to a time in seconds on an exponential curve
pub fn map_time(v: f32, min: f32, max: f32) -> f32 {
    exponential(v, min, max, (MIN_TIME_SECS, MAX_TIME_SECS))
}

/// Map a control value to a filter Q on an exponential curve
pub fn map_q(v: f32, min: f32, max: f32) -> f32 {
    exponential(v, min, max, (MIN_Q, MAX_Q))
}

/// Map a control value to a compression ratio on an exponential curve
pub fn map_ratio(v: f32, min: f32, max: f32) -> f32 {
    exponential(v, min, max, (MIN_RATIO, MAX_RATIO))
}

// ============================================================================
// Curve Kind
// ============================================================================

/// The physical unit a control curve maps into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurveKind {
    Frequency,
    Gain,
    Time,
    Q,
    Ratio,
}

impl CurveKind {
    /// Map a control value with this curve's default range
    pub fn map(self, v: f32) -> f32 {
        match self {
            CurveKind::Frequency => map_frequency(v, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ),
            CurveKind::Gain => map_gain(v, MIN_GAIN_DB, MAX_GAIN_DB),
            CurveKind::Time => map_time(v, MIN_TIME_SECS, MAX_TIME_SECS),
            CurveKind::Q => map_q(v, MIN_Q, MAX_Q),
            CurveKind::Ratio => map_ratio(v, MIN_RATIO, MAX_RATIO),
        }
    }

    /// Unit suffix for display
    pub fn unit(self) -> &'static str {
        match self {
            CurveKind::Frequency => "Hz",
            CurveKind::Gain => "dB",
            CurveKind::Time => "s",
            CurveKind::Q => "Q",
            CurveKind::Ratio => ":1",
        }
    }
}

impl FromStr for CurveKind {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "frequency" | "freq" => Ok(CurveKind::Frequency),
            "gain" => Ok(CurveKind::Gain),
            "time" => Ok(CurveKind::Time),
            "q" => Ok(CurveKind::Q),
            "ratio" => Ok(CurveKind::Ratio),
            _ => Err(FxError::UnknownSelector {
                kind: "curve kind",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for CurveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CurveKind::Frequency => "frequency",
            CurveKind::Gain => "gain",
            CurveKind::Time => "time",
            CurveKind::Q => "q",
            CurveKind::Ratio => "ratio",
        };
        f.write_str(name)
    }
}

/// Map `v` through the named curve and ramp `target` to the result
///
/// Returns the mapped value, or `None` (after logging a warning) when
/// `curve_kind` is not recognized; the target is left untouched in that case.
/// Gain curves write linear amplitude, the others write the physical value.
pub fn apply_curve(target: &mut Param, v: f32, curve_kind: &str, ramp_seconds: f32) -> Option<f32> {
    let kind = match curve_kind.parse::<CurveKind>() {
        Ok(kind) => kind,
        Err(err) => {
            warn!(%err, "apply_curve: no curve applied");
            return None;
        }
    };
    let mapped = kind.map(v);
    let value = match kind {
        CurveKind::Gain => db_to_gain(mapped),
        _ => mapped,
    };
    target.ramp_to(value, ramp_seconds);
    Some(mapped)
}

/// [`apply_curve`] with the default 50 ms ramp
pub fn apply_curve_default(target: &mut Param, v: f32, curve_kind: &str) -> Option<f32> {
    apply_curve(target, v, curve_kind, DEFAULT_RAMP_SECONDS)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::ramp::{PlainParam, RampedParam};
    use approx::assert_abs_diff_eq;

    fn freq(v: f32) -> f32 {
        map_frequency(v, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)
    }

    #[test]
    fn test_frequency_endpoints() {
        assert_eq!(freq(0.0), 20.0);
        assert_eq!(freq(1.0), 20000.0);
        assert_abs_diff_eq!(freq(0.5), (20.0_f32 * 20000.0).sqrt(), epsilon = 1.0);
    }

    #[test]
    fn test_frequency_monotonic_and_bounded() {
        let mut last = 0.0;
        for i in 0..=1000 {
            let v = i as f32 / 1000.0;
            let hz = freq(v);
            assert!((20.0..=20000.0).contains(&hz));
            assert!(hz >= last);
            last = hz;
        }
    }

    #[test]
    fn test_frequency_roundtrip() {
        for i in 0..=100 {
            let v = i as f32 / 100.0;
            let back = unmap_frequency(freq(v), MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ);
            assert_abs_diff_eq!(back, v, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_unmap_clamps_out_of_range() {
        assert_eq!(unmap_frequency(5.0, 20.0, 20000.0), 0.0);
        assert_abs_diff_eq!(unmap_frequency(96000.0, 20.0, 20000.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_out_of_range_control_clamps() {
        assert_eq!(freq(-5.0), freq(0.0));
        assert_eq!(freq(7.0), freq(1.0));
        assert_eq!(map_gain(-1.0, -60.0, 0.0), -60.0);
        assert_eq!(map_gain(2.0, -60.0, 0.0), 0.0);
        assert_eq!(map_time(-1.0, 0.001, 10.0), 0.001);
        assert_eq!(map_q(3.0, 0.1, 30.0), 30.0);
        assert_eq!(map_ratio(-0.5, 1.0, 20.0), 1.0);
    }

    #[test]
    fn test_nan_control_never_propagates() {
        assert_eq!(freq(f32::NAN), 20.0);
        assert_eq!(map_gain(f32::NAN, -60.0, 0.0), -60.0);
        assert!(map_ratio(f32::NAN, 1.0, 20.0).is_finite());
    }

    #[test]
    fn test_zero_lower_bound_stays_finite() {
        let hz = map_frequency(0.5, 0.0, 20000.0);
        assert!(hz.is_finite());
        assert!(hz > 0.0 && hz <= 20000.0);
        assert_eq!(map_frequency(1.0, 0.0, 20000.0), 20000.0);
        assert!(map_time(0.5, 0.0, 10.0).is_finite());
        assert!(map_q(0.5, -1.0, 30.0).is_finite());
        assert!(map_ratio(0.5, 0.0, 0.0).is_finite());

        let back = unmap_frequency(100.0, 0.0, 20000.0);
        assert!((0.0..=1.0).contains(&back));
    }

    #[test]
    fn test_inverted_range_is_swapped() {
        assert_eq!(map_frequency(0.0, 20000.0, 20.0), 20.0);
        assert_eq!(map_frequency(1.0, 20000.0, 20.0), 20000.0);
        assert_eq!(map_frequency(0.5, 20000.0, 20.0), freq(0.5));
        assert_eq!(map_time(0.25, 10.0, 0.001), map_time(0.25, 0.001, 10.0));
        assert_eq!(map_ratio(0.75, 20.0, 1.0), map_ratio(0.75, 1.0, 20.0));

        let back = unmap_frequency(100.0, 20000.0, 20.0);
        assert!((0.0..=1.0).contains(&back));
        assert_abs_diff_eq!(back, unmap_frequency(100.0, 20.0, 20000.0), epsilon = 1e-6);
    }

    #[test]
    fn test_nan_range_uses_defaults() {
        assert_eq!(map_frequency(0.5, f32::NAN, 20000.0), freq(0.5));
        assert_eq!(map_time(1.0, 0.001, f32::INFINITY), MAX_TIME_SECS);
        assert_eq!(map_q(0.0, f32::NAN, f32::NAN), MIN_Q);
        assert_eq!(map_gain(0.5, f32::NAN, 0.0), -30.0);
        assert_abs_diff_eq!(
            unmap_frequency(freq(0.3), f32::NAN, 20000.0),
            0.3,
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_degenerate_range_unmaps_to_zero() {
        assert_eq!(map_frequency(0.7, 440.0, 440.0), 440.0);
        assert_eq!(unmap_frequency(440.0, 440.0, 440.0), 0.0);
        assert_eq!(unmap_frequency(f32::NAN, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_gain_steps_equal_in_db() {
        let steps: Vec<f32> = [0.2, 0.4, 0.6, 0.8]
            .iter()
            .map(|&v| map_gain(v, MIN_GAIN_DB, MAX_GAIN_DB))
            .collect();
        let d1 = steps[1] - steps[0];
        for pair in steps.windows(2) {
            assert_abs_diff_eq!(pair[1] - pair[0], d1, epsilon = 0.01);
        }
    }

    #[test]
    fn test_db_to_gain() {
        assert_eq!(db_to_gain(0.0), 1.0);
        assert_abs_diff_eq!(db_to_gain(6.0), 2.0, epsilon = 0.01);
        assert_abs_diff_eq!(db_to_gain(-6.0), 0.5, epsilon = 0.01);
    }

    #[test]
    fn test_gain_db_roundtrip() {
        for db in [-100.0_f32, -60.0, -12.5, -3.0, 0.0, 3.0, 12.0, 24.0] {
            assert_abs_diff_eq!(gain_to_db(db_to_gain(db)), db, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_gain_to_db_floor() {
        assert_abs_diff_eq!(gain_to_db(0.0), -120.0, epsilon = 1e-3);
        assert_abs_diff_eq!(gain_to_db(-1.0), -120.0, epsilon = 1e-3);
        assert!(gain_to_db(f32::NAN).is_finite());
    }

    #[test]
    fn test_time_q_ratio_curves() {
        assert_abs_diff_eq!(map_time(0.5, 0.001, 10.0), 0.1, epsilon = 1e-4);
        assert_abs_diff_eq!(map_q(0.5, 0.1, 30.0), (0.1_f32 * 30.0).sqrt(), epsilon = 1e-4);
        assert_abs_diff_eq!(map_ratio(0.5, 1.0, 20.0), 20.0_f32.sqrt(), epsilon = 1e-4);
    }

    #[test]
    fn test_curve_kind_parse() {
        assert_eq!("frequency".parse::<CurveKind>().unwrap(), CurveKind::Frequency);
        assert_eq!("Q".parse::<CurveKind>().unwrap(), CurveKind::Q);
        assert!("wobble".parse::<CurveKind>().is_err());
    }

    #[test]
    fn test_apply_curve_ramps_target() {
        let mut target = Param::Ramped(RampedParam::new(20.0, 48000.0));
        let mapped = apply_curve(&mut target, 1.0, "frequency", 0.05).unwrap();
        assert_eq!(mapped, 20000.0);
        assert_eq!(target.value(), 20.0);
        assert_eq!(target.target(), 20000.0);
    }

    #[test]
    fn test_apply_curve_gain_writes_linear() {
        let mut target = Param::Plain(PlainParam::new(0.0));
        apply_curve_default(&mut target, 1.0, "gain").unwrap();
        assert_abs_diff_eq!(target.value(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_apply_curve_unknown_kind_is_noop() {
        let mut target = Param::Plain(PlainParam::new(0.25));
        assert!(apply_curve(&mut target, 1.0, "sideways", 0.05).is_none());
        assert_eq!(target.value(), 0.25);
    }
}
