//! Effect Parameter Router
//!
//! Translates an effect type plus a bag of high-level parameters into
//! ramped writes on that effect's controls. Dispatch is a closed
//! [`EffectKind`] enum matched exhaustively, so a new effect is a
//! compile-checked addition.
//!
//! The router never fails: unknown keys are skipped, unknown effect types
//! and mismatched node handles are logged and apply nothing. Keys match
//! case-insensitively with underscores ignored, so `recordLength`,
//! `record_length` and `RECORDLENGTH` are the same key.
//!
//! ```
//! use fxcore::dsp::router::{apply_effect_params, EffectNodes};
//! use fxcore::dsp::StereoWidthProcessor;
//! use serde_json::json;
//!
//! let mut width = StereoWidthProcessor::new(1.0, 48000);
//! let applied = apply_effect_params("width", EffectNodes::Width(&mut width), &json!({"width": 0.4}));
//! assert_eq!(applied, 1);
//! assert_eq!(width.width(), 0.4);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::dsp::ducker::SidechainDucker;
use crate::dsp::effect::EffectUnit;
use crate::dsp::gain_staging::GainStagingSupervisor;
use crate::dsp::ramp::{
    sanitize_ramp_seconds, Param, PlainParam, RampShape, RampedParam, DEFAULT_RAMP_SECONDS,
};
use crate::dsp::reverse_reverb::ReverseReverbEngine;
use crate::dsp::trim::Trim;
use crate::dsp::width::StereoWidthProcessor;
use crate::error::FxError;

// ============================================================================
// Effect kinds
// ============================================================================

/// Every effect type the router can address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    ReverseReverb,
    Width,
    Ducker,
    Limiter,
    Trim,
    /// Externally defined reverb addressed through a [`ControlSet`]
    Reverb,
    /// Externally defined delay addressed through a [`ControlSet`]
    Delay,
    /// Externally defined filter addressed through a [`ControlSet`]
    Filter,
}

impl EffectKind {
    pub const ALL: [EffectKind; 8] = [
        EffectKind::ReverseReverb,
        EffectKind::Width,
        EffectKind::Ducker,
        EffectKind::Limiter,
        EffectKind::Trim,
        EffectKind::Reverb,
        EffectKind::Delay,
        EffectKind::Filter,
    ];

    /// Canonical parameter names this kind accepts
    pub fn keys(self) -> &'static [&'static str] {
        match self {
            EffectKind::ReverseReverb => &[
                "wet",
                "predelay",
                "decay",
                "threshold",
                "cooldown",
                "recordLength",
            ],
            EffectKind::Width => &["width"],
            EffectKind::Ducker => &["ratio", "attack", "release"],
            EffectKind::Limiter => &["threshold"],
            EffectKind::Trim => &["level"],
            EffectKind::Reverb => &["wet", "decay", "predelay"],
            EffectKind::Delay => &["wet", "time", "feedback"],
            EffectKind::Filter => &["frequency", "q", "gain"],
        }
    }

    /// Whether this kind is addressed through a [`ControlSet`]
    pub fn is_external(self) -> bool {
        matches!(
            self,
            EffectKind::Reverb | EffectKind::Delay | EffectKind::Filter
        )
    }

    /// Resolve a (possibly aliased) key to its canonical name
    fn canonical_key(self, key: &str) -> Option<&'static str> {
        let wanted = normalize(key);
        self.keys().iter().copied().find(|k| normalize(k) == wanted)
    }
}

impl FromStr for EffectKind {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        EffectKind::ALL
            .iter()
            .copied()
            .find(|kind| normalize(&kind.to_string()) == wanted)
            .ok_or_else(|| FxError::UnknownSelector {
                kind: "effect type",
                name: s.to_string(),
            })
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectKind::ReverseReverb => "reverseReverb",
            EffectKind::Width => "width",
            EffectKind::Ducker => "ducker",
            EffectKind::Limiter => "limiter",
            EffectKind::Trim => "trim",
            EffectKind::Reverb => "reverb",
            EffectKind::Delay => "delay",
            EffectKind::Filter => "filter",
        };
        f.write_str(name)
    }
}

/// Lowercase and drop `_` / `-` separators
fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ============================================================================
// Control sets
// ============================================================================

/// Named controls of an externally defined effect node
#[derive(Debug, Clone)]
pub struct ControlSet {
    controls: BTreeMap<String, Param>,
    ramp_seconds: f32,
}

impl Default for ControlSet {
    fn default() -> Self {
        Self {
            controls: BTreeMap::new(),
            ramp_seconds: DEFAULT_RAMP_SECONDS,
        }
    }
}

impl ControlSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ramp time used when writing to rampable controls
    pub fn with_ramp_seconds(mut self, seconds: f32) -> Self {
        self.ramp_seconds = sanitize_ramp_seconds(seconds);
        self
    }

    pub fn ramp_seconds(&self) -> f32 {
        self.ramp_seconds
    }

    /// Add a control under `name`
    pub fn with(mut self, name: &str, param: impl Into<Param>) -> Self {
        self.controls.insert(name.to_string(), param.into());
        self
    }

    /// The usual controls for an external kind; empty for internal kinds
    pub fn for_kind(kind: EffectKind, sample_rate: f32) -> Self {
        let ramped = |value: f32, min: f32, max: f32| {
            RampedParam::new(value, sample_rate).with_range(min, max)
        };
        match kind {
            EffectKind::Reverb => Self::new()
                .with("wet", ramped(0.3, 0.0, 1.0))
                .with("decay", PlainParam::new(2.0).with_range(0.1, 20.0))
                .with("predelay", ramped(0.0, 0.0, 100.0)),
            EffectKind::Delay => Self::new()
                .with("wet", ramped(0.3, 0.0, 1.0))
                .with("time", ramped(0.25, 0.0, 2.0))
                .with("feedback", ramped(0.3, 0.0, 0.95)),
            EffectKind::Filter => Self::new()
                .with(
                    "frequency",
                    ramped(1000.0, 20.0, 20000.0).with_shape(RampShape::Exponential),
                )
                .with("q", PlainParam::new(0.707).with_range(0.1, 30.0))
                .with("gain", ramped(0.0, -24.0, 24.0)),
            _ => Self::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.controls.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.controls.get_mut(name)
    }

    /// Target value of a control
    pub fn value(&self, name: &str) -> Option<f32> {
        self.controls.get(name).map(Param::target)
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Handle on the node(s) an effect's parameters are written to
pub enum EffectNodes<'a> {
    ReverseReverb(&'a mut ReverseReverbEngine),
    Width(&'a mut StereoWidthProcessor),
    Ducker(&'a mut SidechainDucker),
    Limiter(&'a mut GainStagingSupervisor),
    Trim(&'a mut Trim),
    External(&'a mut ControlSet),
}

impl EffectNodes<'_> {
    fn describe(&self) -> &'static str {
        match self {
            EffectNodes::ReverseReverb(_) => "reverseReverb",
            EffectNodes::Width(_) => "width",
            EffectNodes::Ducker(_) => "ducker",
            EffectNodes::Limiter(_) => "limiter",
            EffectNodes::Trim(_) => "trim",
            EffectNodes::External(_) => "external",
        }
    }
}

/// Apply every recognized key in `params` to `nodes`
///
/// Returns the number of writes applied.
pub fn apply_params(kind: EffectKind, mut nodes: EffectNodes<'_>, params: &Value) -> usize {
    let Some(bag) = params.as_object() else {
        warn!(effect = %kind, "parameter bag is not an object; nothing applied");
        return 0;
    };

    let mut applied = 0;
    for (key, value) in bag {
        let Some(canonical) = kind.canonical_key(key) else {
            debug!(effect = %kind, key, "ignoring unknown parameter");
            continue;
        };
        let Some(v) = value.as_f64().map(|v| v as f32) else {
            debug!(effect = %kind, key, %value, "ignoring non-numeric parameter");
            continue;
        };
        if !v.is_finite() {
            debug!(effect = %kind, key, %value, "ignoring non-finite parameter");
            continue;
        }
        match write(kind, &mut nodes, canonical, v) {
            Write::Applied => applied += 1,
            Write::Skipped => {}
            Write::Mismatch => {
                warn!(
                    effect = %kind,
                    nodes = nodes.describe(),
                    "node handles do not match effect type; nothing applied"
                );
                return 0;
            }
        }
    }
    applied
}

/// [`apply_params`] keyed by effect type name
///
/// Unknown effect types are logged and apply nothing.
pub fn apply_effect_params(effect_type: &str, nodes: EffectNodes<'_>, params: &Value) -> usize {
    match effect_type.parse::<EffectKind>() {
        Ok(kind) => apply_params(kind, nodes, params),
        Err(err) => {
            warn!(%err, "no parameters applied");
            0
        }
    }
}

enum Write {
    Applied,
    Skipped,
    Mismatch,
}

fn write(kind: EffectKind, nodes: &mut EffectNodes<'_>, key: &'static str, v: f32) -> Write {
    match (kind, nodes) {
        (EffectKind::ReverseReverb, EffectNodes::ReverseReverb(engine)) => {
            match key {
                "wet" => engine.set_wet(v),
                "predelay" => engine.set_predelay(v),
                "decay" => engine.set_decay(v),
                "threshold" => engine.set_threshold(v),
                "cooldown" => engine.set_cooldown_ms(v.max(0.0) as u64),
                "recordLength" => engine.set_record_length(v),
                _ => return Write::Skipped,
            }
            Write::Applied
        }
        (EffectKind::Width, EffectNodes::Width(width)) => {
            width.set_width(v);
            Write::Applied
        }
        (EffectKind::Ducker, EffectNodes::Ducker(ducker)) => {
            match key {
                "ratio" => ducker.set_ratio(v),
                "attack" => ducker.set_attack(v),
                "release" => ducker.set_release(v),
                _ => return Write::Skipped,
            }
            Write::Applied
        }
        (EffectKind::Limiter, EffectNodes::Limiter(supervisor)) => {
            match supervisor.set_threshold(v) {
                Ok(()) => Write::Applied,
                Err(err) => {
                    warn!(%err, "limiter threshold not applied");
                    Write::Skipped
                }
            }
        }
        (EffectKind::Trim, EffectNodes::Trim(trim)) => {
            let ramp_seconds = trim.ramp_seconds();
            trim.set_level(v, ramp_seconds);
            Write::Applied
        }
        (kind, EffectNodes::External(controls)) if kind.is_external() => {
            let ramp_seconds = controls.ramp_seconds;
            match controls.get_mut(key) {
                Some(param) => {
                    param.ramp_to(v, ramp_seconds);
                    Write::Applied
                }
                None => {
                    debug!(effect = %kind, key, "control not present on node");
                    Write::Skipped
                }
            }
        }
        _ => Write::Mismatch,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ManualClock;
    use crate::config::ReverseReverbConfig;
    use serde_json::json;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("reverseReverb".parse::<EffectKind>().unwrap(), EffectKind::ReverseReverb);
        assert_eq!("reverse_reverb".parse::<EffectKind>().unwrap(), EffectKind::ReverseReverb);
        assert_eq!("WIDTH".parse::<EffectKind>().unwrap(), EffectKind::Width);
        assert!(matches!(
            "chorus".parse::<EffectKind>(),
            Err(FxError::UnknownSelector { .. })
        ));
        for kind in EffectKind::ALL {
            assert_eq!(kind.to_string().parse::<EffectKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_reverse_reverb_keys() {
        let clock = ManualClock::new(0);
        let mut engine = ReverseReverbEngine::with_default_reverb(
            &ReverseReverbConfig::default(),
            clock.shared(),
            8000,
        );
        let params = json!({
            "wet": 0.8,
            "predelay": 50.0,
            "decay": 6.0,
            "threshold": 0.05,
            "cooldown": 1000,
            "record_length": 1.0,
        });
        let applied = apply_params(
            EffectKind::ReverseReverb,
            EffectNodes::ReverseReverb(&mut engine),
            &params,
        );
        assert_eq!(applied, 6);
        assert_eq!(engine.wet(), 0.8);
        assert_eq!(engine.predelay_ms(), 50.0);
        assert_eq!(engine.decay(), 6.0);
        assert_eq!(engine.amplitude_threshold(), 0.05);
        assert_eq!(engine.cooldown_ms(), 1000);
        assert_eq!(engine.record_length_secs(), 1.0);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut width = StereoWidthProcessor::new(1.0, 48000);
        let applied = apply_effect_params(
            "width",
            EffectNodes::Width(&mut width),
            &json!({"width": 0.5, "shimmer": 1.0, "mode": "wide"}),
        );
        assert_eq!(applied, 1);
        assert_eq!(width.width(), 0.5);
    }

    #[test]
    fn test_unknown_effect_type_applies_nothing() {
        let mut width = StereoWidthProcessor::new(1.0, 48000);
        let applied = apply_effect_params(
            "chorus",
            EffectNodes::Width(&mut width),
            &json!({"width": 0.5}),
        );
        assert_eq!(applied, 0);
        assert_eq!(width.width(), 1.0);
    }

    #[test]
    fn test_mismatched_nodes_apply_nothing() {
        let mut trim = Trim::default();
        let applied = apply_params(
            EffectKind::Width,
            EffectNodes::Trim(&mut trim),
            &json!({"width": 0.5}),
        );
        assert_eq!(applied, 0);
        assert_eq!(trim.level_db(), 0.0);
    }

    #[test]
    fn test_malformed_input_never_panics() {
        let mut ducker = SidechainDucker::new(0.5, 0.01, 0.1, 48000);
        for params in [
            json!(null),
            json!([1, 2, 3]),
            json!("ratio"),
            json!({"ratio": null}),
            json!({"ratio": {"nested": 1}}),
            json!({"ratio": 1e300}),
        ] {
            apply_params(EffectKind::Ducker, EffectNodes::Ducker(&mut ducker), &params);
        }
        assert!((0.0..=1.0).contains(&ducker.ratio()));
    }

    #[test]
    fn test_non_finite_values_not_counted() {
        let mut ducker = SidechainDucker::new(0.5, 0.01, 0.1, 48000);
        let applied = apply_params(
            EffectKind::Ducker,
            EffectNodes::Ducker(&mut ducker),
            &json!({"ratio": 1e300, "release": -1e300}),
        );
        assert_eq!(applied, 0);
        assert_eq!(ducker.ratio(), 0.5);
        assert_eq!(ducker.release(), 0.1);

        let mut delay = ControlSet::for_kind(EffectKind::Delay, 48000.0);
        let applied = apply_params(
            EffectKind::Delay,
            EffectNodes::External(&mut delay),
            &json!({"time": 1e300, "feedback": 0.5}),
        );
        assert_eq!(applied, 1);
        assert_eq!(delay.value("time"), Some(0.25));
    }

    #[test]
    fn test_ramp_seconds_follow_the_nodes() {
        let mut trim = Trim::new(0.0, 48000);
        trim.set_ramp_seconds(0.0);
        apply_params(EffectKind::Trim, EffectNodes::Trim(&mut trim), &json!({"level": -6.0}));
        assert_eq!(trim.level_db(), -6.0);
        assert!(trim.gain_linear() < 0.51);

        let mut filter =
            ControlSet::for_kind(EffectKind::Filter, 48000.0).with_ramp_seconds(0.0);
        apply_params(
            EffectKind::Filter,
            EffectNodes::External(&mut filter),
            &json!({"frequency": 4000.0}),
        );
        assert_eq!(filter.get("frequency").unwrap().value(), 4000.0);
        assert_eq!(ControlSet::new().ramp_seconds(), DEFAULT_RAMP_SECONDS);
    }

    #[test]
    fn test_ducker_keys() {
        let mut ducker = SidechainDucker::new(0.5, 0.01, 0.1, 48000);
        let applied = apply_params(
            EffectKind::Ducker,
            EffectNodes::Ducker(&mut ducker),
            &json!({"ratio": 0.9, "attack": 0.02, "release": 0.3}),
        );
        assert_eq!(applied, 3);
        assert_eq!(ducker.ratio(), 0.9);
        assert_eq!(ducker.release(), 0.3);
    }

    #[test]
    fn test_limiter_requires_initialization() {
        let mut supervisor = GainStagingSupervisor::new();
        let params = json!({"threshold": -6.0});
        assert_eq!(
            apply_params(EffectKind::Limiter, EffectNodes::Limiter(&mut supervisor), &params),
            0
        );
        supervisor.initialize_master_limiter();
        assert_eq!(
            apply_params(EffectKind::Limiter, EffectNodes::Limiter(&mut supervisor), &params),
            1
        );
        assert_eq!(supervisor.threshold().unwrap(), -6.0);
    }

    #[test]
    fn test_trim_level() {
        let mut trim = Trim::default();
        apply_params(EffectKind::Trim, EffectNodes::Trim(&mut trim), &json!({"level": -4.0}));
        assert_eq!(trim.level_db(), -4.0);
    }

    #[test]
    fn test_external_controls_ramp_or_set() {
        let mut filter = ControlSet::for_kind(EffectKind::Filter, 48000.0);
        let applied = apply_params(
            EffectKind::Filter,
            EffectNodes::External(&mut filter),
            &json!({"frequency": 4000.0, "Q": 2.0, "gain": 3.0}),
        );
        assert_eq!(applied, 3);

        // Ramped controls head for the target; plain ones jump
        let frequency = filter.get("frequency").unwrap();
        assert!(frequency.is_rampable());
        assert_eq!(frequency.value(), 1000.0);
        assert_eq!(frequency.target(), 4000.0);
        assert_eq!(filter.get("q").unwrap().value(), 2.0);
    }

    #[test]
    fn test_external_missing_control_skipped() {
        let mut delay = ControlSet::new().with("time", RampedParam::new(0.25, 48000.0));
        let applied = apply_params(
            EffectKind::Delay,
            EffectNodes::External(&mut delay),
            &json!({"time": 0.5, "feedback": 0.4}),
        );
        assert_eq!(applied, 1);
        assert_eq!(delay.value("time"), Some(0.5));
    }

    #[test]
    fn test_internal_kind_with_external_nodes_is_mismatch() {
        let mut controls = ControlSet::new().with("width", PlainParam::new(1.0));
        let applied = apply_params(
            EffectKind::Width,
            EffectNodes::External(&mut controls),
            &json!({"width": 0.2}),
        );
        assert_eq!(applied, 0);
        assert_eq!(controls.value("width"), Some(1.0));
    }
}
