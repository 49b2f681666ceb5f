//! Unit defaults
//!
//! Every field has a default, so a partial JSON document (or `{}`) is a
//! valid configuration. Values are not range-checked here; each unit's
//! `from_config` runs them through the same clamps as its setters.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dsp::ramp::DEFAULT_RAMP_SECONDS;
use crate::error::Result;

/// Top-level configuration for the effect core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    /// Ramp time for parameter writes, in seconds (0 snaps)
    pub ramp_seconds: f32,
    pub limiter: LimiterConfig,
    pub ducker: DuckerConfig,
    pub width: WidthConfig,
    pub reverse_reverb: ReverseReverbConfig,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            ramp_seconds: DEFAULT_RAMP_SECONDS,
            limiter: LimiterConfig::default(),
            ducker: DuckerConfig::default(),
            width: WidthConfig::default(),
            reverse_reverb: ReverseReverbConfig::default(),
        }
    }
}

impl FxConfig {
    /// Parse a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Master limiter defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub threshold_db: f32,
    pub release_ms: f32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            threshold_db: -3.0,
            release_ms: 100.0,
        }
    }
}

/// Sidechain ducker defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckerConfig {
    /// Fraction of duck, 0 to 1
    pub ratio: f32,
    /// Envelope attack in seconds
    pub attack: f32,
    /// Envelope release in seconds
    pub release: f32,
}

impl Default for DuckerConfig {
    fn default() -> Self {
        Self {
            ratio: 0.5,
            attack: 0.01,
            release: 0.1,
        }
    }
}

/// Stereo width defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidthConfig {
    pub width: f32,
}

impl Default for WidthConfig {
    fn default() -> Self {
        Self { width: 1.0 }
    }
}

/// Reverse reverb defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverseReverbConfig {
    /// RMS level above which the monitor triggers a capture
    pub amplitude_threshold: f32,
    /// Minimum time between triggers
    pub cooldown_ms: u64,
    /// Capture window length
    pub record_length_secs: f32,
    /// Period of the auto-trigger check
    pub monitor_interval_ms: u64,
    pub predelay_ms: f32,
    pub wet: f32,
    /// Reverb tail length handed to the reverberation unit
    pub decay_secs: f32,
}

impl Default for ReverseReverbConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: 0.01,
            cooldown_ms: 3000,
            record_length_secs: 2.0,
            monitor_interval_ms: 500,
            predelay_ms: 30.0,
            wet: 0.5,
            decay_secs: 4.0,
        }
    }
}
