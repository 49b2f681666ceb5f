//! Gain staging supervision
//!
//! Owns the master limiter at the end of the signal path, hands out bounded
//! trims, and checks live levels against the headroom table.
//!
//! Nothing is constructed implicitly: the limiter exists only between
//! [`GainStagingSupervisor::initialize_master_limiter`] and
//! [`GainStagingSupervisor::dispose`], and accessors outside that window
//! return [`FxError::NotInitialized`].

use std::fmt;
use std::sync::Mutex;

use tracing::debug;

use crate::config::LimiterConfig;
use crate::dsp::effect::EffectUnit;
use crate::dsp::limiter::{MasterLimiter, DEFAULT_THRESHOLD_DB};
use crate::dsp::ramp::{sanitize_ramp_seconds, DEFAULT_RAMP_SECONDS};
use crate::dsp::trim::Trim;
use crate::engine::{AudioBuffer, DEFAULT_SAMPLE_RATE};
use crate::error::{FxError, Result};

const COMPONENT: &str = "master limiter";

// ============================================================================
// Headroom
// ============================================================================

/// Expected maximum level at a named stage of the signal path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeadroomTarget {
    Instrument,
    EffectSend,
    MixBus,
    Master,
}

impl HeadroomTarget {
    pub const ALL: [HeadroomTarget; 4] = [
        HeadroomTarget::Instrument,
        HeadroomTarget::EffectSend,
        HeadroomTarget::MixBus,
        HeadroomTarget::Master,
    ];

    /// Target level in dB
    pub const fn db(self) -> f32 {
        match self {
            HeadroomTarget::Instrument => -12.0,
            HeadroomTarget::EffectSend => -18.0,
            HeadroomTarget::MixBus => -6.0,
            HeadroomTarget::Master => -3.0,
        }
    }
}

impl fmt::Display for HeadroomTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeadroomTarget::Instrument => "instrument",
            HeadroomTarget::EffectSend => "effect send",
            HeadroomTarget::MixBus => "mix bus",
            HeadroomTarget::Master => "master",
        };
        write!(f, "{} ({} dB)", name, self.db())
    }
}

/// `current_db <= target`; equality counts as safe
pub fn is_within_headroom(current_db: f32, target_db: f32) -> bool {
    current_db <= target_db
}

/// `target - current_db`: positive is safe margin, negative is clipping risk
pub fn calculate_headroom_margin(current_db: f32, target_db: f32) -> f32 {
    target_db - current_db
}

// ============================================================================
// Supervisor
// ============================================================================

/// Master limiter lifecycle plus trim helpers
#[derive(Debug)]
pub struct GainStagingSupervisor {
    limiter: Option<MasterLimiter>,
    sample_rate: u32,
    threshold_db: f32,
    release_ms: f32,
    ramp_seconds: f32,
}

impl GainStagingSupervisor {
    /// Create a supervisor with no limiter
    pub const fn new() -> Self {
        Self {
            limiter: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            threshold_db: DEFAULT_THRESHOLD_DB,
            release_ms: 100.0,
            ramp_seconds: DEFAULT_RAMP_SECONDS,
        }
    }

    /// Create a supervisor whose limiter will use the given defaults
    pub fn from_config(config: &LimiterConfig, sample_rate: u32) -> Self {
        Self {
            limiter: None,
            sample_rate,
            threshold_db: config.threshold_db,
            release_ms: config.release_ms,
            ramp_seconds: DEFAULT_RAMP_SECONDS,
        }
    }

    /// Ramp time for threshold changes, applied to the current and any
    /// future limiter
    pub fn set_ramp_seconds(&mut self, seconds: f32) {
        self.ramp_seconds = sanitize_ramp_seconds(seconds);
        if let Some(limiter) = self.limiter.as_mut() {
            limiter.set_ramp_seconds(self.ramp_seconds);
        }
    }

    pub fn ramp_seconds(&self) -> f32 {
        self.ramp_seconds
    }

    /// Construct the master limiter; returns false if it already exists
    pub fn initialize_master_limiter(&mut self) -> bool {
        if self.limiter.is_some() {
            return false;
        }
        let mut limiter = MasterLimiter::new(self.threshold_db, self.sample_rate);
        limiter.set_release_ms(self.release_ms);
        limiter.set_ramp_seconds(self.ramp_seconds);
        debug!(
            threshold_db = limiter.threshold(),
            sample_rate = self.sample_rate,
            "master limiter initialized"
        );
        self.limiter = Some(limiter);
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.limiter.is_some()
    }

    /// Ramp the limiter threshold to `db`, clamped to [-20, 0] dB, over the configured ramp time
    pub fn set_threshold(&mut self, db: f32) -> Result<()> {
        let ramp_seconds = self.ramp_seconds;
        self.limiter_mut()?.set_threshold(db, ramp_seconds);
        Ok(())
    }

    /// Threshold the limiter is settling on, in dB
    pub fn threshold(&self) -> Result<f32> {
        Ok(self.limiter()?.threshold())
    }

    /// Current gain reduction in dB (0 or negative)
    pub fn get_reduction(&self) -> Result<f32> {
        Ok(self.limiter()?.reduction())
    }

    /// Run the final stage of the signal path through the limiter
    pub fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        self.limiter_mut()?.process(buffer);
        Ok(())
    }

    /// Update the sample rate for the current and any future limiter
    pub fn prepare(&mut self, sample_rate: u32, max_block_size: usize) {
        self.sample_rate = sample_rate;
        if let Some(limiter) = self.limiter.as_mut() {
            limiter.prepare(sample_rate, max_block_size);
        }
    }

    /// Release the limiter; a later `initialize_master_limiter` builds a new one
    pub fn dispose(&mut self) {
        if let Some(mut limiter) = self.limiter.take() {
            limiter.dispose();
            debug!("master limiter released");
        }
    }

    /// Create a trim clamped to [-12, +3] dB
    pub fn create_trim(&self, initial_db: f32) -> Trim {
        let mut trim = Trim::new(initial_db, self.sample_rate);
        trim.set_ramp_seconds(self.ramp_seconds);
        trim
    }

    /// Ramp a trim to `db` over `ramp_seconds`
    pub fn set_trim_level(trim: &mut Trim, db: f32, ramp_seconds: f32) {
        trim.set_level(db, ramp_seconds);
    }

    /// Level in dB a trim is settling on
    pub fn get_trim_level(trim: &Trim) -> f32 {
        trim.level_db()
    }

    fn limiter(&self) -> Result<&MasterLimiter> {
        self.limiter.as_ref().ok_or(FxError::NotInitialized {
            component: COMPONENT,
        })
    }

    fn limiter_mut(&mut self) -> Result<&mut MasterLimiter> {
        self.limiter.as_mut().ok_or(FxError::NotInitialized {
            component: COMPONENT,
        })
    }
}

impl Default for GainStagingSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: Mutex<GainStagingSupervisor> = Mutex::new(GainStagingSupervisor::new());

/// The process-wide supervisor
///
/// Starts with no limiter; callers must `initialize_master_limiter` before
/// using the threshold or reduction accessors.
pub fn global() -> &'static Mutex<GainStagingSupervisor> {
    &GLOBAL
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChannelLayout;

    #[test]
    fn test_headroom_table() {
        assert_eq!(HeadroomTarget::Instrument.db(), -12.0);
        assert_eq!(HeadroomTarget::EffectSend.db(), -18.0);
        assert_eq!(HeadroomTarget::MixBus.db(), -6.0);
        assert_eq!(HeadroomTarget::Master.db(), -3.0);
    }

    #[test]
    fn test_headroom_checks() {
        assert!(is_within_headroom(-3.0, -3.0));
        assert!(!is_within_headroom(-2.0, -3.0));
        assert_eq!(calculate_headroom_margin(-6.0, -3.0), 3.0);
        assert_eq!(calculate_headroom_margin(0.0, HeadroomTarget::Master.db()), -3.0);
    }

    #[test]
    fn test_accessors_before_init_fail() {
        let mut supervisor = GainStagingSupervisor::new();
        assert!(!supervisor.is_initialized());
        assert!(matches!(
            supervisor.get_reduction(),
            Err(FxError::NotInitialized { .. })
        ));
        assert!(matches!(
            supervisor.set_threshold(-6.0),
            Err(FxError::NotInitialized { .. })
        ));
        assert!(supervisor.threshold().is_err());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut supervisor = GainStagingSupervisor::new();
        assert!(supervisor.initialize_master_limiter());
        supervisor.set_threshold(-10.0).unwrap();
        assert!(!supervisor.initialize_master_limiter());
        // Second call did not replace the limiter
        assert_eq!(supervisor.threshold().unwrap(), -10.0);
    }

    #[test]
    fn test_default_threshold_and_clamp() {
        let mut supervisor = GainStagingSupervisor::new();
        supervisor.initialize_master_limiter();
        assert_eq!(supervisor.threshold().unwrap(), -3.0);
        supervisor.set_threshold(-50.0).unwrap();
        assert_eq!(supervisor.threshold().unwrap(), -20.0);
        supervisor.set_threshold(5.0).unwrap();
        assert_eq!(supervisor.threshold().unwrap(), 0.0);
    }

    #[test]
    fn test_dispose_then_accessors_fail() {
        let mut supervisor = GainStagingSupervisor::new();
        supervisor.initialize_master_limiter();
        assert_eq!(supervisor.get_reduction().unwrap(), 0.0);
        supervisor.dispose();
        assert!(!supervisor.is_initialized());
        assert!(supervisor.get_reduction().is_err());
        supervisor.dispose();
    }

    #[test]
    fn test_reduction_reported_while_limiting() {
        let mut supervisor = GainStagingSupervisor::new();
        supervisor.initialize_master_limiter();
        let mut buffer = AudioBuffer::new(2000, ChannelLayout::Stereo);
        for ch in 0..2 {
            buffer.channel_mut(ch).fill(1.0);
        }
        supervisor.process(&mut buffer).unwrap();
        assert!(supervisor.get_reduction().unwrap() < 0.0);
    }

    #[test]
    fn test_trim_helpers() {
        let supervisor = GainStagingSupervisor::new();
        let mut trim = supervisor.create_trim(0.0);
        GainStagingSupervisor::set_trim_level(&mut trim, 6.0, 0.05);
        assert_eq!(GainStagingSupervisor::get_trim_level(&trim), 3.0);
        GainStagingSupervisor::set_trim_level(&mut trim, -4.5, 0.05);
        assert_eq!(GainStagingSupervisor::get_trim_level(&trim), -4.5);
    }

    #[test]
    fn test_ramp_seconds_reaches_limiter_and_trims() {
        let mut supervisor = GainStagingSupervisor::new();
        assert_eq!(supervisor.ramp_seconds(), DEFAULT_RAMP_SECONDS);

        supervisor.set_ramp_seconds(0.2);
        supervisor.initialize_master_limiter();
        assert_eq!(supervisor.limiter().unwrap().ramp_seconds(), 0.2);
        assert_eq!(supervisor.create_trim(0.0).ramp_seconds(), 0.2);

        supervisor.set_ramp_seconds(f32::NAN);
        assert_eq!(supervisor.ramp_seconds(), DEFAULT_RAMP_SECONDS);
        assert_eq!(
            supervisor.limiter().unwrap().ramp_seconds(),
            DEFAULT_RAMP_SECONDS
        );
    }

    #[test]
    fn test_global_starts_uninitialized_until_init() {
        let mut supervisor = global().lock().unwrap();
        supervisor.dispose();
        assert!(supervisor.get_reduction().is_err());
        supervisor.initialize_master_limiter();
        assert!(supervisor.get_reduction().is_ok());
        supervisor.dispose();
    }
}
