//! Effect processing core
//!
//! Pure control-curve mapping and parameter ramping at the bottom, the
//! effect units built on them, and the parameter router on top. Every unit
//! implements [`EffectUnit`] for uniform processing.

pub mod chain;
pub mod curves;
pub mod ducker;
pub mod effect;
pub mod envelope;
pub mod gain_staging;
pub mod limiter;
pub mod ramp;
pub mod reverb;
pub mod reverse_reverb;
pub mod router;
pub mod trim;
pub mod width;

pub use chain::{ChainPosition, EffectChain};
pub use curves::{apply_curve, apply_curve_default, db_to_gain, gain_to_db, CurveKind};
pub use ducker::SidechainDucker;
pub use effect::{EffectUnit, UnitParams};
pub use envelope::EnvelopeFollower;
pub use gain_staging::{GainStagingSupervisor, HeadroomTarget};
pub use limiter::MasterLimiter;
pub use ramp::{Param, PlainParam, RampShape, RampedParam, DEFAULT_RAMP_SECONDS};
pub use reverb::{Freeverb, ReverbUnit};
pub use reverse_reverb::{EngineState, ReverseReverbEngine, TriggerOutcome, TriggerState};
pub use router::{apply_effect_params, apply_params, ControlSet, EffectKind, EffectNodes};
pub use trim::Trim;
pub use width::StereoWidthProcessor;
