//! Effect unit trait definition
//!
//! Every stateful processor in the core implements [`EffectUnit`]. A unit
//! owns its internal nodes exclusively; units compose only by feeding one
//! unit's output buffer into the next unit's input (see `EffectChain`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dsp::ramp::DEFAULT_RAMP_SECONDS;
use crate::engine::AudioBuffer;
use crate::error::{FxError, Result};

/// Identity and lifecycle flags common to all units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitParams {
    /// Unique identifier for this unit instance
    pub id: String,
    /// Whether the unit has been disposed
    #[serde(skip)]
    pub disposed: bool,
    /// Ramp time for parameter writes, in seconds
    #[serde(default = "default_ramp_seconds")]
    pub ramp_seconds: f32,
}

fn default_ramp_seconds() -> f32 {
    DEFAULT_RAMP_SECONDS
}

impl Default for UnitParams {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            disposed: false,
            ramp_seconds: DEFAULT_RAMP_SECONDS,
        }
    }
}

/// Base trait for all effect units
///
/// `process` reads the unit's input from the buffer and leaves its output
/// in place. After `dispose` a unit passes audio through untouched and
/// rejects parameter writes with [`FxError::Disposed`].
pub trait EffectUnit: Send {
    /// Process audio buffer in-place
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Prepare the unit for processing at a new sample rate
    fn prepare(&mut self, sample_rate: u32, max_block_size: usize);

    /// Clear internal state (envelopes, delay lines, voices)
    fn reset(&mut self);

    /// Get the effect type identifier
    fn effect_type(&self) -> &'static str;

    /// Get the unique instance ID
    fn id(&self) -> &str;

    /// Set the unique instance ID
    fn set_id(&mut self, id: String);

    /// Set a single parameter by name, ramping where the control supports it
    fn set_parameter(&mut self, name: &str, value: &Value) -> Result<()>;

    /// Get all parameters as JSON (for UI/preset layers)
    fn get_params(&self) -> Value;

    /// Ramp time used by parameter writes
    fn ramp_seconds(&self) -> f32;

    /// Change the ramp time for later parameter writes; 0 snaps
    fn set_ramp_seconds(&mut self, seconds: f32);

    /// Release every internal node; safe to call more than once
    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;
}

/// Read a numeric parameter value
pub(crate) fn number(name: &str, value: &Value) -> Result<f32> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| FxError::expected_number(name, value))
}

/// Fail parameter writes on a disposed unit
pub(crate) fn ensure_live(params: &UnitParams, effect_type: &str) -> Result<()> {
    if params.disposed {
        return Err(FxError::Disposed {
            component: format!("{} {}", effect_type, params.id),
        });
    }
    Ok(())
}

/// Helper macro to implement common EffectUnit trait methods
#[macro_export]
macro_rules! impl_unit_common {
    ($effect_type:expr) => {
        fn effect_type(&self) -> &'static str {
            $effect_type
        }

        fn id(&self) -> &str {
            &self.unit.id
        }

        fn set_id(&mut self, id: String) {
            self.unit.id = id;
        }

        fn is_disposed(&self) -> bool {
            self.unit.disposed
        }

        fn ramp_seconds(&self) -> f32 {
            self.unit.ramp_seconds
        }

        fn set_ramp_seconds(&mut self, seconds: f32) {
            self.unit.ramp_seconds = $crate::dsp::ramp::sanitize_ramp_seconds(seconds);
        }
    };
}
