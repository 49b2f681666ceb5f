//! Effect chain
//!
//! Units compose only by passing one unit's output buffer to the next
//! unit's input; no two units share internal nodes. Removing a unit from
//! the chain disposes it.
//!
//! Recommended order:
//! 1. Ducker (gain follows the sidechain)
//! 2. Width
//! 3. Reverse reverb (time-based)
//! 4. Trim
//! 5. Limiter (always last)

use tracing::debug;

use super::EffectUnit;
use crate::engine::AudioBuffer;
use crate::error::{FxError, Result};

/// Order priority for each unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChainPosition {
    Ducker = 0,
    Width = 1,
    ReverseReverb = 2,
    Trim = 3,
    Limiter = 4,
}

impl ChainPosition {
    /// Recommended position for an effect type
    pub fn for_effect_type(effect_type: &str) -> Self {
        match effect_type {
            "ducker" => ChainPosition::Ducker,
            "width" => ChainPosition::Width,
            "reverseReverb" => ChainPosition::ReverseReverb,
            "limiter" => ChainPosition::Limiter,
            _ => ChainPosition::Trim,
        }
    }
}

/// Ordered list of effect units sharing one signal path
pub struct EffectChain {
    units: Vec<Box<dyn EffectUnit>>,
    sample_rate: u32,
    max_block_size: usize,
}

impl EffectChain {
    pub fn new(sample_rate: u32, max_block_size: usize) -> Self {
        Self {
            units: Vec::new(),
            sample_rate,
            max_block_size,
        }
    }

    /// Prepare all units for processing
    pub fn prepare(&mut self, sample_rate: u32, max_block_size: usize) {
        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        for unit in &mut self.units {
            unit.prepare(sample_rate, max_block_size);
        }
    }

    pub fn reset(&mut self) {
        for unit in &mut self.units {
            unit.reset();
        }
    }

    /// Add a unit at its recommended position
    pub fn add(&mut self, mut unit: Box<dyn EffectUnit>) {
        unit.prepare(self.sample_rate, self.max_block_size);
        let position = self.recommended_position(unit.effect_type());
        debug!(effect = unit.effect_type(), position, "unit added");
        self.units.insert(position, unit);
    }

    /// Add a unit at a specific index
    pub fn add_at(&mut self, mut unit: Box<dyn EffectUnit>, index: usize) {
        unit.prepare(self.sample_rate, self.max_block_size);
        let index = index.min(self.units.len());
        self.units.insert(index, unit);
    }

    /// Remove and dispose a unit by ID
    pub fn remove(&mut self, unit_id: &str) -> Result<()> {
        let index = self
            .units
            .iter()
            .position(|u| u.id() == unit_id)
            .ok_or_else(|| FxError::UnknownSelector {
                kind: "effect unit",
                name: unit_id.to_string(),
            })?;

        let mut unit = self.units.remove(index);
        unit.dispose();
        debug!(effect = unit.effect_type(), id = unit_id, "unit removed");
        Ok(())
    }

    pub fn get(&self, unit_id: &str) -> Option<&dyn EffectUnit> {
        self.units
            .iter()
            .find(|u| u.id() == unit_id)
            .map(|u| u.as_ref())
    }

    pub fn get_mut(&mut self, unit_id: &str) -> Option<&mut (dyn EffectUnit + 'static)> {
        for unit in &mut self.units {
            if unit.id() == unit_id {
                return Some(unit.as_mut());
            }
        }
        None
    }

    /// Run the buffer through every unit in order
    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        for unit in &mut self.units {
            unit.process(buffer);
        }
    }

    /// Dispose every unit; used when the owning track is torn down
    pub fn dispose_all(&mut self) {
        for mut unit in self.units.drain(..) {
            unit.dispose();
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Effect types in processing order
    pub fn effect_types(&self) -> Vec<&'static str> {
        self.units.iter().map(|u| u.effect_type()).collect()
    }

    fn recommended_position(&self, effect_type: &str) -> usize {
        let priority = ChainPosition::for_effect_type(effect_type);
        self.units
            .iter()
            .position(|u| ChainPosition::for_effect_type(u.effect_type()) > priority)
            .unwrap_or(self.units.len())
    }
}

impl Default for EffectChain {
    fn default() -> Self {
        Self::new(crate::engine::DEFAULT_SAMPLE_RATE, 512)
    }
}

impl Drop for EffectChain {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
