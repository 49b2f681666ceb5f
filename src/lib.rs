//! fxcore - Real-time Audio Effect Processing Core
//!
//! Signal-processing units that sit inside an audio rendering graph and turn
//! control gestures (knob positions, note triggers, sidechain signals) into
//! click-free audio transformations.
//!
//! # Architecture
//!
//! - [`engine`]: planar audio buffers, node lifecycle, clocks and WAV I/O
//! - [`dsp`]: curve mapping, parameter ramps and the effect units
//!   (gain staging, ducker, stereo width, reverse reverb) plus the
//!   parameter router that addresses them by effect type
//! - [`config`]: serde defaults for every unit
//!
//! Every unit owns its internal nodes; units compose only by passing one
//! unit's output buffer to the next (see [`dsp::EffectChain`]).

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;

pub use config::FxConfig;
pub use error::{FxError, Result};
