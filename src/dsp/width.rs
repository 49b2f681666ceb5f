//! Stereo Width Processor
//!
//! Mid/side matrix with a width control on the side component:
//!
//! ```text
//! Mid   = 0.5 * (L + R)
//! Side  = 0.5 * (L - R) * width
//! L'    = Mid + Side
//! R'    = Mid - Side
//! ```
//!
//! The matrix is built from four scaling gains (`0.5`, `0.5`, `0.5 * width`,
//! `-0.5 * width`) between a splitter, two summing junctions and a merger.
//! Width 0 collapses to mono, 1 leaves the image untouched and 2 doubles
//! the side content. Mono buffers pass through unchanged.

use serde_json::{json, Value};
use tracing::{debug, Span};

use crate::config::WidthConfig;
use crate::dsp::effect::{ensure_live, number, EffectUnit, UnitParams};
use crate::engine::{dispose_isolated, wire, AudioBuffer, GainNode, RoutingNode};
use crate::error::{FxError, Result};
use crate::impl_unit_common;

/// Minimum width (mono)
pub const MIN_WIDTH: f32 = 0.0;

/// Maximum width (side doubled)
pub const MAX_WIDTH: f32 = 2.0;

/// Mid/side stereo width control
#[derive(Debug)]
pub struct StereoWidthProcessor {
    unit: UnitParams,
    width: f32,
    splitter: RoutingNode,
    mid_left: GainNode,
    mid_right: GainNode,
    side_left: GainNode,
    side_right: GainNode,
    left_sum: RoutingNode,
    right_sum: RoutingNode,
    merger: RoutingNode,
    span: Span,
}

impl StereoWidthProcessor {
    /// Create a processor at `width` (clamped to [0, 2]), applied immediately
    pub fn new(width: f32, sample_rate: u32) -> Self {
        let width = clamp_width(width);
        let sample_rate = sample_rate.max(1) as f32;

        let mut splitter = RoutingNode::new("width.splitter");
        let mut mid_left = GainNode::new("width.mid_left", 0.5, sample_rate);
        let mut mid_right = GainNode::new("width.mid_right", 0.5, sample_rate);
        let mut side_left = GainNode::new("width.side_left", 0.5 * width, sample_rate);
        let mut side_right = GainNode::new("width.side_right", -0.5 * width, sample_rate);
        let mut left_sum = RoutingNode::new("width.left_sum");
        let mut right_sum = RoutingNode::new("width.right_sum");
        let merger = RoutingNode::new("width.merger");

        for gain in [&mid_left, &mid_right, &side_left, &side_right] {
            wire("width", &mut splitter, gain);
        }
        // Mid feeds both sums; side is added on the left and subtracted on the right
        for gain in [&mut mid_left, &mut side_left] {
            wire("width", gain, &left_sum);
        }
        for gain in [&mut mid_right, &mut side_right] {
            wire("width", gain, &right_sum);
        }
        wire("width", &mut left_sum, &merger);
        wire("width", &mut right_sum, &merger);

        Self {
            unit: UnitParams::default(),
            width,
            splitter,
            mid_left,
            mid_right,
            side_left,
            side_right,
            left_sum,
            right_sum,
            merger,
            span: tracing::debug_span!("width"),
        }
    }

    pub fn from_config(config: &WidthConfig, sample_rate: u32) -> Self {
        Self::new(config.width, sample_rate)
    }

    /// Record this unit's events under `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Ramp the width to `amount`, clamped to [0, 2], over the unit ramp time
    pub fn set_width(&mut self, amount: f32) {
        if !amount.is_finite() {
            return;
        }
        self.width = clamp_width(amount);
        self.side_left
            .gain_mut()
            .ramp_to(0.5 * self.width, self.unit.ramp_seconds);
        self.side_right
            .gain_mut()
            .ramp_to(-0.5 * self.width, self.unit.ramp_seconds);
    }

    /// Width the processor is settling on
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Run one stereo frame through the matrix
    #[inline]
    pub fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let mid = self.mid_left.process(left) + self.mid_right.process(right);
        let side = self.side_left.process(left) + self.side_right.process(right);
        (mid + side, mid - side)
    }
}

fn clamp_width(width: f32) -> f32 {
    if width.is_nan() {
        1.0
    } else {
        width.clamp(MIN_WIDTH, MAX_WIDTH)
    }
}

impl EffectUnit for StereoWidthProcessor {
    impl_unit_common!("width");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.unit.disposed || buffer.num_channels() < 2 {
            return;
        }
        for i in 0..buffer.num_samples() {
            let (left, right) = buffer.frame(i);
            let (left, right) = self.process_frame(left, right);
            buffer.set_frame(i, left, right);
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        let sample_rate = sample_rate as f32;
        for gain in [
            &mut self.mid_left,
            &mut self.mid_right,
            &mut self.side_left,
            &mut self.side_right,
        ] {
            gain.gain_mut().set_sample_rate(sample_rate);
        }
    }

    fn reset(&mut self) {
        self.side_left.gain_mut().set_immediate(0.5 * self.width);
        self.side_right.gain_mut().set_immediate(-0.5 * self.width);
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> Result<()> {
        ensure_live(&self.unit, "width")?;
        match name {
            "width" => {
                self.set_width(number(name, value)?);
                Ok(())
            }
            _ => Err(FxError::UnknownSelector {
                kind: "width parameter",
                name: name.to_string(),
            }),
        }
    }

    fn get_params(&self) -> Value {
        json!({ "width": self.width })
    }

    fn dispose(&mut self) {
        let _enter = self.span.enter();
        if self.unit.disposed {
            debug!("width already disposed");
            return;
        }
        self.unit.disposed = true;
        let released = dispose_isolated(
            "width",
            &mut [
                &mut self.splitter,
                &mut self.mid_left,
                &mut self.mid_right,
                &mut self.side_left,
                &mut self.side_right,
                &mut self.left_sum,
                &mut self.right_sum,
                &mut self.merger,
            ],
        );
        debug!(released, "width disposed");
    }
}

// ============================================================================
// Tests
// ============================================================================
