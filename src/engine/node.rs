//! Internal node lifecycle
//!
//! Effect units own their sub-graph of nodes exclusively. Each node can be
//! disposed once; disposing twice is reported as an error so the owner can
//! log it, and [`dispose_isolated`] makes sure one failing node never stops
//! the rest from being released.

use tracing::warn;

use crate::dsp::ramp::{Param, RampedParam};
use crate::error::{FxError, Result};

/// A node inside an effect unit's private sub-graph
pub trait AudioNode: Send {
    /// Name used in diagnostics
    fn label(&self) -> &str;

    /// Route this node's output into `target`
    ///
    /// Fails with [`FxError::Disposed`] if either end was released.
    fn connect(&mut self, target: &dyn AudioNode) -> Result<()>;

    /// Drop every outgoing connection
    fn disconnect(&mut self);

    /// Labels of the nodes this node feeds
    fn outputs(&self) -> &[String];

    /// Release the node's resources
    ///
    /// Returns [`FxError::Disposed`] if the node was already released.
    fn dispose(&mut self) -> Result<()>;

    fn is_disposed(&self) -> bool;
}

/// Dispose every node, isolating failures
///
/// Returns how many nodes were released by this call. Failures are logged
/// under `owner` and do not interrupt the remaining disposals.
pub fn dispose_isolated(owner: &str, nodes: &mut [&mut dyn AudioNode]) -> usize {
    let mut released = 0;
    for node in nodes.iter_mut() {
        match node.dispose() {
            Ok(()) => released += 1,
            Err(err) => warn!(owner, node = node.label(), %err, "node dispose failed"),
        }
    }
    released
}

/// Connect `from` into `to`, logging instead of failing
///
/// Used while an owner builds its fixed topology.
pub fn wire(owner: &str, from: &mut dyn AudioNode, to: &dyn AudioNode) -> bool {
    match from.connect(to) {
        Ok(()) => true,
        Err(err) => {
            warn!(owner, from = from.label(), to = to.label(), %err, "node connect failed");
            false
        }
    }
}

/// Label, wiring and lifecycle shared by every node type
#[derive(Debug, Clone)]
struct NodeState {
    label: &'static str,
    outputs: Vec<String>,
    disposed: bool,
}

impl NodeState {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            outputs: Vec::new(),
            disposed: false,
        }
    }

    fn connect(&mut self, target: &dyn AudioNode) -> Result<()> {
        if self.disposed {
            return Err(FxError::Disposed {
                component: self.label.to_string(),
            });
        }
        if target.is_disposed() {
            return Err(FxError::Disposed {
                component: target.label().to_string(),
            });
        }
        self.outputs.push(target.label().to_string());
        Ok(())
    }

    fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Err(FxError::Disposed {
                component: self.label.to_string(),
            });
        }
        self.disposed = true;
        self.outputs.clear();
        Ok(())
    }
}

macro_rules! impl_audio_node {
    ($node:ty) => {
        impl AudioNode for $node {
            fn label(&self) -> &str {
                self.state.label
            }

            fn connect(&mut self, target: &dyn AudioNode) -> Result<()> {
                self.state.connect(target)
            }

            fn disconnect(&mut self) {
                self.state.outputs.clear();
            }

            fn outputs(&self) -> &[String] {
                &self.state.outputs
            }

            fn dispose(&mut self) -> Result<()> {
                self.state.dispose()
            }

            fn is_disposed(&self) -> bool {
                self.state.disposed
            }
        }
    };
}

/// A scaling node with a ramped gain
#[derive(Debug, Clone)]
pub struct GainNode {
    state: NodeState,
    gain: Param,
}

impl GainNode {
    pub fn new(label: &'static str, gain: f32, sample_rate: f32) -> Self {
        Self {
            state: NodeState::new(label),
            gain: Param::Ramped(RampedParam::new(gain, sample_rate)),
        }
    }

    /// Scale one sample, advancing the gain ramp
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        if self.state.disposed {
            return 0.0;
        }
        input * self.gain.next()
    }

    pub fn gain(&self) -> &Param {
        &self.gain
    }

    pub fn gain_mut(&mut self) -> &mut Param {
        &mut self.gain
    }
}

impl_audio_node!(GainNode);

/// A node that only carries wiring and lifecycle (splitters, mergers, summing junctions)
#[derive(Debug, Clone)]
pub struct RoutingNode {
    state: NodeState,
}

impl RoutingNode {
    pub fn new(label: &'static str) -> Self {
        Self {
            state: NodeState::new(label),
        }
    }
}

impl_audio_node!(RoutingNode);
