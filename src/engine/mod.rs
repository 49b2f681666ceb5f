//! Audio Engine Module
//!
//! Runtime primitives the effect units are built on:
//! - Audio buffer management
//! - Clock for cooldowns and periodic monitoring
//! - Internal node lifecycle
//! - File I/O operations

pub mod buffer;
pub mod clock;
pub mod io;
pub mod node;

pub use buffer::{AudioBuffer, ChannelLayout, DEFAULT_SAMPLE_RATE};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use io::{export_audio, generate_stereo_test_tone, generate_test_tone, import_audio, ExportFormat};
pub use node::{dispose_isolated, wire, AudioNode, GainNode, RoutingNode};
