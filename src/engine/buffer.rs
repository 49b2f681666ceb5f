//! Audio Buffer Management
//!
//! Planar multi-channel sample storage shared by every effect unit, plus the
//! level measurements used by the monitors (RMS, peak) and the per-channel
//! reversal used by the reverse reverb capture path.

use crate::error::{FxError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default sample rate for all processing (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

// ============================================================================
// Helper Functions
// ============================================================================

/// Calculate the linear RMS level across all channels of a buffer
///
/// Returns 0.0 for empty buffers.
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.num_samples();
    if total_samples == 0 {
        return 0.0;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    (sum_squares / total_samples as f64).sqrt() as f32
}

/// Calculate the linear peak level across all channels of a buffer
///
/// Returns 0.0 for empty buffers.
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max)
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Core audio buffer type for all processing in fxcore
///
/// Stores audio as non-interleaved 32-bit floating point samples.
/// Each channel is a separate `Vec<f32>`; all channels have the same length.
///
/// # Example
/// ```
/// use fxcore::engine::buffer::{AudioBuffer, ChannelLayout, DEFAULT_SAMPLE_RATE};
///
/// // Create a 1-second stereo buffer
/// let buffer = AudioBuffer::new(DEFAULT_SAMPLE_RATE as usize, ChannelLayout::Stereo);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 48000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new silent buffer with the given length and layout
    pub fn new(num_samples: usize, layout: ChannelLayout) -> Self {
        Self::with_sample_rate(num_samples, layout.num_channels(), DEFAULT_SAMPLE_RATE)
    }

    /// Create a new silent buffer with an explicit channel count and sample rate
    pub fn with_sample_rate(num_samples: usize, num_channels: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; num_channels],
            sample_rate,
        }
    }

    /// Create a buffer from planar channel data
    ///
    /// Fails if the channels differ in length.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if let Some(first) = samples.first() {
            let expected = first.len();
            if let Some(bad) = samples.iter().position(|ch| ch.len() != expected) {
                return Err(FxError::InvalidAudio {
                    reason: format!(
                        "channel {} has {} samples, expected {}",
                        bad,
                        samples[bad].len(),
                        expected
                    ),
                });
            }
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(
        interleaved: &[f32],
        num_channels: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if num_channels == 0 || interleaved.len() % num_channels != 0 {
            return Err(FxError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ... for stereo)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_samples = self.len();
        let mut interleaved = Vec::with_capacity(self.channels() * num_samples);

        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }

        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Alias for channels()
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no channels or no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Alias for len()
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.len()
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Get mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Get a sample, or None if indices are out of bounds
    #[inline]
    pub fn get_sample(&self, channel: usize, index: usize) -> Option<f32> {
        self.samples
            .get(channel)
            .and_then(|ch| ch.get(index).copied())
    }

    /// Set a sample; returns false if indices are out of bounds
    #[inline]
    pub fn set_sample(&mut self, channel: usize, index: usize, value: f32) -> bool {
        if let Some(sample) = self
            .samples
            .get_mut(channel)
            .and_then(|ch| ch.get_mut(index))
        {
            *sample = value;
            return true;
        }
        false
    }

    /// Read a stereo frame; mono buffers return the same value twice
    #[inline]
    pub fn frame(&self, index: usize) -> (f32, f32) {
        let left = self.get_sample(0, index).unwrap_or(0.0);
        let right = self.get_sample(1, index).unwrap_or(left);
        (left, right)
    }

    /// Write a stereo frame; mono buffers receive the average
    #[inline]
    pub fn set_frame(&mut self, index: usize, left: f32, right: f32) {
        if self.channels() == 1 {
            self.set_sample(0, index, 0.5 * (left + right));
        } else {
            self.set_sample(0, index, left);
            self.set_sample(1, index, right);
        }
    }

    /// Produce a new buffer whose samples are reversed per channel
    ///
    /// `reversed[i] == original[len - 1 - i]`; channel count and sample rate
    /// are preserved.
    pub fn reversed(&self) -> AudioBuffer {
        AudioBuffer {
            samples: self
                .samples
                .iter()
                .map(|ch| ch.iter().rev().copied().collect())
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Check whether any sample in any channel exceeds `threshold` in magnitude
    pub fn has_signal_above(&self, threshold: f32) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .any(|s| s.abs() > threshold)
    }

    /// Linear RMS level across all channels
    pub fn rms(&self) -> f32 {
        calculate_rms(self)
    }

    /// Linear peak level across all channels
    pub fn peak(&self) -> f32 {
        calculate_peak(self)
    }

    /// Check that every sample is finite (no NaN or infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Replace non-finite samples with silence
    pub fn sanitize(&mut self) {
        for sample in self.samples.iter_mut().flat_map(|ch| ch.iter_mut()) {
            if !sample.is_finite() {
                *sample = 0.0;
            }
        }
    }

    /// Fill every channel with silence
    pub fn clear(&mut self) {
        for ch in &mut self.samples {
            ch.fill(0.0);
        }
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(0, ChannelLayout::Stereo)
    }
}

// ============================================================================
// Tests
// ============================================================================
