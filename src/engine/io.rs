//! Audio file I/O for fxcore
//!
//! WAV import/export used by the command-line renderer. Files keep their own
//! sample rate; effect units are prepared for whatever rate was read.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{FxError, Result};

/// Export format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    /// Bit depth: 16, 24, or 32 (float)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat { bit_depth: 24 }
    }
}

impl ExportFormat {
    pub fn new(bit_depth: u16) -> Self {
        ExportFormat { bit_depth }
    }
}

/// Import a WAV file as 32-bit float planar audio
///
/// # Errors
/// * `Io` / `Wav` - if the file cannot be opened or decoded
/// * `InvalidAudio` - for files with more than two channels or no samples
pub fn import_audio(path: &Path) -> Result<AudioBuffer> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    if channels == 0 || channels > 2 {
        return Err(FxError::InvalidAudio {
            reason: format!("{}-channel audio (only mono/stereo supported)", channels),
        });
    }

    let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    let buffer = AudioBuffer::from_interleaved(&samples, channels, spec.sample_rate)?;

    if buffer.is_empty() {
        return Err(FxError::InvalidAudio {
            reason: format!("{} contains no samples", path.display()),
        });
    }

    Ok(buffer)
}

/// Export an AudioBuffer to a WAV file at the buffer's sample rate
pub fn export_audio(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: format.bit_depth,
        sample_format: if format.bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    let interleaved = buffer.to_interleaved();
    let mut writer = WavWriter::create(path, spec)?;

    match format.bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled)?;
            }
        }
        24 => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled)?;
            }
        }
        32 => {
            for sample in interleaved {
                writer.write_sample(sample)?;
            }
        }
        other => {
            return Err(FxError::InvalidAudio {
                reason: format!("{}-bit audio (only 16, 24, 32 supported)", other),
            });
        }
    }

    writer.finalize()?;
    Ok(())
}

/// Generate a mono sine test tone
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    generate_stereo_test_tone(frequency, frequency, duration_secs, sample_rate)
        .into_layout(ChannelLayout::Mono)
}

/// Generate a stereo test tone with a different frequency per channel
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::with_sample_rate(num_samples, 2, sample_rate);

    for (ch, freq) in [freq_left, freq_right].into_iter().enumerate() {
        let angular_freq = 2.0 * std::f32::consts::PI * freq / sample_rate as f32;
        for (i, sample) in buffer.samples[ch].iter_mut().enumerate() {
            *sample = (angular_freq * i as f32).sin();
        }
    }

    buffer
}

impl AudioBuffer {
    /// Keep only the channels the layout needs (mono keeps the left channel)
    fn into_layout(mut self, layout: ChannelLayout) -> AudioBuffer {
        self.samples.truncate(layout.num_channels());
        self
    }
}

// ============================================================================
// Internal helper functions
// ============================================================================

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let samples = match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()?,
        SampleFormat::Int => {
            let scale = match bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                other => {
                    return Err(FxError::InvalidAudio {
                        reason: format!("{}-bit integer audio", other),
                    })
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()?
        }
    };
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::tempdir;

    #[test]
    fn test_export_import_float_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = generate_stereo_test_tone(440.0, 660.0, 0.1, 48000);

        export_audio(&tone, &path, ExportFormat::new(32)).unwrap();
        let loaded = import_audio(&path).unwrap();

        assert_eq!(loaded.channels(), 2);
        assert_eq!(loaded.len(), tone.len());
        assert_eq!(loaded.sample_rate, 48000);
        assert_abs_diff_eq!(loaded.channel(1)[100], tone.channel(1)[100], epsilon = 1e-6);
    }

    #[test]
    fn test_export_16_bit_quantizes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone16.wav");
        let tone = generate_test_tone(440.0, 0.05, 44100);

        export_audio(&tone, &path, ExportFormat::new(16)).unwrap();
        let loaded = import_audio(&path).unwrap();

        assert_eq!(loaded.channels(), 1);
        assert_eq!(loaded.sample_rate, 44100);
        assert_abs_diff_eq!(loaded.channel(0)[10], tone.channel(0)[10], epsilon = 1e-3);
    }

    #[test]
    fn test_export_rejects_unknown_bit_depth() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        let tone = generate_test_tone(440.0, 0.01, 48000);
        assert!(export_audio(&tone, &path, ExportFormat::new(12)).is_err());
    }

    #[test]
    fn test_import_missing_file() {
        let err = import_audio(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, FxError::Wav(_) | FxError::Io(_)));
    }
}
