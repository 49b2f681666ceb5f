//! CLI Command Implementations
//!
//! Offline rendering drives the units exactly as a real-time host would:
//! fixed-size blocks, parameters written through the router, and a clock
//! that advances with the rendered audio rather than the wall clock.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::cli::RenderArgs;
use crate::config::FxConfig;
use crate::dsp::gain_staging::{self, GainStagingSupervisor};
use crate::dsp::{
    apply_params, CurveKind, EffectKind, EffectNodes, EffectUnit, ReverseReverbEngine,
    SidechainDucker, StereoWidthProcessor, Trim,
};
use crate::engine::buffer::calculate_peak;
use crate::engine::{export_audio, import_audio, AudioBuffer, ExportFormat, ManualClock};

/// One unit built for an offline render
enum RenderUnit {
    ReverseReverb {
        engine: ReverseReverbEngine,
        clock: ManualClock,
    },
    Width(StereoWidthProcessor),
    Ducker {
        ducker: SidechainDucker,
        trigger: AudioBuffer,
    },
    Trim(Trim),
    Limiter(GainStagingSupervisor),
}

impl RenderUnit {
    fn build(
        kind: EffectKind,
        config: &FxConfig,
        sample_rate: u32,
        trigger: Option<AudioBuffer>,
    ) -> Result<Self> {
        let mut unit = match kind {
            EffectKind::ReverseReverb => {
                let clock = ManualClock::new(0);
                let engine = ReverseReverbEngine::with_default_reverb(
                    &config.reverse_reverb,
                    clock.shared(),
                    sample_rate,
                );
                RenderUnit::ReverseReverb { engine, clock }
            }
            EffectKind::Width => {
                RenderUnit::Width(StereoWidthProcessor::from_config(&config.width, sample_rate))
            }
            EffectKind::Ducker => {
                let trigger = trigger.ok_or_else(|| anyhow!("ducker needs a trigger signal"))?;
                RenderUnit::Ducker {
                    ducker: SidechainDucker::from_config(&config.ducker, sample_rate),
                    trigger,
                }
            }
            EffectKind::Trim => RenderUnit::Trim(Trim::new(0.0, sample_rate)),
            EffectKind::Limiter => {
                let mut supervisor = GainStagingSupervisor::from_config(&config.limiter, sample_rate);
                supervisor.initialize_master_limiter();
                RenderUnit::Limiter(supervisor)
            }
            EffectKind::Reverb | EffectKind::Delay | EffectKind::Filter => {
                bail!("'{}' is an externally defined effect and cannot be rendered", kind)
            }
        };
        unit.set_ramp_seconds(config.ramp_seconds);
        Ok(unit)
    }

    fn set_ramp_seconds(&mut self, seconds: f32) {
        match self {
            RenderUnit::ReverseReverb { engine, .. } => engine.set_ramp_seconds(seconds),
            RenderUnit::Width(width) => width.set_ramp_seconds(seconds),
            RenderUnit::Ducker { ducker, .. } => ducker.set_ramp_seconds(seconds),
            RenderUnit::Trim(trim) => trim.set_ramp_seconds(seconds),
            RenderUnit::Limiter(supervisor) => supervisor.set_ramp_seconds(seconds),
        }
    }

    fn nodes(&mut self) -> EffectNodes<'_> {
        match self {
            RenderUnit::ReverseReverb { engine, .. } => EffectNodes::ReverseReverb(engine),
            RenderUnit::Width(width) => EffectNodes::Width(width),
            RenderUnit::Ducker { ducker, .. } => EffectNodes::Ducker(ducker),
            RenderUnit::Trim(trim) => EffectNodes::Trim(trim),
            RenderUnit::Limiter(supervisor) => EffectNodes::Limiter(supervisor),
        }
    }

    fn prepare(&mut self, sample_rate: u32, block_size: usize) {
        match self {
            RenderUnit::ReverseReverb { engine, .. } => engine.prepare(sample_rate, block_size),
            RenderUnit::Width(width) => width.prepare(sample_rate, block_size),
            RenderUnit::Ducker { ducker, .. } => ducker.prepare(sample_rate, block_size),
            RenderUnit::Trim(trim) => trim.prepare(sample_rate, block_size),
            RenderUnit::Limiter(supervisor) => supervisor.prepare(sample_rate, block_size),
        }
    }

    /// Process the block covering `start..start + block.num_samples()`
    fn process(&mut self, block: &mut AudioBuffer, start: usize) -> Result<()> {
        match self {
            RenderUnit::ReverseReverb { engine, clock } => {
                clock.set_ms(samples_to_ms(start, block.sample_rate));
                engine.process(block);
            }
            RenderUnit::Width(width) => width.process(block),
            RenderUnit::Ducker { ducker, trigger } => {
                let end = start + block.num_samples();
                ducker.feed_sidechain(&slice_block(trigger, start, end));
                ducker.process(block);
            }
            RenderUnit::Trim(trim) => trim.process(block),
            RenderUnit::Limiter(supervisor) => supervisor.process(block)?,
        }
        Ok(())
    }

    fn dispose(&mut self) {
        match self {
            RenderUnit::ReverseReverb { engine, .. } => {
                info!(
                    voices = engine.voices_started(),
                    state = %engine.state(),
                    "reverse reverb render finished"
                );
                engine.dispose();
            }
            RenderUnit::Width(width) => width.dispose(),
            RenderUnit::Ducker { ducker, .. } => ducker.dispose(),
            RenderUnit::Trim(trim) => trim.dispose(),
            RenderUnit::Limiter(supervisor) => supervisor.dispose(),
        }
    }
}

/// Render `args.input` through one effect unit into `args.output`.
pub fn render(args: &RenderArgs, config: &FxConfig) -> Result<()> {
    let kind: EffectKind = args.effect.parse()?;
    if args.block_size == 0 {
        bail!("block size must be at least one sample");
    }

    let mut buffer = import_audio(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    buffer.sanitize();
    let sample_rate = buffer.sample_rate;
    info!(
        input = %args.input.display(),
        channels = buffer.num_channels(),
        sample_rate,
        duration_secs = buffer.duration_secs(),
        "loaded input"
    );

    append_silence(&mut buffer, args.tail);

    let trigger = match kind {
        EffectKind::Ducker => Some(load_trigger(args.sidechain.as_deref(), &buffer)?),
        _ => None,
    };

    let mut unit = RenderUnit::build(kind, config, sample_rate, trigger)?;
    unit.prepare(sample_rate, args.block_size);

    let overrides = params_to_json(&args.params);
    let applied = apply_params(kind, unit.nodes(), &overrides);
    if applied < args.params.len() {
        warn!(
            effect = %kind,
            requested = args.params.len(),
            applied,
            "some parameters were not recognized"
        );
    }

    let input_peak = calculate_peak(&buffer);
    let rendered = for_each_block(&mut buffer, args.block_size, |block, start| {
        unit.process(block, start)
    });
    unit.dispose();
    rendered?;

    if args.limit {
        limit_master(&mut buffer, args.block_size)?;
    }

    export_audio(&buffer, &args.output, ExportFormat::new(args.bit_depth))
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    println!("Rendered {} -> {}", args.input.display(), args.output.display());
    println!("  effect:      {}", kind);
    println!("  parameters:  {} applied", applied);
    println!("  input peak:  {:.4}", input_peak);
    println!("  output peak: {:.4}", calculate_peak(&buffer));
    Ok(())
}

/// Print the value a control position maps to on a curve.
pub fn curve(kind: &str, value: f32) -> Result<()> {
    let kind: CurveKind = kind.parse()?;
    let mapped = kind.map(value);
    match kind {
        CurveKind::Gain => println!(
            "{} {:.3} -> {:.2} {} ({:.5} linear)",
            kind,
            value,
            mapped,
            kind.unit(),
            crate::dsp::db_to_gain(mapped)
        ),
        _ => println!("{} {:.3} -> {:.4} {}", kind, value, mapped, kind.unit()),
    }
    Ok(())
}

/// List every effect type the router knows and its parameter keys.
pub fn list_effects() -> Result<()> {
    for kind in EffectKind::ALL {
        let origin = if kind.is_external() { " (external)" } else { "" };
        println!("{}{}: {}", kind, origin, kind.keys().join(", "));
    }
    Ok(())
}

/// Run the buffer through the process-wide master limiter
fn limit_master(buffer: &mut AudioBuffer, block_size: usize) -> Result<()> {
    let mut supervisor = gain_staging::global()
        .lock()
        .map_err(|_| anyhow!("gain staging supervisor lock poisoned"))?;
    supervisor.prepare(buffer.sample_rate, block_size);
    supervisor.initialize_master_limiter();

    let mut deepest = 0.0_f32;
    let limited = for_each_block(buffer, block_size, |block, _| {
        supervisor.process(block)?;
        deepest = deepest.min(supervisor.get_reduction()?);
        Ok(())
    });
    supervisor.dispose();
    limited?;

    info!(max_reduction_db = deepest, "master limiter applied");
    Ok(())
}

/// Call `f` on consecutive blocks of `buffer`, writing each result back
fn for_each_block<F>(buffer: &mut AudioBuffer, block_size: usize, mut f: F) -> Result<()>
where
    F: FnMut(&mut AudioBuffer, usize) -> Result<()>,
{
    let total = buffer.num_samples();
    let mut start = 0;
    while start < total {
        let end = (start + block_size).min(total);
        let mut block = slice_block(buffer, start, end);
        f(&mut block, start)?;
        for (dst, src) in buffer.samples.iter_mut().zip(&block.samples) {
            dst[start..end].copy_from_slice(&src[..end - start]);
        }
        start = end;
    }
    debug!(samples = total, block_size, "render complete");
    Ok(())
}

/// Copy `start..end` out of `buffer`, zero-padding past its end
fn slice_block(buffer: &AudioBuffer, start: usize, end: usize) -> AudioBuffer {
    let len = end.saturating_sub(start);
    let mut block = AudioBuffer::with_sample_rate(len, buffer.num_channels(), buffer.sample_rate);
    for (dst, src) in block.samples.iter_mut().zip(&buffer.samples) {
        if start < src.len() {
            let available = (src.len() - start).min(len);
            dst[..available].copy_from_slice(&src[start..start + available]);
        }
    }
    block
}

fn append_silence(buffer: &mut AudioBuffer, seconds: f32) {
    if !(seconds.is_finite() && seconds > 0.0) {
        return;
    }
    let extra = (seconds * buffer.sample_rate as f32) as usize;
    for channel in &mut buffer.samples {
        channel.resize(channel.len() + extra, 0.0);
    }
}

fn load_trigger(path: Option<&Path>, input: &AudioBuffer) -> Result<AudioBuffer> {
    let Some(path) = path else {
        return Ok(input.clone());
    };
    let trigger =
        import_audio(path).with_context(|| format!("failed to read {}", path.display()))?;
    if trigger.sample_rate != input.sample_rate {
        bail!(
            "sidechain sample rate {} Hz does not match input {} Hz",
            trigger.sample_rate,
            input.sample_rate
        );
    }
    Ok(trigger)
}

fn params_to_json(params: &[(String, f64)]) -> Value {
    let bag: Map<String, Value> = params
        .iter()
        .map(|(key, value)| (key.clone(), Value::from(*value)))
        .collect();
    Value::Object(bag)
}

fn samples_to_ms(samples: usize, sample_rate: u32) -> u64 {
    (samples as u64 * 1000) / sample_rate.max(1) as u64
}
