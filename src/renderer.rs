//! Offline rendering: a private graph and transport rendered as fast as
//! possible into a fixed-length stereo buffer.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::attractor::TrajectoryPoint;
use crate::error::EngineError;
use crate::graph::{InstrumentGraph, MixParams, NoteTrigger, OutputSink, VoiceKind};
use crate::pattern::{Pattern, SynthConfig};
use crate::scheduler::{ScheduleContext, schedule_events, schedule_trajectory};
use crate::transport::Transport;

/// Arpeggio seed used when none is configured, so offline renders are
/// reproducible by default.
pub const DEFAULT_RENDER_SEED: u64 = 0x00A7_7AC7;

/// Planar floating-point audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// `channels` channels of `frames` zeroed samples.
    pub fn new(sample_rate: u32, channels: usize, frames: usize) -> Self {
        AudioBuffer {
            sample_rate,
            channels: vec![vec![0.0; frames]; channels],
        }
    }

    pub fn from_channels(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        AudioBuffer {
            sample_rate,
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length of the longest channel.
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Largest absolute sample across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flatten()
            .fold(0.0_f32, |m, s| m.max(s.abs()))
    }
}

/// Everything an offline render takes from the engine besides the pattern.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub sample_rate: u32,
    pub bpm: f64,
    pub synths: SynthConfig,
    pub mix: MixParams,
    pub seed: u64,
    /// Keep a log of every note trigger in the output.
    pub record_triggers: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            sample_rate: 44100,
            bpm: 60.0,
            synths: SynthConfig::default(),
            mix: MixParams::default(),
            seed: DEFAULT_RENDER_SEED,
            record_triggers: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub buffer: AudioBuffer,
    /// Empty unless `record_triggers` was set.
    pub triggers: Vec<NoteTrigger>,
}

/// Frames for `duration` seconds, or an error for a non-positive or
/// non-finite duration.
pub fn frames_for(duration: f64, sample_rate: u32) -> Result<usize, EngineError> {
    if sample_rate == 0 {
        return Err(EngineError::InvalidSampleRate(sample_rate));
    }
    if !duration.is_finite() || duration <= 0.0 {
        return Err(EngineError::InvalidDuration(duration));
    }
    let frames = (duration * sample_rate as f64).round();
    if frames < 1.0 {
        return Err(EngineError::InvalidDuration(duration));
    }
    Ok(frames as usize)
}

/// Render `duration` seconds of `pattern` on a fresh graph.
///
/// Voice levels come from `settings.mix`; the master bus stays at unity.
/// With a trajectory, the attractor voice is started at time 0 and every
/// point becomes automation at its timestamp.
pub fn render_offline(
    pattern: &Pattern,
    duration: f64,
    trajectory: Option<&[TrajectoryPoint]>,
    settings: &RenderSettings,
) -> Result<RenderOutput, EngineError> {
    let frames = frames_for(duration, settings.sample_rate)?;
    let sample_rate = settings.sample_rate as f64;
    tracing::debug!(frames, duration, bpm = settings.bpm, "starting offline render");

    let mut graph = InstrumentGraph::new(
        OutputSink::Offline { frames },
        sample_rate,
        &settings.synths,
        &settings.mix,
        settings.bpm,
    );
    for voice in VoiceKind::ALL {
        graph.volume(voice).set_value(settings.mix.volume(voice));
    }
    if settings.record_triggers {
        graph.record_triggers();
    }

    let mut transport = Transport::new(sample_rate, settings.bpm);
    schedule_events(
        &mut transport,
        ScheduleContext {
            pattern: Arc::new(pattern.clone()),
            rng: StdRng::seed_from_u64(settings.seed),
        },
    );
    if let Some(points) = trajectory {
        let applied = schedule_trajectory(&mut graph, &settings.synths.attractor.mappings, points);
        tracing::debug!(points = applied, "trajectory automation scheduled");
    }

    let mut left = vec![0.0; frames];
    let mut right = vec![0.0; frames];
    transport.start();
    transport.render(&mut graph, &mut left, &mut right);
    let buffer = AudioBuffer::from_channels(settings.sample_rate, vec![left, right]);

    tracing::info!(frames, peak = buffer.peak(), "offline render finished");
    Ok(RenderOutput {
        buffer,
        triggers: graph.take_triggers(),
    })
}
