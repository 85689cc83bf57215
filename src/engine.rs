//! The engine: one owner for the pattern library, the realtime graph and
//! transport, and the user-facing mix parameters.
//!
//! Lifecycle: `Uninitialized` → `init()` → `Ready` → `start()` → `Playing`
//! ⇄ `Stopped`. Offline renders work in any state and never touch the
//! realtime graph.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::attractor::TrajectoryPoint;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::graph::{InstrumentGraph, MixParams, OutputSink, VoiceKind};
use crate::loader::PatternSource;
use crate::pattern::{DEFAULT_PATTERN, Pattern, PatternLibrary, SynthConfig};
use crate::renderer::{
    AudioBuffer, DEFAULT_RENDER_SEED, RenderOutput, RenderSettings, render_offline,
};
use crate::scheduler::{ATTRACTOR_START_HZ, ScheduleContext, schedule_events};
use crate::transport::Transport;
use crate::wav::encode_wav;

/// Ramp time for voice and master volume changes.
pub const VOLUME_RAMP_SECONDS: f64 = 0.1;
/// Ramp time for effect amounts and tempo.
pub const PARAM_RAMP_SECONDS: f64 = 0.5;
/// Smoothing for live attractor updates.
pub const ATTRACTOR_RAMP_SECONDS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
    Playing,
    Stopped,
}

/// Global (non-voice) parameters settable through [`AudioEngine::set_param`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineParam {
    Bpm,
    /// Reverb wet fraction.
    Reverb,
    /// Delay wet fraction.
    Delay,
}

impl EngineParam {
    pub fn name(self) -> &'static str {
        match self {
            EngineParam::Bpm => "bpm",
            EngineParam::Reverb => "reverb",
            EngineParam::Delay => "delay",
        }
    }
}

impl fmt::Display for EngineParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineParam {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bpm" => Ok(EngineParam::Bpm),
            "reverb" => Ok(EngineParam::Reverb),
            "delay" => Ok(EngineParam::Delay),
            _ => Err(EngineError::UnknownParam(s.to_string())),
        }
    }
}

/// The realtime graph and its clock, built once by `init()`.
struct Realtime {
    graph: InstrumentGraph,
    transport: Transport,
}

pub struct AudioEngine {
    config: EngineConfig,
    state: EngineState,
    library: PatternLibrary,
    current_pattern: String,
    synth_config: SynthConfig,
    mix: MixParams,
    bpm: f64,
    realtime: Option<Realtime>,
}

impl Default for AudioEngine {
    fn default() -> Self {
        AudioEngine::new(EngineConfig::default())
    }
}

impl AudioEngine {
    /// A new engine holding the built-in pattern library.
    pub fn new(config: EngineConfig) -> Self {
        let library = PatternLibrary::builtin();
        let current_pattern = if library.contains(&config.initial_pattern) {
            config.initial_pattern.clone()
        } else {
            tracing::warn!(
                pattern = %config.initial_pattern,
                "initial pattern not in library, using {DEFAULT_PATTERN}"
            );
            DEFAULT_PATTERN.to_string()
        };
        let synth_config = library
            .get(&current_pattern)
            .map(Pattern::synth_config)
            .unwrap_or_default();

        AudioEngine {
            state: EngineState::Uninitialized,
            current_pattern,
            synth_config,
            mix: config.mix,
            bpm: config.bpm,
            library,
            realtime: None,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == EngineState::Playing
    }

    pub fn current_pattern_name(&self) -> &str {
        &self.current_pattern
    }

    pub fn current_pattern(&self) -> Option<&Pattern> {
        self.library.get(&self.current_pattern)
    }

    pub fn pattern_names(&self) -> Vec<String> {
        self.library.names()
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    pub fn synth_config(&self) -> &SynthConfig {
        &self.synth_config
    }

    pub fn mix(&self) -> &MixParams {
        &self.mix
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Loops currently scheduled on the realtime transport.
    pub fn active_loops(&self) -> usize {
        self.realtime
            .as_ref()
            .map_or(0, |rt| rt.transport.active_loops())
    }

    /// Fetch a pattern library from `source` and replace the current one
    /// wholesale. On any failure the current library is kept. Returns the
    /// pattern names available afterwards.
    pub async fn load_patterns<S: PatternSource>(&mut self, source: &S) -> Vec<String> {
        let loaded = match source.fetch().await {
            Ok(json) => PatternLibrary::from_json(&json),
            Err(e) => Err(e),
        };
        match loaded {
            Ok(library) => self.replace_library(library),
            Err(e) => {
                tracing::warn!(error = %e, "pattern load failed, keeping current library");
            }
        }
        self.pattern_names()
    }

    /// Install `library` and reselect the current pattern from it, so a
    /// redefined pattern takes effect. If the current pattern is gone,
    /// switch to the first pattern of the new library.
    pub fn replace_library(&mut self, library: PatternLibrary) {
        tracing::info!(patterns = library.len(), "pattern library replaced");
        self.library = library;
        let name = if self.library.contains(&self.current_pattern) {
            self.current_pattern.clone()
        } else {
            let Some(first) = self.library.first_name() else {
                return;
            };
            tracing::info!(from = %self.current_pattern, to = first, "current pattern missing");
            first.to_string()
        };
        self.set_pattern(&name);
    }

    /// Build the realtime graph and transport. Does nothing once built.
    /// A zero sample rate is rejected and leaves the engine uninitialized.
    pub fn init(&mut self) -> Result<(), EngineError> {
        if self.realtime.is_some() {
            return Ok(());
        }
        if self.config.sample_rate == 0 {
            return Err(EngineError::InvalidSampleRate(self.config.sample_rate));
        }
        let sample_rate = self.config.sample_rate as f64;
        let mut graph = InstrumentGraph::new(
            OutputSink::Realtime,
            sample_rate,
            &self.synth_config,
            &self.mix,
            self.bpm,
        );
        graph.master_volume().set_value(self.mix.master);
        self.realtime = Some(Realtime {
            graph,
            transport: Transport::new(sample_rate, self.bpm),
        });
        self.state = EngineState::Ready;
        tracing::info!(sample_rate, bpm = self.bpm, "audio engine initialized");
        Ok(())
    }

    fn loop_rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// (Re)start playback of the current pattern from bar 0. Any loops from
    /// a previous start are cancelled first.
    pub fn start(&mut self) {
        let Some(pattern) = self.library.get(&self.current_pattern).cloned() else {
            tracing::warn!(pattern = %self.current_pattern, "no such pattern, not starting");
            return;
        };
        let rng = self.loop_rng();
        let Some(rt) = self.realtime.as_mut() else {
            tracing::debug!("start ignored, engine not initialized");
            return;
        };

        rt.transport.stop();
        rt.transport.cancel_all();

        let now = rt.graph.now();
        rt.graph.attractor_release();
        rt.graph.attractor_attack(ATTRACTOR_START_HZ, now);

        schedule_events(
            &mut rt.transport,
            ScheduleContext {
                pattern: Arc::new(pattern),
                rng,
            },
        );
        rt.transport.start();
        self.state = EngineState::Playing;
        tracing::info!(pattern = %self.current_pattern, "playback started");
    }

    /// Halt the transport and release the attractor. Scheduled loops stay
    /// until the next `start()`.
    pub fn stop(&mut self) {
        let Some(rt) = self.realtime.as_mut() else {
            return;
        };
        rt.transport.stop();
        rt.graph.attractor_release();
        self.state = EngineState::Stopped;
        tracing::info!("playback stopped");
    }

    /// Switch to the pattern called `name`. Unknown names are ignored.
    pub fn set_pattern(&mut self, name: &str) {
        let Some(pattern) = self.library.get(name) else {
            tracing::debug!(pattern = name, "unknown pattern ignored");
            return;
        };
        self.synth_config = pattern.synth_config();
        self.current_pattern = name.to_string();
        if let Some(rt) = self.realtime.as_mut() {
            rt.graph.apply_synth_config(&self.synth_config);
        }
        tracing::info!(pattern = name, "pattern selected");

        if self.is_playing() {
            self.start();
        }
    }

    pub fn set_volume(&mut self, voice: VoiceKind, db: f64) {
        self.mix.set_volume(voice, db);
        if let Some(rt) = self.realtime.as_mut() {
            let now = rt.graph.now();
            rt.graph.volume(voice).ramp_to(db, VOLUME_RAMP_SECONDS, now);
        }
    }

    pub fn set_master_volume(&mut self, db: f64) {
        self.mix.master = db;
        if let Some(rt) = self.realtime.as_mut() {
            let now = rt.graph.now();
            rt.graph.master_volume().ramp_to(db, VOLUME_RAMP_SECONDS, now);
        }
    }

    pub fn set_param(&mut self, param: EngineParam, value: f64) {
        match param {
            EngineParam::Bpm => self.bpm = value,
            EngineParam::Reverb => self.mix.reverb = value,
            EngineParam::Delay => self.mix.delay = value,
        }
        let Some(rt) = self.realtime.as_mut() else {
            return;
        };
        let now = rt.graph.now();
        match param {
            EngineParam::Bpm => rt.transport.ramp_bpm(value, PARAM_RAMP_SECONDS, now),
            EngineParam::Reverb => rt.graph.reverb_wet().ramp_to(value, PARAM_RAMP_SECONDS, now),
            EngineParam::Delay => rt.graph.delay_wet().ramp_to(value, PARAM_RAMP_SECONDS, now),
        }
    }

    /// Ramp the live attractor parameters toward the mapping of `(x, y, z)`.
    /// Ignored if any coordinate is NaN or the engine is not initialized.
    pub fn update_attractor_state(&mut self, x: f64, y: f64, z: f64) {
        let Some(targets) = self.synth_config.attractor.mappings.targets(x, y, z) else {
            return;
        };
        let Some(rt) = self.realtime.as_mut() else {
            return;
        };
        let now = rt.graph.now();
        for (param, value) in targets {
            rt.graph
                .attractor_param(param)
                .ramp_to(value, ATTRACTOR_RAMP_SECONDS, now);
        }
    }

    /// Pull the next block of realtime audio. Writes silence before `init()`.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        match self.realtime.as_mut() {
            Some(rt) => rt.transport.render(&mut rt.graph, left, right),
            None => {
                left.fill(0.0);
                right.fill(0.0);
            }
        }
    }

    /// Settings an offline render of the current state would use.
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            sample_rate: self.config.sample_rate,
            bpm: self.bpm,
            synths: self.synth_config.clone(),
            mix: self.mix,
            seed: self.config.seed.unwrap_or(DEFAULT_RENDER_SEED),
            record_triggers: false,
        }
    }

    /// Render the current pattern offline with explicit settings, returning
    /// the trigger log as well as the audio.
    pub fn render_with(
        &self,
        duration: f64,
        trajectory: Option<&[TrajectoryPoint]>,
        settings: &RenderSettings,
    ) -> Result<RenderOutput, EngineError> {
        let pattern = self
            .current_pattern()
            .ok_or_else(|| EngineError::InvalidPattern {
                name: self.current_pattern.clone(),
                reason: "not in library".into(),
            })?;
        render_offline(pattern, duration, trajectory, settings)
    }

    /// Render `duration` seconds of the current pattern on an isolated
    /// graph, with the current tempo and voice volumes.
    pub fn render_offline(
        &self,
        duration: f64,
        trajectory: Option<&[TrajectoryPoint]>,
    ) -> Result<AudioBuffer, EngineError> {
        Ok(self
            .render_with(duration, trajectory, &self.render_settings())?
            .buffer)
    }

    /// [`render_offline`](Self::render_offline) encoded as a 16-bit WAV.
    pub fn render_offline_wav(
        &self,
        duration: f64,
        trajectory: Option<&[TrajectoryPoint]>,
    ) -> Result<Vec<u8>, EngineError> {
        let buffer = self.render_offline(duration, trajectory)?;
        Ok(encode_wav(&buffer, buffer.frames()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attractor::SynthParam;
    use crate::dsp::note::transpose;
    use crate::loader::StaticPatternSource;

    fn engine() -> AudioEngine {
        AudioEngine::new(EngineConfig {
            sample_rate: 8000,
            seed: Some(3),
            ..EngineConfig::default()
        })
    }

    #[test]
    fn lifecycle() {
        let mut e = engine();
        assert_eq!(e.state(), EngineState::Uninitialized);
        e.start();
        assert_eq!(e.state(), EngineState::Uninitialized);
        assert_eq!(e.active_loops(), 0);

        e.init().unwrap();
        assert_eq!(e.state(), EngineState::Ready);
        e.start();
        assert_eq!(e.state(), EngineState::Playing);
        e.stop();
        assert_eq!(e.state(), EngineState::Stopped);
        // loops survive stop
        assert_eq!(e.active_loops(), 2);
    }

    #[test]
    fn start_twice_keeps_one_set_of_loops() {
        let mut e = engine();
        e.init().unwrap();
        e.start();
        e.start();
        assert_eq!(e.active_loops(), 2);
    }

    #[test]
    fn init_is_idempotent() {
        let mut e = engine();
        e.init().unwrap();
        let mut l = vec![0.0; 100];
        let mut r = vec![0.0; 100];
        e.process(&mut l, &mut r);
        e.init().unwrap();
        // same graph: time kept advancing instead of being rebuilt
        assert_eq!(e.realtime.as_ref().unwrap().graph.frames_rendered(), 100);
    }

    #[test]
    fn unknown_pattern_ignored() {
        let mut e = engine();
        e.set_pattern("Nope");
        assert_eq!(e.current_pattern_name(), "Ethereal");
        e.set_pattern("Drone");
        assert_eq!(e.current_pattern_name(), "Drone");
    }

    #[test]
    fn set_pattern_restarts_only_when_playing() {
        let mut e = engine();
        e.init().unwrap();
        e.set_pattern("Mystery");
        assert_eq!(e.state(), EngineState::Ready);
        assert_eq!(e.active_loops(), 0);

        e.start();
        e.set_pattern("Drone");
        assert_eq!(e.state(), EngineState::Playing);
        assert_eq!(e.active_loops(), 2);
    }

    #[test]
    fn params_stored_without_graph() {
        let mut e = engine();
        e.set_volume(VoiceKind::Keys, -20.0);
        e.set_master_volume(-3.0);
        e.set_param(EngineParam::Bpm, 90.0);
        e.set_param(EngineParam::Reverb, 0.1);
        assert_eq!(e.mix().keys, -20.0);
        assert_eq!(e.mix().master, -3.0);
        assert_eq!(e.mix().reverb, 0.1);
        assert_eq!(e.bpm(), 90.0);
    }

    #[test]
    fn live_params_ramp() {
        let mut e = engine();
        e.init().unwrap();
        e.set_volume(VoiceKind::Pad, -30.0);
        e.set_param(EngineParam::Delay, 0.9);
        let rt = e.realtime.as_mut().unwrap();
        assert!(rt.graph.volume(VoiceKind::Pad).is_ramping());
        assert!(rt.graph.delay_wet().is_ramping());

        let mut l = vec![0.0; 8000];
        let mut r = vec![0.0; 8000];
        e.process(&mut l, &mut r);
        let rt = e.realtime.as_mut().unwrap();
        assert_eq!(rt.graph.volume(VoiceKind::Pad).value(), -30.0);
        assert_eq!(rt.graph.delay_wet().value(), 0.9);
    }

    #[test]
    fn attractor_update_ramps_and_rejects_nan() {
        let mut e = engine();
        e.init().unwrap();
        e.update_attractor_state(f64::NAN, 1.0, 1.0);
        let rt = e.realtime.as_mut().unwrap();
        assert!(!rt.graph.attractor_param(SynthParam::Frequency).is_ramping());

        e.update_attractor_state(20.0, 0.0, 0.0);
        let rt = e.realtime.as_mut().unwrap();
        assert!(rt.graph.attractor_param(SynthParam::Frequency).is_ramping());
        let mut l = vec![0.0; 1600];
        let mut r = vec![0.0; 1600];
        e.process(&mut l, &mut r);
        let rt = e.realtime.as_mut().unwrap();
        assert_eq!(rt.graph.attractor_param(SynthParam::Frequency).value(), 800.0);
    }

    #[test]
    fn process_before_init_is_silent() {
        let mut e = engine();
        let mut l = vec![1.0; 16];
        let mut r = vec![1.0; 16];
        e.process(&mut l, &mut r);
        assert!(l.iter().chain(r.iter()).all(|s| *s == 0.0));
    }

    #[test]
    fn param_names_parse() {
        assert_eq!("bpm".parse::<EngineParam>().unwrap(), EngineParam::Bpm);
        assert_eq!("Reverb".parse::<EngineParam>().unwrap(), EngineParam::Reverb);
        assert!(matches!(
            "chorus".parse::<EngineParam>(),
            Err(EngineError::UnknownParam(_))
        ));
    }

    #[test]
    fn offline_render_leaves_realtime_alone() {
        let mut e = engine();
        e.init().unwrap();
        let buf = e.render_offline(0.25, None).unwrap();
        assert_eq!(buf.frames(), 2000);
        assert_eq!(e.realtime.as_ref().unwrap().graph.frames_rendered(), 0);
        assert!(matches!(
            e.render_offline(-1.0, None),
            Err(EngineError::InvalidDuration(_))
        ));
    }

    #[test]
    fn wav_render_has_header() {
        let e = engine();
        let wav = e.render_offline_wav(0.1, None).unwrap();
        assert_eq!(wav.len(), 44 + 800 * 4);
        assert_eq!(&wav[0..4], b"RIFF");
    }

    #[tokio::test]
    async fn bad_remote_library_keeps_builtin() {
        let mut e = engine();
        let names = e.load_patterns(&StaticPatternSource::new("not json")).await;
        assert_eq!(names, PatternLibrary::builtin().names());

        let names = e.load_patterns(&StaticPatternSource::new("{}")).await;
        assert_eq!(names.len(), 4);
    }

    #[tokio::test]
    async fn remote_library_replaces_wholesale() {
        let mut e = engine();
        let json = r#"{
            "Alpha": {"chords": [["C3", "E3"]], "bass": ["C2"]},
            "Beta": {"chords": [["D3"]]}
        }"#;
        let names = e.load_patterns(&StaticPatternSource::new(json)).await;
        assert_eq!(names, vec!["Alpha".to_string(), "Beta".to_string()]);
        // Ethereal is gone, so the first pattern takes over
        assert_eq!(e.current_pattern_name(), "Alpha");
        assert!(!e.library().contains("Drone"));
    }

    fn run(e: &mut AudioEngine, frames: usize) {
        let mut l = vec![0.0; frames];
        let mut r = vec![0.0; frames];
        e.process(&mut l, &mut r);
    }

    fn frequencies(chord: &[&str], semitones: i32) -> Vec<f64> {
        chord
            .iter()
            .map(|n| transpose(n, semitones).unwrap())
            .collect()
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let mut e = AudioEngine::new(EngineConfig {
            sample_rate: 0,
            ..EngineConfig::default()
        });
        assert!(matches!(e.init(), Err(EngineError::InvalidSampleRate(0))));
        assert_eq!(e.state(), EngineState::Uninitialized);

        e.start();
        let mut l = vec![1.0; 16];
        let mut r = vec![1.0; 16];
        e.process(&mut l, &mut r);
        assert!(l.iter().chain(r.iter()).all(|s| *s == 0.0));
    }

    #[test]
    fn realtime_graph_uses_realtime_sink() {
        let mut e = engine();
        e.init().unwrap();
        assert_eq!(e.realtime.as_ref().unwrap().graph.sink(), OutputSink::Realtime);
    }

    #[test]
    fn pattern_switch_keeps_attractor_level() {
        let mut e = engine();
        e.init().unwrap();
        e.start();
        e.set_volume(VoiceKind::Attractor, -6.0);
        run(&mut e, 8000);
        e.set_pattern("Drone");
        run(&mut e, 8000);

        let rt = e.realtime.as_mut().unwrap();
        assert_eq!(rt.graph.volume(VoiceKind::Attractor).value(), -6.0);
        assert_eq!(e.mix().attractor, -6.0);
    }

    #[test]
    fn stop_releases_and_start_reattacks_attractor() {
        let mut e = engine();
        e.init().unwrap();
        let sounding = |e: &AudioEngine| e.realtime.as_ref().unwrap().graph.attractor_sounding();
        assert!(!sounding(&e));

        e.start();
        assert!(sounding(&e));
        run(&mut e, 4000);
        e.stop();
        // release is 1 s
        run(&mut e, 3 * 8000);
        assert!(!sounding(&e));

        e.start();
        assert!(sounding(&e));
    }

    #[test]
    fn switch_while_playing_restarts_new_pattern_from_bar_zero() {
        let mut e = engine();
        e.set_param(EngineParam::Bpm, 240.0); // one bar per second
        e.init().unwrap();
        e.realtime.as_mut().unwrap().graph.record_triggers();
        e.start();
        run(&mut e, 4000);

        let before = e.realtime.as_mut().unwrap().graph.take_triggers();
        let pads: Vec<_> = before.iter().filter(|t| t.voice == VoiceKind::Pad).collect();
        assert_eq!(pads.len(), 1);
        assert_eq!(pads[0].frequencies, frequencies(&["C3", "G3", "B3", "E4"], 0));

        // mid-bar switch
        e.set_pattern("Drone");
        run(&mut e, 12000);
        let after = e.realtime.as_mut().unwrap().graph.take_triggers();
        let tol = 1.0 / 8000.0;

        let pads: Vec<_> = after.iter().filter(|t| t.voice == VoiceKind::Pad).collect();
        assert_eq!(pads.len(), 2);
        assert!((pads[0].time - 0.5).abs() <= tol);
        assert_eq!(pads[0].frequencies, frequencies(&["C3", "G3", "C4"], 0));
        assert!((pads[1].time - 1.5).abs() <= tol);
        assert_eq!(pads[1].frequencies, frequencies(&["C3", "G3", "D4"], 0));

        let mut allowed = frequencies(&["C3", "G3", "C4"], 12);
        allowed.extend(frequencies(&["C3", "G3", "D4"], 12));
        let keys: Vec<_> = after.iter().filter(|t| t.voice == VoiceKind::Keys).collect();
        assert!(!keys.is_empty());
        for (i, k) in keys.iter().enumerate() {
            assert!(allowed.contains(&k.frequencies[0]), "stale arpeggio note {k:?}");
            // eighth grid from the restart, at most one note per step
            let steps = (k.time - 0.5) / 0.125;
            assert!((steps - steps.round()).abs() * 0.125 <= tol);
            if i > 0 {
                assert!(k.time - keys[i - 1].time > 0.1);
            }
        }
    }

    #[tokio::test]
    async fn unplayable_pitch_keeps_builtin_library() {
        let mut e = engine();
        let json = r#"{"X": {"chords": [["C999999999"]]}}"#;
        let names = e.load_patterns(&StaticPatternSource::new(json)).await;
        assert_eq!(names, PatternLibrary::builtin().names());
        assert_eq!(e.current_pattern_name(), "Ethereal");
    }
}
