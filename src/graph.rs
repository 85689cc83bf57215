//! The instrument graph: four voices, their effects and the master bus.
//!
//! ```text
//! pad ───────────────────────────┐
//! keys ── ping-pong delay ───────┼── reverb ──┐
//! attractor ─────────────────────┘            ├── limiter ── master ── sink
//! bass ───────────────────────────────────────┘
//! ```
//!
//! Every level and effect amount is a [`Param`] so it can be ramped or
//! automated against graph time. The graph renders one stereo frame per call
//! to [`InstrumentGraph::next_frame`]; time advances by one sample each call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attractor::SynthParam;
use crate::dsp::delay::PingPongDelay;
use crate::dsp::limiter::Limiter;
use crate::dsp::note::db_to_gain;
use crate::dsp::param::Param;
use crate::dsp::reverb::Reverb;
use crate::dsp::synth::{MonoSynth, PolySynth};
use crate::dsp::voice::{BassVoice, DuoControls, DuoVoice, FmVoice, SimpleVoice};
use crate::error::EngineError;
use crate::pattern::SynthConfig;
use crate::transport::Subdivision;

pub const REVERB_DECAY: f64 = 10.0;
pub const REVERB_PRE_DELAY: f64 = 0.2;
pub const DELAY_FEEDBACK: f64 = 0.4;
const DELAY_MAX_SECONDS: f64 = 4.0;
pub const LIMITER_THRESHOLD_DB: f64 = -1.0;

/// Attractor level before anything drives it.
pub const ATTRACTOR_MUTED_DB: f64 = -60.0;

/// Fade time when a new synth configuration changes voice levels.
pub const CONFIG_RAMP_SECONDS: f64 = 0.1;

const VELOCITY: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceKind {
    Pad,
    Keys,
    Bass,
    Attractor,
}

impl VoiceKind {
    pub const ALL: [VoiceKind; 4] = [
        VoiceKind::Pad,
        VoiceKind::Keys,
        VoiceKind::Bass,
        VoiceKind::Attractor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VoiceKind::Pad => "pad",
            VoiceKind::Keys => "keys",
            VoiceKind::Bass => "bass",
            VoiceKind::Attractor => "attractor",
        }
    }
}

impl fmt::Display for VoiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VoiceKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VoiceKind::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::UnknownVoice(s.to_string()))
    }
}

/// Where rendered frames end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSink {
    /// Pulled by the host's audio callback for as long as it runs.
    Realtime,
    /// A fixed-length buffer.
    Offline { frames: usize },
}

/// User-facing mix levels: voice and master volumes in dB, effect amounts as
/// wet fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixParams {
    pub pad: f64,
    pub keys: f64,
    pub bass: f64,
    pub attractor: f64,
    pub master: f64,
    pub reverb: f64,
    pub delay: f64,
}

impl Default for MixParams {
    fn default() -> Self {
        MixParams {
            pad: -12.0,
            keys: -10.0,
            bass: -8.0,
            attractor: ATTRACTOR_MUTED_DB,
            master: -10.0,
            reverb: 0.5,
            delay: 0.3,
        }
    }
}

impl MixParams {
    pub fn volume(&self, voice: VoiceKind) -> f64 {
        match voice {
            VoiceKind::Pad => self.pad,
            VoiceKind::Keys => self.keys,
            VoiceKind::Bass => self.bass,
            VoiceKind::Attractor => self.attractor,
        }
    }

    pub fn set_volume(&mut self, voice: VoiceKind, db: f64) {
        match voice {
            VoiceKind::Pad => self.pad = db,
            VoiceKind::Keys => self.keys = db,
            VoiceKind::Bass => self.bass = db,
            VoiceKind::Attractor => self.attractor = db,
        }
    }
}

/// A note (or chord) started on one of the voices.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTrigger {
    pub voice: VoiceKind,
    /// Graph time in seconds.
    pub time: f64,
    pub frequencies: Vec<f64>,
    /// Gate length in seconds; `None` for a held attack.
    pub duration: Option<f64>,
}

/// The attractor voice and the parameters the attractor drives.
struct AttractorChannel {
    voice: DuoVoice,
    frequency: Param,
    harmonicity: Param,
    vibrato_rate: Param,
    vibrato_amount: Param,
    volume: Param,
}

impl AttractorChannel {
    fn new(sample_rate: f64, config: &SynthConfig) -> Self {
        AttractorChannel {
            voice: DuoVoice::new(sample_rate, &config.attractor),
            frequency: Param::new(200.0),
            harmonicity: Param::new(1.5),
            vibrato_rate: Param::new(5.0),
            vibrato_amount: Param::new(0.5),
            volume: Param::new(ATTRACTOR_MUTED_DB),
        }
    }

    fn param_mut(&mut self, param: SynthParam) -> &mut Param {
        match param {
            SynthParam::Frequency => &mut self.frequency,
            SynthParam::Harmonicity => &mut self.harmonicity,
            SynthParam::VibratoRate => &mut self.vibrato_rate,
            SynthParam::VibratoAmount => &mut self.vibrato_amount,
            SynthParam::Volume => &mut self.volume,
        }
    }

    fn next_sample(&mut self, now: f64) -> f64 {
        // Params advance even when silent so automation stays on time.
        let controls = DuoControls {
            frequency: SynthParam::Frequency.clamp(self.frequency.advance(now)),
            harmonicity: SynthParam::Harmonicity.clamp(self.harmonicity.advance(now)),
            vibrato_rate: SynthParam::VibratoRate.clamp(self.vibrato_rate.advance(now)),
            vibrato_amount: SynthParam::VibratoAmount.clamp(self.vibrato_amount.advance(now)),
        };
        let gain = db_to_gain(SynthParam::Volume.clamp(self.volume.advance(now)));
        self.voice.next_sample(controls) * gain
    }
}

pub struct InstrumentGraph {
    sink: OutputSink,
    sample_rate: f64,
    frame: u64,

    pad: PolySynth<FmVoice>,
    pad_volume: Param,
    keys: PolySynth<SimpleVoice>,
    keys_volume: Param,
    bass: MonoSynth<BassVoice>,
    bass_volume: Param,
    attractor: AttractorChannel,

    delay: PingPongDelay,
    delay_wet: Param,
    reverb: Reverb,
    reverb_wet: Param,
    limiter: Limiter,
    master_volume: Param,

    triggers: Option<Vec<NoteTrigger>>,
}

impl InstrumentGraph {
    /// Build the graph. Voice levels come from `config` (the attractor
    /// starts muted), effect amounts from `mix`. The delay time is a dotted
    /// eighth at `bpm`. The master starts at unity.
    pub fn new(
        sink: OutputSink,
        sample_rate: f64,
        config: &SynthConfig,
        mix: &MixParams,
        bpm: f64,
    ) -> Self {
        let delay_time = Subdivision::DottedEighth
            .seconds(bpm)
            .min(DELAY_MAX_SECONDS);
        tracing::debug!(?sink, sample_rate, bpm, delay_time, "building instrument graph");

        InstrumentGraph {
            sink,
            sample_rate,
            frame: 0,
            pad: PolySynth::new(sample_rate, &config.pad),
            pad_volume: Param::new(config.pad.vol),
            keys: PolySynth::new(sample_rate, &config.keys),
            keys_volume: Param::new(config.keys.vol),
            bass: MonoSynth::new(sample_rate, &config.bass),
            bass_volume: Param::new(config.bass.vol),
            attractor: AttractorChannel::new(sample_rate, config),
            delay: PingPongDelay::new(
                sample_rate,
                DELAY_MAX_SECONDS,
                delay_time,
                DELAY_FEEDBACK,
                mix.delay,
            ),
            delay_wet: Param::new(mix.delay),
            reverb: Reverb::with_decay(sample_rate, REVERB_DECAY, REVERB_PRE_DELAY, mix.reverb),
            reverb_wet: Param::new(mix.reverb),
            limiter: Limiter::new(sample_rate, LIMITER_THRESHOLD_DB),
            master_volume: Param::new(0.0),
            triggers: None,
        }
    }

    pub fn sink(&self) -> OutputSink {
        self.sink
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Graph time in seconds: frames rendered so far over the sample rate.
    pub fn now(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }

    /// Start keeping a log of every note trigger.
    pub fn record_triggers(&mut self) {
        self.triggers.get_or_insert_with(Vec::new);
    }

    pub fn triggers(&self) -> &[NoteTrigger] {
        self.triggers.as_deref().unwrap_or(&[])
    }

    pub fn take_triggers(&mut self) -> Vec<NoteTrigger> {
        self.triggers.as_mut().map(std::mem::take).unwrap_or_default()
    }

    fn log_trigger(&mut self, voice: VoiceKind, frequencies: &[f64], duration: Option<f64>) {
        let time = self.now();
        if let Some(log) = self.triggers.as_mut() {
            log.push(NoteTrigger {
                voice,
                time,
                frequencies: frequencies.to_vec(),
                duration,
            });
        }
    }

    pub fn trigger_pad(&mut self, frequencies: &[f64], duration: f64) {
        self.pad.trigger_attack_release(frequencies, duration, VELOCITY);
        self.log_trigger(VoiceKind::Pad, frequencies, Some(duration));
    }

    pub fn trigger_keys(&mut self, frequencies: &[f64], duration: f64) {
        self.keys.trigger_attack_release(frequencies, duration, VELOCITY);
        self.log_trigger(VoiceKind::Keys, frequencies, Some(duration));
    }

    pub fn trigger_bass(&mut self, frequency: f64, duration: f64) {
        self.bass.trigger_attack_release(frequency, duration, VELOCITY);
        self.log_trigger(VoiceKind::Bass, &[frequency], Some(duration));
    }

    /// Start the held attractor note at `frequency` from graph time `at`.
    pub fn attractor_attack(&mut self, frequency: f64, at: f64) {
        self.attractor.frequency.set_value_at_time(frequency, at);
        self.attractor.voice.trigger_attack();
        self.log_trigger(VoiceKind::Attractor, &[frequency], None);
    }

    pub fn attractor_release(&mut self) {
        self.attractor.voice.trigger_release();
    }

    pub fn attractor_sounding(&self) -> bool {
        self.attractor.voice.is_sounding()
    }

    pub fn attractor_param(&mut self, param: SynthParam) -> &mut Param {
        self.attractor.param_mut(param)
    }

    pub fn volume(&mut self, voice: VoiceKind) -> &mut Param {
        match voice {
            VoiceKind::Pad => &mut self.pad_volume,
            VoiceKind::Keys => &mut self.keys_volume,
            VoiceKind::Bass => &mut self.bass_volume,
            VoiceKind::Attractor => &mut self.attractor.volume,
        }
    }

    pub fn reverb_wet(&mut self) -> &mut Param {
        &mut self.reverb_wet
    }

    pub fn delay_wet(&mut self) -> &mut Param {
        &mut self.delay_wet
    }

    pub fn master_volume(&mut self) -> &mut Param {
        &mut self.master_volume
    }

    /// Swap oscillator shapes and envelopes on every voice and fade the
    /// pad, keys and bass levels to the configured volumes. The attractor
    /// level is left alone: it only moves when driven explicitly.
    pub fn apply_synth_config(&mut self, config: &SynthConfig) {
        let now = self.now();
        self.pad.configure(&config.pad);
        self.keys.configure(&config.keys);
        self.bass.configure(&config.bass);
        self.attractor.voice.configure(&config.attractor);

        self.pad_volume.ramp_to(config.pad.vol, CONFIG_RAMP_SECONDS, now);
        self.keys_volume.ramp_to(config.keys.vol, CONFIG_RAMP_SECONDS, now);
        self.bass_volume.ramp_to(config.bass.vol, CONFIG_RAMP_SECONDS, now);
    }

    /// Render one stereo frame and advance graph time by one sample.
    pub fn next_frame(&mut self) -> (f32, f32) {
        let now = self.now();

        let pad = self.pad.next_sample() * db_to_gain(self.pad_volume.advance(now));
        let keys = self.keys.next_sample() * db_to_gain(self.keys_volume.advance(now));
        let bass = self.bass.next_sample() * db_to_gain(self.bass_volume.advance(now));
        let attractor = self.attractor.next_sample(now);

        self.delay.mix = self.delay_wet.advance(now).clamp(0.0, 1.0);
        let keys = keys as f32;
        let (dl, dr) = self.delay.process(keys, keys);

        self.reverb.mix = self.reverb_wet.advance(now).clamp(0.0, 1.0);
        let dry = (pad + attractor) as f32;
        let (rl, rr) = self.reverb.process(dry + dl, dry + dr);

        let bass = bass as f32;
        let (ll, lr) = self.limiter.process(rl + bass, rr + bass);

        let master = db_to_gain(self.master_volume.advance(now)) as f32;
        self.frame += 1;
        (ll * master, lr * master)
    }

    /// Render into a pair of channel slices.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.next_frame();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 8000.0;

    fn graph() -> InstrumentGraph {
        InstrumentGraph::new(
            OutputSink::Offline { frames: 0 },
            SR,
            &SynthConfig::default(),
            &MixParams::default(),
            60.0,
        )
    }

    fn peak(g: &mut InstrumentGraph, frames: usize) -> f32 {
        let mut l = vec![0.0; frames];
        let mut r = vec![0.0; frames];
        g.render(&mut l, &mut r);
        l.iter().chain(r.iter()).fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn silent_until_triggered() {
        let mut g = graph();
        assert_eq!(peak(&mut g, 800), 0.0);
        assert_eq!(g.frames_rendered(), 800);
        assert!((g.now() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn every_voice_reaches_the_output() {
        let cases: [(VoiceKind, fn(&mut InstrumentGraph)); 3] = [
            (VoiceKind::Pad, |g| g.trigger_pad(&[130.81, 196.0], 2.0)),
            (VoiceKind::Keys, |g| g.trigger_keys(&[523.25], 0.25)),
            (VoiceKind::Bass, |g| g.trigger_bass(65.41, 1.0)),
        ];
        for (kind, trigger) in cases {
            let mut g = graph();
            trigger(&mut g);
            assert!(peak(&mut g, 8000) > 1e-4, "{kind} silent");
        }
    }

    #[test]
    fn attractor_needs_volume() {
        let mut g = graph();
        g.attractor_attack(200.0, 0.0);
        let muted = peak(&mut g, 4000);

        let mut g = graph();
        g.attractor_attack(200.0, 0.0);
        g.volume(VoiceKind::Attractor).set_value(-6.0);
        let loud = peak(&mut g, 4000);
        assert!(loud > muted * 100.0);
    }

    #[test]
    fn output_stays_under_limiter_ceiling() {
        let mut g = graph();
        for kind in VoiceKind::ALL {
            g.volume(kind).set_value(6.0);
        }
        g.trigger_pad(&[65.0, 98.0, 130.0, 164.0, 196.0], 4.0);
        g.trigger_bass(41.2, 4.0);
        let p = peak(&mut g, 16000);
        assert!(p < 1.5, "peak {p}");
    }

    #[test]
    fn trigger_log_records_time() {
        let mut g = graph();
        g.trigger_pad(&[100.0], 1.0);
        assert!(g.triggers().is_empty());

        g.record_triggers();
        peak(&mut g, 800);
        g.trigger_keys(&[440.0], 0.25);
        let log = g.take_triggers();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].voice, VoiceKind::Keys);
        assert!((log[0].time - 0.1).abs() < 1e-12);
        assert_eq!(log[0].duration, Some(0.25));
        assert!(g.triggers().is_empty());
    }

    #[test]
    fn synth_config_ramps_levels() {
        let mut g = graph();
        let mut cfg = SynthConfig::default();
        cfg.pad.vol = -30.0;
        g.apply_synth_config(&cfg);
        assert!(g.volume(VoiceKind::Pad).is_ramping());
        peak(&mut g, 1600);
        assert_eq!(g.volume(VoiceKind::Pad).value(), -30.0);
    }

    #[test]
    fn synth_config_leaves_attractor_muted() {
        let mut g = graph();
        let mut cfg = SynthConfig::default();
        cfg.attractor.vol = 0.0;
        g.apply_synth_config(&cfg);
        assert!(!g.volume(VoiceKind::Attractor).is_ramping());
        peak(&mut g, 1600);
        assert_eq!(g.volume(VoiceKind::Attractor).value(), ATTRACTOR_MUTED_DB);
        assert_eq!(g.sink(), OutputSink::Offline { frames: 0 });
    }

    #[test]
    fn automation_lands_on_time() {
        let mut g = graph();
        g.attractor_param(SynthParam::Frequency)
            .set_value_at_time(440.0, 0.05);
        peak(&mut g, 399);
        assert_eq!(g.attractor_param(SynthParam::Frequency).value(), 200.0);
        peak(&mut g, 2);
        assert_eq!(g.attractor_param(SynthParam::Frequency).value(), 440.0);
    }

    #[test]
    fn voice_names_parse() {
        assert_eq!("pad".parse::<VoiceKind>().unwrap(), VoiceKind::Pad);
        assert_eq!("Bass".parse::<VoiceKind>().unwrap(), VoiceKind::Bass);
        assert!(matches!(
            "drums".parse::<VoiceKind>(),
            Err(EngineError::UnknownVoice(_))
        ));
    }

    #[test]
    fn mix_defaults() {
        let m = MixParams::default();
        assert_eq!(m.volume(VoiceKind::Attractor), -60.0);
        assert_eq!(m.master, -10.0);
        assert_eq!((m.reverb, m.delay), (0.5, 0.3));
    }
}
