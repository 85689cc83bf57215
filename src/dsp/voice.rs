//! Voices: single note instances combining oscillators, envelopes and
//! (for the bass) a filter.

use crate::pattern::{AttractorConfig, InstrumentConfig};

use super::envelope::{Envelope, EnvelopeConfig};
use super::filter::Lowpass24;
use super::note::db_to_gain;
use super::oscillator::{Oscillator, OscillatorShape, Unison, Waveform};

/// A note-playing unit that a [`PolySynth`](super::synth::PolySynth) or
/// [`MonoSynth`](super::synth::MonoSynth) can allocate and drive.
pub trait SynthVoice {
    fn new(sample_rate: f64, config: &InstrumentConfig) -> Self
    where
        Self: Sized;

    fn note_on(&mut self, frequency: f64, velocity: f64);
    fn note_off(&mut self);
    fn next_sample(&mut self) -> f64;
    /// Envelope finished after release; the voice can be reused.
    fn is_finished(&self) -> bool;
    /// Swap oscillator shape and envelope. Sounding notes keep their pitch.
    fn configure(&mut self, config: &InstrumentConfig);
}

fn reshape(unison: &mut Unison, shape: OscillatorShape, sample_rate: f64) {
    if unison.shape() != shape {
        *unison = Unison::new(shape, sample_rate);
    }
}

/// One oscillator shaped by an ADSR envelope. Used for the keys.
#[derive(Debug, Clone)]
pub struct SimpleVoice {
    oscillator: Unison,
    envelope: Envelope,
    velocity: f64,
    sample_rate: f64,
}

impl SynthVoice for SimpleVoice {
    fn new(sample_rate: f64, config: &InstrumentConfig) -> Self {
        SimpleVoice {
            oscillator: Unison::new(config.osc, sample_rate),
            envelope: Envelope::from_config(&config.env, sample_rate),
            velocity: 1.0,
            sample_rate,
        }
    }

    fn note_on(&mut self, frequency: f64, velocity: f64) {
        self.oscillator.set_frequency(frequency);
        self.oscillator.reset();
        self.velocity = velocity;
        self.envelope.gate_on();
    }

    fn note_off(&mut self) {
        self.envelope.gate_off();
    }

    fn next_sample(&mut self) -> f64 {
        if self.envelope.is_finished() {
            return 0.0;
        }
        let env = self.envelope.next_sample();
        self.oscillator.next_sample() * env * self.velocity
    }

    fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    fn configure(&mut self, config: &InstrumentConfig) {
        reshape(&mut self.oscillator, config.osc, self.sample_rate);
        self.envelope.apply_config(&config.env);
    }
}

const PAD_HARMONICITY: f64 = 0.5;
const PAD_MODULATION_INDEX: f64 = 1.2;
const PAD_MODULATION_ENV: EnvelopeConfig = EnvelopeConfig::new(1.0, 3.0, 0.8, 5.0);

/// Two-operator FM voice: a sine modulator bends the carrier's frequency.
/// Used for the pad.
#[derive(Debug, Clone)]
pub struct FmVoice {
    carrier: Unison,
    modulator: Oscillator,
    envelope: Envelope,
    modulation_envelope: Envelope,
    frequency: f64,
    velocity: f64,
    sample_rate: f64,
}

impl SynthVoice for FmVoice {
    fn new(sample_rate: f64, config: &InstrumentConfig) -> Self {
        FmVoice {
            carrier: Unison::new(config.osc, sample_rate),
            modulator: Oscillator::new(Waveform::Sine, sample_rate),
            envelope: Envelope::from_config(&config.env, sample_rate),
            modulation_envelope: Envelope::from_config(&PAD_MODULATION_ENV, sample_rate),
            frequency: 440.0,
            velocity: 1.0,
            sample_rate,
        }
    }

    fn note_on(&mut self, frequency: f64, velocity: f64) {
        self.frequency = frequency;
        self.velocity = velocity;
        self.carrier.set_frequency(frequency);
        self.carrier.reset();
        self.modulator.frequency = frequency * PAD_HARMONICITY;
        self.modulator.reset();
        self.envelope.gate_on();
        self.modulation_envelope.gate_on();
    }

    fn note_off(&mut self) {
        self.envelope.gate_off();
        self.modulation_envelope.gate_off();
    }

    fn next_sample(&mut self) -> f64 {
        if self.envelope.is_finished() {
            return 0.0;
        }
        let modulator_freq = self.frequency * PAD_HARMONICITY;
        let deviation = PAD_MODULATION_INDEX * modulator_freq;
        let m = self.modulator.next_sample() * self.modulation_envelope.next_sample();
        self.carrier.set_frequency(self.frequency + m * deviation);

        let env = self.envelope.next_sample();
        self.carrier.next_sample() * env * self.velocity
    }

    fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    fn configure(&mut self, config: &InstrumentConfig) {
        reshape(&mut self.carrier, config.osc, self.sample_rate);
        self.envelope.apply_config(&config.env);
    }
}

const BASS_FILTER_Q: f64 = 2.0;
const BASS_FILTER_BASE: f64 = 50.0;
const BASS_FILTER_OCTAVES: f64 = 2.0;
const BASS_FILTER_ENV: EnvelopeConfig = EnvelopeConfig::new(0.01, 0.5, 0.2, 2.0);

/// Oscillator into a resonant 24 dB lowpass whose cutoff follows its own
/// envelope. Used for the bass.
#[derive(Debug, Clone)]
pub struct BassVoice {
    oscillator: Unison,
    envelope: Envelope,
    filter: Lowpass24,
    filter_envelope: Envelope,
    velocity: f64,
    sample_rate: f64,
}

impl SynthVoice for BassVoice {
    fn new(sample_rate: f64, config: &InstrumentConfig) -> Self {
        BassVoice {
            oscillator: Unison::new(config.osc, sample_rate),
            envelope: Envelope::from_config(&config.env, sample_rate),
            filter: Lowpass24::new(BASS_FILTER_BASE, BASS_FILTER_Q, sample_rate),
            filter_envelope: Envelope::from_config(&BASS_FILTER_ENV, sample_rate),
            velocity: 1.0,
            sample_rate,
        }
    }

    fn note_on(&mut self, frequency: f64, velocity: f64) {
        // Mono retrigger: keep the phase running to avoid a click.
        self.oscillator.set_frequency(frequency);
        self.velocity = velocity;
        self.envelope.gate_on();
        self.filter_envelope.gate_on();
    }

    fn note_off(&mut self) {
        self.envelope.gate_off();
        self.filter_envelope.gate_off();
    }

    fn next_sample(&mut self) -> f64 {
        if self.envelope.is_finished() {
            return 0.0;
        }
        let sweep = self.filter_envelope.next_sample();
        self.filter
            .set_frequency(BASS_FILTER_BASE * 2.0_f64.powf(BASS_FILTER_OCTAVES * sweep));
        let env = self.envelope.next_sample();
        self.filter.process(self.oscillator.next_sample()) * env * self.velocity
    }

    fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    fn configure(&mut self, config: &InstrumentConfig) {
        reshape(&mut self.oscillator, config.osc, self.sample_rate);
        self.envelope.apply_config(&config.env);
    }
}

/// Per-oscillator level inside the duo voice.
const DUO_VOICE_DB: f64 = -10.0;

/// Inputs to the duo voice for one sample.
#[derive(Debug, Clone, Copy)]
pub struct DuoControls {
    pub frequency: f64,
    pub harmonicity: f64,
    pub vibrato_rate: f64,
    /// 1.0 bends ±1 semitone.
    pub vibrato_amount: f64,
}

/// Two oscillators a harmonicity ratio apart, sharing one envelope and one
/// vibrato LFO. Its controls come from automatable parameters, so it is
/// driven sample by sample rather than through [`SynthVoice`].
#[derive(Debug, Clone)]
pub struct DuoVoice {
    osc0: Unison,
    osc1: Unison,
    vibrato: Oscillator,
    envelope: Envelope,
    sample_rate: f64,
}

impl DuoVoice {
    pub fn new(sample_rate: f64, config: &AttractorConfig) -> Self {
        DuoVoice {
            osc0: Unison::new(config.osc0, sample_rate),
            osc1: Unison::new(config.osc1, sample_rate),
            vibrato: Oscillator::new(Waveform::Sine, sample_rate),
            envelope: Envelope::from_config(&config.env, sample_rate),
            sample_rate,
        }
    }

    pub fn trigger_attack(&mut self) {
        self.osc0.reset();
        self.osc1.reset();
        self.envelope.gate_on();
    }

    pub fn trigger_release(&mut self) {
        self.envelope.gate_off();
    }

    pub fn is_sounding(&self) -> bool {
        !self.envelope.is_finished()
    }

    pub fn configure(&mut self, config: &AttractorConfig) {
        reshape(&mut self.osc0, config.osc0, self.sample_rate);
        reshape(&mut self.osc1, config.osc1, self.sample_rate);
        self.envelope.apply_config(&config.env);
    }

    pub fn next_sample(&mut self, controls: DuoControls) -> f64 {
        if self.envelope.is_finished() {
            return 0.0;
        }
        self.vibrato.frequency = controls.vibrato_rate.max(0.0);
        let bend = 2.0_f64.powf(self.vibrato.next_sample() * controls.vibrato_amount / 12.0);
        let f0 = controls.frequency * bend;
        self.osc0.set_frequency(f0);
        self.osc1.set_frequency(f0 * controls.harmonicity);

        let env = self.envelope.next_sample();
        (self.osc0.next_sample() + self.osc1.next_sample()) * db_to_gain(DUO_VOICE_DB) * env
    }
}
