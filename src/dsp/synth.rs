//! Voice allocation: polyphonic and monophonic wrappers around
//! [`SynthVoice`] implementations.

use crate::pattern::InstrumentConfig;

use super::voice::SynthVoice;

/// Voice limit per polyphonic instrument. Further notes are dropped.
pub const MAX_POLYPHONY: usize = 32;

#[derive(Debug, Clone)]
struct Slot<V> {
    voice: V,
    /// Samples left until the gate closes.
    gate: Option<usize>,
}

/// Plays any number of overlapping notes, each for a fixed gate length.
#[derive(Debug, Clone)]
pub struct PolySynth<V> {
    slots: Vec<Slot<V>>,
    config: InstrumentConfig,
    sample_rate: f64,
}

impl<V: SynthVoice> PolySynth<V> {
    pub fn new(sample_rate: f64, config: &InstrumentConfig) -> Self {
        PolySynth {
            slots: Vec::new(),
            config: config.clone(),
            sample_rate,
        }
    }

    /// Start every frequency in `frequencies` now and release each after
    /// `duration` seconds.
    pub fn trigger_attack_release(&mut self, frequencies: &[f64], duration: f64, velocity: f64) {
        let gate = (duration.max(0.0) * self.sample_rate).round() as usize;
        for &freq in frequencies {
            let free = self.slots.iter().position(|s| s.voice.is_finished());
            let slot = match free {
                Some(idx) => &mut self.slots[idx],
                None if self.slots.len() < MAX_POLYPHONY => {
                    self.slots.push(Slot {
                        voice: V::new(self.sample_rate, &self.config),
                        gate: None,
                    });
                    let last = self.slots.len() - 1;
                    &mut self.slots[last]
                }
                None => {
                    tracing::debug!(freq, "polyphony exhausted, dropping note");
                    continue;
                }
            };
            slot.voice.note_on(freq, velocity);
            slot.gate = Some(gate);
        }
    }

    pub fn configure(&mut self, config: &InstrumentConfig) {
        self.config = config.clone();
        for slot in &mut self.slots {
            slot.voice.configure(config);
        }
    }

    pub fn active_voices(&self) -> usize {
        self.slots.iter().filter(|s| !s.voice.is_finished()).count()
    }

    pub fn next_sample(&mut self) -> f64 {
        let mut sum = 0.0;
        for slot in &mut self.slots {
            if let Some(remaining) = slot.gate {
                if remaining == 0 {
                    slot.voice.note_off();
                    slot.gate = None;
                } else {
                    slot.gate = Some(remaining - 1);
                }
            }
            if !slot.voice.is_finished() {
                sum += slot.voice.next_sample();
            }
        }
        sum
    }
}

/// Plays one note at a time; a new note retriggers the single voice.
#[derive(Debug, Clone)]
pub struct MonoSynth<V> {
    voice: V,
    gate: Option<usize>,
    sample_rate: f64,
}

impl<V: SynthVoice> MonoSynth<V> {
    pub fn new(sample_rate: f64, config: &InstrumentConfig) -> Self {
        MonoSynth {
            voice: V::new(sample_rate, config),
            gate: None,
            sample_rate,
        }
    }

    pub fn trigger_attack_release(&mut self, frequency: f64, duration: f64, velocity: f64) {
        self.voice.note_on(frequency, velocity);
        self.gate = Some((duration.max(0.0) * self.sample_rate).round() as usize);
    }

    pub fn configure(&mut self, config: &InstrumentConfig) {
        self.voice.configure(config);
    }

    pub fn is_sounding(&self) -> bool {
        !self.voice.is_finished()
    }

    pub fn next_sample(&mut self) -> f64 {
        if let Some(remaining) = self.gate {
            if remaining == 0 {
                self.voice.note_off();
                self.gate = None;
            } else {
                self.gate = Some(remaining - 1);
            }
        }
        self.voice.next_sample()
    }
}
