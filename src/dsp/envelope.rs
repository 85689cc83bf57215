//! ADSR envelope generator.

use serde::{Deserialize, Serialize};

/// ADSR times in seconds, sustain as a level in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl EnvelopeConfig {
    pub const fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        EnvelopeConfig {
            attack,
            decay,
            sustain,
            release,
        }
    }
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        EnvelopeConfig::new(0.01, 0.1, 0.7, 0.3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR envelope with linear attack/decay/release segments.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,

    stage: Stage,
    level: f64,
    sample_rate: f64,
    stage_samples: usize,
    stage_counter: usize,
    /// Level at the start of the current stage (retrigger / release).
    start_level: f64,
}

impl Envelope {
    pub fn new(sample_rate: f64) -> Self {
        Envelope::from_config(&EnvelopeConfig::default(), sample_rate)
    }

    pub fn from_config(config: &EnvelopeConfig, sample_rate: f64) -> Self {
        let mut env = Envelope {
            attack: 0.0,
            decay: 0.0,
            sustain: 0.0,
            release: 0.0,
            stage: Stage::Idle,
            level: 0.0,
            sample_rate,
            stage_samples: 0,
            stage_counter: 0,
            start_level: 0.0,
        };
        env.apply_config(config);
        env
    }

    /// Replace the ADSR times; takes effect from the next stage change.
    pub fn apply_config(&mut self, config: &EnvelopeConfig) {
        self.attack = config.attack.max(0.0);
        self.decay = config.decay.max(0.0);
        self.sustain = config.sustain.clamp(0.0, 1.0);
        self.release = config.release.max(0.0);
    }

    /// Note on. Retriggers from the current level.
    pub fn gate_on(&mut self) {
        self.stage = Stage::Attack;
        self.stage_samples = (self.attack * self.sample_rate) as usize;
        self.stage_counter = 0;
        self.start_level = self.level;
    }

    /// Note off.
    pub fn gate_off(&mut self) {
        if self.stage == Stage::Idle || self.stage == Stage::Release {
            return;
        }
        self.stage = Stage::Release;
        self.stage_samples = (self.release * self.sample_rate) as usize;
        self.stage_counter = 0;
        self.start_level = self.level;
    }

    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            Stage::Idle => {
                self.level = 0.0;
            }
            Stage::Attack => {
                if self.stage_samples == 0 {
                    self.level = 1.0;
                    self.enter_decay();
                } else {
                    let t = self.stage_counter as f64 / self.stage_samples as f64;
                    self.level = self.start_level + (1.0 - self.start_level) * t;
                    self.stage_counter += 1;
                    if self.stage_counter >= self.stage_samples {
                        self.level = 1.0;
                        self.enter_decay();
                    }
                }
            }
            Stage::Decay => {
                if self.stage_samples == 0 {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                } else {
                    let t = self.stage_counter as f64 / self.stage_samples as f64;
                    self.level = 1.0 - (1.0 - self.sustain) * t;
                    self.stage_counter += 1;
                    if self.stage_counter >= self.stage_samples {
                        self.level = self.sustain;
                        self.stage = Stage::Sustain;
                    }
                }
            }
            Stage::Sustain => {
                self.level = self.sustain;
            }
            Stage::Release => {
                if self.stage_samples == 0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                } else {
                    let t = self.stage_counter as f64 / self.stage_samples as f64;
                    self.level = self.start_level * (1.0 - t);
                    self.stage_counter += 1;
                    if self.stage_counter >= self.stage_samples {
                        self.level = 0.0;
                        self.stage = Stage::Idle;
                    }
                }
            }
        }
        self.level
    }

    /// Idle after release (or never triggered).
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == Stage::Release
    }

    fn enter_decay(&mut self) {
        self.stage = Stage::Decay;
        self.stage_samples = (self.decay * self.sample_rate) as usize;
        self.stage_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let env = Envelope::new(44100.0);
        assert!(env.is_finished());
    }

    #[test]
    fn attack_reaches_one() {
        let mut env = Envelope::new(44100.0);
        env.attack = 0.01;
        env.gate_on();

        let mut max_level = 0.0;
        for _ in 0..500 {
            max_level = f64::max(max_level, env.next_sample());
        }
        assert!((max_level - 1.0).abs() < 0.01, "Attack should reach ~1.0, got {max_level}");
    }

    #[test]
    fn sustain_holds() {
        let cfg = EnvelopeConfig::new(0.001, 0.001, 0.6, 0.3);
        let mut env = Envelope::from_config(&cfg, 44100.0);
        env.gate_on();
        for _ in 0..500 {
            env.next_sample();
        }
        let s = env.next_sample();
        assert!((s - 0.6).abs() < 0.01, "Should sustain at 0.6, got {s}");
    }

    #[test]
    fn release_to_zero() {
        let cfg = EnvelopeConfig::new(0.001, 0.001, 0.7, 0.01);
        let mut env = Envelope::from_config(&cfg, 44100.0);
        env.gate_on();
        for _ in 0..500 {
            env.next_sample();
        }
        env.gate_off();
        assert!(env.is_releasing());
        for _ in 0..1000 {
            env.next_sample();
        }
        assert!(env.is_finished());
        assert!(env.level.abs() < 0.001);
    }

    #[test]
    fn config_is_sanitised() {
        let cfg = EnvelopeConfig::new(-1.0, 0.1, 2.0, 0.1);
        let env = Envelope::from_config(&cfg, 44100.0);
        assert_eq!(env.attack, 0.0);
        assert_eq!(env.sustain, 1.0);
    }

    #[test]
    fn full_cycle_range() {
        let cfg = EnvelopeConfig::new(0.01, 0.05, 0.5, 0.1);
        let mut env = Envelope::from_config(&cfg, 44100.0);
        env.gate_on();
        for _ in 0..10000 {
            let s = env.next_sample();
            assert!((0.0..=1.0).contains(&s), "Envelope out of range: {s}");
        }
        env.gate_off();
        for _ in 0..10000 {
            let s = env.next_sample();
            assert!((0.0..=1.0).contains(&s), "Envelope out of range after release: {s}");
        }
        assert!(env.is_finished());
    }
}
