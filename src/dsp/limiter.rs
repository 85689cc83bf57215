//! Peak limiter: the last stage before the master gain.
//!
//! A feed-forward compressor with an infinite ratio: any envelope level above
//! the threshold is pulled back down to it.

use super::note::{db_to_gain, gain_to_db};

#[derive(Debug, Clone)]
pub struct Limiter {
    sample_rate: f64,

    /// Ceiling in dB.
    pub threshold: f64,
    /// Attack time in seconds.
    pub attack: f64,
    /// Release time in seconds.
    pub release: f64,

    envelope: f64,
}

impl Limiter {
    pub fn new(sample_rate: f64, threshold: f64) -> Self {
        Limiter {
            sample_rate,
            threshold: threshold.min(0.0),
            attack: 0.001,
            release: 0.1,
            envelope: 0.0,
        }
    }

    #[inline]
    fn gain_reduction_db(&self) -> f64 {
        let level_db = gain_to_db(self.envelope);
        if level_db <= self.threshold {
            0.0
        } else {
            self.threshold - level_db
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input_level = left.abs().max(right.abs()) as f64;

        let coef = if input_level > self.envelope {
            (-1.0 / (self.attack * self.sample_rate)).exp()
        } else {
            (-1.0 / (self.release * self.sample_rate)).exp()
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * input_level;

        let gain = db_to_gain(self.gain_reduction_db()) as f32;
        (left * gain, right * gain)
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    /// Current gain reduction in dB (positive number), for metering.
    pub fn reduction(&self) -> f64 {
        -self.gain_reduction_db()
    }
}
