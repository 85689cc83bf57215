//! Resonant lowpass filters for the bass voice.

use std::f64::consts::PI;

/// A second-order lowpass (RBJ cookbook coefficients, Direct Form II
/// Transposed).
#[derive(Debug, Clone)]
pub struct BiquadLowpass {
    frequency: f64,
    q: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadLowpass {
    pub fn new(frequency: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = BiquadLowpass {
            frequency,
            q,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    fn update_coefficients(&mut self) {
        // Keep the cutoff strictly below Nyquist.
        let nyquist = self.sample_rate * 0.5;
        let freq = self.frequency.clamp(10.0, nyquist * 0.99);
        let w0 = 2.0 * PI * freq / self.sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * self.q);

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let a0 = 1.0 + alpha;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b0 / a0;
        self.a1 = (-2.0 * cos_w0) / a0;
        self.a2 = (1.0 - alpha) / a0;
        self.dirty = false;
    }

    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    pub fn set_frequency(&mut self, freq: f64) {
        if freq != self.frequency {
            self.frequency = freq;
            self.dirty = true;
        }
    }
}

/// Two cascaded biquads: a 24 dB/octave lowpass.
#[derive(Debug, Clone)]
pub struct Lowpass24 {
    stages: [BiquadLowpass; 2],
}

impl Lowpass24 {
    pub fn new(frequency: f64, q: f64, sample_rate: f64) -> Self {
        // Resonance goes on the first stage only; stacking it would double
        // the peak.
        Lowpass24 {
            stages: [
                BiquadLowpass::new(frequency, q, sample_rate),
                BiquadLowpass::new(frequency, std::f64::consts::FRAC_1_SQRT_2, sample_rate),
            ],
        }
    }

    pub fn set_frequency(&mut self, freq: f64) {
        for stage in &mut self.stages {
            stage.set_frequency(freq);
        }
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let [a, b] = &mut self.stages;
        b.process(a.process(input))
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}
