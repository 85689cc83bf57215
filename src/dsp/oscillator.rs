//! Anti-aliased oscillators using PolyBLEP, plus detuned "fat" stacks.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Basic waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// Oscillator type as it appears in pattern JSON (`"triangle"`,
/// `"fatsawtooth"`...). Unrecognised names fall back to a triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OscillatorShape {
    Sine,
    Square,
    Sawtooth,
    Triangle,
    FatSine,
    FatSquare,
    FatSawtooth,
    FatTriangle,
    #[serde(other)]
    Unknown,
}

impl OscillatorShape {
    pub fn waveform(self) -> Waveform {
        match self {
            OscillatorShape::Sine | OscillatorShape::FatSine => Waveform::Sine,
            OscillatorShape::Square | OscillatorShape::FatSquare => Waveform::Square,
            OscillatorShape::Sawtooth | OscillatorShape::FatSawtooth => Waveform::Sawtooth,
            OscillatorShape::Triangle | OscillatorShape::FatTriangle | OscillatorShape::Unknown => {
                Waveform::Triangle
            }
        }
    }

    pub fn is_fat(self) -> bool {
        matches!(
            self,
            OscillatorShape::FatSine
                | OscillatorShape::FatSquare
                | OscillatorShape::FatSawtooth
                | OscillatorShape::FatTriangle
        )
    }
}

/// A band-limited oscillator with anti-aliasing (PolyBLEP).
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub frequency: f64,
    pub detune: f64, // in cents
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            frequency: 440.0,
            detune: 0.0,
            phase: 0.0,
            sample_rate,
        }
    }

    fn effective_freq(&self) -> f64 {
        self.frequency * (2.0_f64).powf(self.detune / 1200.0)
    }

    fn phase_inc(&self) -> f64 {
        self.effective_freq() / self.sample_rate
    }

    pub fn next_sample(&mut self) -> f64 {
        let inc = self.phase_inc();
        let sample = match self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Sawtooth => self.sawtooth(inc),
            Waveform::Square => self.square(inc),
            Waveform::Triangle => self.triangle(),
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }

        sample
    }

    fn sawtooth(&self, inc: f64) -> f64 {
        let naive = 2.0 * self.phase - 1.0;
        naive - poly_blep(self.phase, inc)
    }

    fn square(&self, inc: f64) -> f64 {
        let mut value = if self.phase < 0.5 { 1.0 } else { -1.0 };
        value += poly_blep(self.phase, inc);
        value -= poly_blep((self.phase + 0.5) % 1.0, inc);
        value
    }

    /// Piecewise linear: -1→+1 over [0, 0.5), +1→-1 over [0.5, 1).
    fn triangle(&self) -> f64 {
        if self.phase < 0.5 {
            4.0 * self.phase - 1.0
        } else {
            3.0 - 4.0 * self.phase
        }
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Start at a fixed phase offset in [0, 1).
    pub fn reset_to(&mut self, phase: f64) {
        self.phase = phase.rem_euclid(1.0);
    }
}

/// PolyBLEP correction around a discontinuity.
///
/// `t` is the phase [0, 1), `dt` is the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

/// Number of detuned copies in a fat oscillator.
const FAT_COUNT: usize = 3;
/// Total detune spread of a fat oscillator, in cents.
const FAT_SPREAD: f64 = 20.0;

/// One or more oscillators sounding the same pitch.
///
/// Plain shapes hold a single oscillator; fat shapes hold a small detuned
/// stack whose output is averaged.
#[derive(Debug, Clone)]
pub struct Unison {
    oscillators: Vec<Oscillator>,
    shape: OscillatorShape,
}

impl Unison {
    pub fn new(shape: OscillatorShape, sample_rate: f64) -> Self {
        let waveform = shape.waveform();
        let oscillators = if shape.is_fat() {
            (0..FAT_COUNT)
                .map(|i| {
                    let mut osc = Oscillator::new(waveform, sample_rate);
                    let step = FAT_SPREAD / (FAT_COUNT - 1) as f64;
                    osc.detune = -FAT_SPREAD / 2.0 + step * i as f64;
                    osc
                })
                .collect()
        } else {
            vec![Oscillator::new(waveform, sample_rate)]
        };
        Unison { oscillators, shape }
    }

    pub fn shape(&self) -> OscillatorShape {
        self.shape
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        for osc in &mut self.oscillators {
            osc.frequency = frequency;
        }
    }

    /// Restart all copies; fat stacks are spread across the cycle so the
    /// detuned copies do not start phase-aligned.
    pub fn reset(&mut self) {
        let n = self.oscillators.len() as f64;
        for (i, osc) in self.oscillators.iter_mut().enumerate() {
            osc.reset_to(i as f64 / n);
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        if self.oscillators.len() == 1 {
            return self.oscillators[0].next_sample();
        }
        let sum: f64 = self.oscillators.iter_mut().map(|o| o.next_sample()).sum();
        sum / self.oscillators.len() as f64
    }
}
