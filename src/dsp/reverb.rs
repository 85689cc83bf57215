//! Algorithmic reverb: Freeverb-style comb/allpass network with pre-delay.

#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    damp: f32,
    store: f32,
}

impl Comb {
    fn new(size: usize) -> Self {
        Comb {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback: 0.84,
            damp: 0.2,
            store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];
        // One-pole lowpass in the feedback path.
        self.store = output * (1.0 - self.damp) + self.store * self.damp;
        self.buffer[self.index] = input + self.store * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.store = 0.0;
    }
}

#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    fn new(size: usize) -> Self {
        Allpass {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.index];
        self.buffer[self.index] = input + delayed * 0.5;
        self.index = (self.index + 1) % self.buffer.len();
        delayed - input
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

// Line lengths in samples at 44.1 kHz.
const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;
const INPUT_GAIN: f32 = 0.015;

/// A stereo reverb with a pre-delay line ahead of the tank.
#[derive(Debug, Clone)]
pub struct Reverb {
    comb_l: Vec<Comb>,
    comb_r: Vec<Comb>,
    allpass_l: Vec<Allpass>,
    allpass_r: Vec<Allpass>,
    pre_delay: Vec<f32>,
    pre_pos: usize,

    /// Room size in [0, 1]; larger rooms ring longer.
    pub room_size: f64,
    /// High-frequency damping in [0, 1].
    pub damping: f64,
    /// Dry/wet mix (0.0 = fully dry, 1.0 = fully wet).
    pub mix: f64,
}

impl Reverb {
    pub fn new(sample_rate: f64, room_size: f64, damping: f64, pre_delay: f64, mix: f64) -> Self {
        let scale = sample_rate / 44100.0;
        let line = |t: usize, spread: usize| ((t + spread) as f64 * scale) as usize;

        let mut reverb = Reverb {
            comb_l: COMB_TUNING.iter().map(|&t| Comb::new(line(t, 0))).collect(),
            comb_r: COMB_TUNING.iter().map(|&t| Comb::new(line(t, STEREO_SPREAD))).collect(),
            allpass_l: ALLPASS_TUNING.iter().map(|&t| Allpass::new(line(t, 0))).collect(),
            allpass_r: ALLPASS_TUNING.iter().map(|&t| Allpass::new(line(t, STEREO_SPREAD))).collect(),
            pre_delay: vec![0.0; ((pre_delay.max(0.0) * sample_rate) as usize).max(1)],
            pre_pos: 0,
            room_size: room_size.clamp(0.0, 1.0),
            damping: damping.clamp(0.0, 1.0),
            mix: mix.clamp(0.0, 1.0),
        };
        reverb.update_parameters();
        reverb
    }

    /// Build a reverb whose tail rings for roughly `decay` seconds.
    pub fn with_decay(sample_rate: f64, decay: f64, pre_delay: f64, mix: f64) -> Self {
        Reverb::new(sample_rate, decay_to_room_size(decay), 0.5, pre_delay, mix)
    }

    /// Push `room_size` / `damping` into the comb filters.
    pub fn update_parameters(&mut self) {
        let feedback = (self.room_size * 0.28 + 0.7) as f32;
        let damp = self.damping as f32 * 0.4;
        for comb in self.comb_l.iter_mut().chain(self.comb_r.iter_mut()) {
            comb.feedback = feedback;
            comb.damp = damp;
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input = self.pre_delay[self.pre_pos];
        self.pre_delay[self.pre_pos] = (left + right) * INPUT_GAIN;
        self.pre_pos = (self.pre_pos + 1) % self.pre_delay.len();

        let mut out_l: f32 = self.comb_l.iter_mut().map(|c| c.process(input)).sum();
        let mut out_r: f32 = self.comb_r.iter_mut().map(|c| c.process(input)).sum();
        for ap in &mut self.allpass_l {
            out_l = ap.process(out_l);
        }
        for ap in &mut self.allpass_r {
            out_r = ap.process(out_r);
        }

        let mix = self.mix as f32;
        (left * (1.0 - mix) + out_l * mix, right * (1.0 - mix) + out_r * mix)
    }

    pub fn clear(&mut self) {
        self.comb_l.iter_mut().chain(self.comb_r.iter_mut()).for_each(Comb::clear);
        self.allpass_l.iter_mut().chain(self.allpass_r.iter_mut()).for_each(Allpass::clear);
        self.pre_delay.fill(0.0);
    }
}

/// Map a decay time in seconds onto the comb network's room size.
fn decay_to_room_size(decay: f64) -> f64 {
    let decay = decay.max(0.0);
    (decay / (decay + 2.0)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_dry() {
        let mut reverb = Reverb::new(44100.0, 0.5, 0.5, 0.0, 0.0);
        let (out_l, out_r) = reverb.process(0.5, -0.5);
        assert!((out_l - 0.5).abs() < 1e-6);
        assert!((out_r + 0.5).abs() < 1e-6);
    }

    #[test]
    fn produces_tail_after_pre_delay() {
        let sr = 8000.0;
        let mut reverb = Reverb::new(sr, 0.5, 0.5, 0.2, 1.0);
        reverb.process(1.0, 1.0);

        // Nothing before the pre-delay has elapsed.
        for _ in 0..1500 {
            let (l, r) = reverb.process(0.0, 0.0);
            assert_eq!((l, r), (0.0, 0.0));
        }

        let mut found = false;
        for _ in 0..4000 {
            let (l, r) = reverb.process(0.0, 0.0);
            if l.abs() > 1e-4 || r.abs() > 1e-4 {
                found = true;
                break;
            }
        }
        assert!(found, "Reverb should ring after the pre-delay");
    }

    #[test]
    fn longer_decay_means_bigger_room() {
        assert!(decay_to_room_size(10.0) > decay_to_room_size(1.0));
        assert!(decay_to_room_size(1000.0) <= 1.0);
        assert_eq!(decay_to_room_size(-3.0), 0.0);
    }

    #[test]
    fn decays_over_time() {
        let mut reverb = Reverb::new(44100.0, 0.3, 0.5, 0.0, 1.0);
        reverb.process(1.0, 1.0);
        for _ in 0..2000 {
            reverb.process(0.0, 0.0);
        }
        let mut later_max = 0.0f32;
        for _ in 0..44100 {
            let (l, r) = reverb.process(0.0, 0.0);
            later_max = later_max.max(l.abs().max(r.abs()));
        }
        assert!(later_max < 0.1, "Reverb should decay, got {later_max}");
    }
}
