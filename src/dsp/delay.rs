//! Ping-pong delay: a stereo delay whose echoes alternate between sides.

/// A stereo ping-pong delay with feedback and dry/wet mix.
///
/// The input is summed to mono and written into the left line; each line's
/// output feeds the opposite line, so successive echoes bounce L, R, L...
#[derive(Debug, Clone)]
pub struct PingPongDelay {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    sample_rate: f64,

    /// Delay time in seconds.
    pub delay_time: f64,
    /// Feedback amount (0.0 = single echo).
    pub feedback: f64,
    /// Dry/wet mix (0.0 = fully dry, 1.0 = fully wet).
    pub mix: f64,
}

impl PingPongDelay {
    /// `max_delay_seconds` bounds the buffer; `delay_time` is clamped to it.
    pub fn new(sample_rate: f64, max_delay_seconds: f64, delay_time: f64, feedback: f64, mix: f64) -> Self {
        let buffer_size = (sample_rate * max_delay_seconds) as usize + 1;
        PingPongDelay {
            buffer_l: vec![0.0; buffer_size],
            buffer_r: vec![0.0; buffer_size],
            write_pos: 0,
            sample_rate,
            delay_time: delay_time.clamp(0.0, max_delay_seconds),
            feedback: feedback.clamp(0.0, 0.99),
            mix: mix.clamp(0.0, 1.0),
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let buffer_len = self.buffer_l.len();
        let delay_samples = ((self.delay_time * self.sample_rate) as usize).clamp(1, buffer_len - 1);

        let read_pos = (self.write_pos + buffer_len - delay_samples) % buffer_len;
        let delayed_l = self.buffer_l[read_pos];
        let delayed_r = self.buffer_r[read_pos];

        let feedback = self.feedback as f32;
        self.buffer_l[self.write_pos] = (left + right) * 0.5 + delayed_r * feedback;
        self.buffer_r[self.write_pos] = delayed_l * feedback;
        self.write_pos = (self.write_pos + 1) % buffer_len;

        let mix = self.mix as f32;
        (
            left * (1.0 - mix) + delayed_l * mix,
            right * (1.0 - mix) + delayed_r * mix,
        )
    }

    pub fn clear(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_dry() {
        let mut delay = PingPongDelay::new(44100.0, 2.0, 0.5, 0.4, 0.0);
        let (out_l, out_r) = delay.process(0.5, -0.5);
        assert!((out_l - 0.5).abs() < 1e-6);
        assert!((out_r + 0.5).abs() < 1e-6);
    }

    #[test]
    fn echoes_alternate_sides() {
        // 10 samples of delay at 1 kHz
        let mut delay = PingPongDelay::new(1000.0, 1.0, 0.01, 0.5, 1.0);
        delay.process(1.0, 1.0);
        for _ in 1..10 {
            let (l, r) = delay.process(0.0, 0.0);
            assert!(l.abs() < 1e-6 && r.abs() < 1e-6);
        }

        // First echo on the left only.
        let (l, r) = delay.process(0.0, 0.0);
        assert!((l - 1.0).abs() < 1e-6, "first echo left, got {l}");
        assert!(r.abs() < 1e-6);

        for _ in 1..10 {
            delay.process(0.0, 0.0);
        }

        // Second echo on the right, attenuated by feedback.
        let (l, r) = delay.process(0.0, 0.0);
        assert!(l.abs() < 1e-6);
        assert!((r - 0.5).abs() < 1e-6, "second echo right, got {r}");
    }

    #[test]
    fn clear_silences_tail() {
        let mut delay = PingPongDelay::new(1000.0, 1.0, 0.01, 0.9, 1.0);
        delay.process(1.0, 1.0);
        delay.clear();
        for _ in 0..100 {
            let (l, r) = delay.process(0.0, 0.0);
            assert_eq!((l, r), (0.0, 0.0));
        }
    }
}
