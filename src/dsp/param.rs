//! Automatable parameters: discrete set-at-time events and linear ramps.
//!
//! Times are absolute graph time in seconds. A parameter is advanced once per
//! sample with the current time and returns the value for that sample.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
struct Ramp {
    from: f64,
    to: f64,
    start: f64,
    end: f64,
}

#[derive(Debug, Clone, Copy)]
struct SetEvent {
    time: f64,
    value: f64,
}

#[derive(Debug, Clone)]
pub struct Param {
    value: f64,
    ramp: Option<Ramp>,
    /// Pending set events, sorted by time.
    events: VecDeque<SetEvent>,
}

impl Param {
    pub fn new(value: f64) -> Self {
        Param {
            value,
            ramp: None,
            events: VecDeque::new(),
        }
    }

    /// Value as of the last `advance`.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Jump immediately, dropping any ramp in flight.
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
        self.ramp = None;
    }

    /// Schedule a step to `value` at `time`. Events with equal times keep
    /// their insertion order.
    pub fn set_value_at_time(&mut self, value: f64, time: f64) {
        let pos = self.events.partition_point(|e| e.time <= time);
        self.events.insert(pos, SetEvent { time, value });
    }

    /// Glide linearly from the current value to `target` over `duration`
    /// seconds starting at `now`. Pending steps after `now` are cancelled.
    pub fn ramp_to(&mut self, target: f64, duration: f64, now: f64) {
        self.events.retain(|e| e.time <= now);
        if duration <= 0.0 {
            self.set_value(target);
            return;
        }
        self.ramp = Some(Ramp {
            from: self.value,
            to: target,
            start: now,
            end: now + duration,
        });
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn is_ramping(&self) -> bool {
        self.ramp.is_some()
    }

    /// Apply everything due at `now` and return the current value.
    pub fn advance(&mut self, now: f64) -> f64 {
        while let Some(event) = self.events.front() {
            if event.time > now {
                break;
            }
            self.value = event.value;
            self.ramp = None;
            self.events.pop_front();
        }

        if let Some(ramp) = self.ramp {
            if now >= ramp.end {
                self.value = ramp.to;
                self.ramp = None;
            } else if now >= ramp.start {
                let t = (now - ramp.start) / (ramp.end - ramp.start);
                self.value = ramp.from + (ramp.to - ramp.from) * t;
            }
        }

        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_events_are_steps() {
        let mut p = Param::new(1.0);
        p.set_value_at_time(5.0, 0.5);
        p.set_value_at_time(3.0, 0.25);

        assert_eq!(p.advance(0.0), 1.0);
        assert_eq!(p.advance(0.24), 1.0);
        assert_eq!(p.advance(0.25), 3.0);
        assert_eq!(p.advance(0.49), 3.0);
        assert_eq!(p.advance(0.5), 5.0);
        assert_eq!(p.pending_events(), 0);
    }

    #[test]
    fn equal_times_keep_order() {
        let mut p = Param::new(0.0);
        p.set_value_at_time(1.0, 1.0);
        p.set_value_at_time(2.0, 1.0);
        assert_eq!(p.advance(1.0), 2.0);
    }

    #[test]
    fn ramp_is_linear() {
        let mut p = Param::new(0.0);
        p.ramp_to(10.0, 1.0, 0.0);
        assert!(p.is_ramping());
        assert!((p.advance(0.5) - 5.0).abs() < 1e-12);
        assert_eq!(p.advance(1.0), 10.0);
        assert!(!p.is_ramping());
        assert_eq!(p.advance(2.0), 10.0);
    }

    #[test]
    fn ramp_starts_from_current_value() {
        let mut p = Param::new(-12.0);
        p.advance(3.0);
        p.ramp_to(-6.0, 0.1, 3.0);
        assert!((p.advance(3.05) - -9.0).abs() < 1e-9);
    }

    #[test]
    fn zero_length_ramp_jumps() {
        let mut p = Param::new(0.0);
        p.ramp_to(4.0, 0.0, 0.0);
        assert_eq!(p.value(), 4.0);
    }

    #[test]
    fn ramp_cancels_future_steps() {
        let mut p = Param::new(0.0);
        p.set_value_at_time(99.0, 5.0);
        p.ramp_to(1.0, 0.1, 0.0);
        p.advance(10.0);
        assert_eq!(p.value(), 1.0);
    }
}
