//! Transport: the musical clock that drives repeating loops.
//!
//! Time advances one sample at a time while the transport is rendered.
//! Musical position is tracked in ticks (192 per quarter note, 4/4 time).
//! A loop fires on the sample nearest to each of its tick boundaries, and
//! every loop firing on the same tick sees the same [`Tick`] (same bar
//! index), so loops never disagree about which bar they are in.

use std::fmt;

use crate::dsp::param::Param;
use crate::graph::InstrumentGraph;

/// Ticks per quarter note.
pub const PPQ: u64 = 192;
pub const BEATS_PER_BAR: u64 = 4;
pub const TICKS_PER_BAR: u64 = PPQ * BEATS_PER_BAR;

/// Note lengths used as loop intervals and note durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subdivision {
    Bar,
    Quarter,
    DottedEighth,
    Eighth,
    Sixteenth,
}

impl Subdivision {
    pub fn ticks(self) -> u64 {
        match self {
            Subdivision::Bar => TICKS_PER_BAR,
            Subdivision::Quarter => PPQ,
            Subdivision::DottedEighth => PPQ * 3 / 4,
            Subdivision::Eighth => PPQ / 2,
            Subdivision::Sixteenth => PPQ / 4,
        }
    }

    /// Length in seconds at a fixed tempo.
    pub fn seconds(self, bpm: f64) -> f64 {
        self.ticks() as f64 * 60.0 / (bpm * PPQ as f64)
    }
}

/// What a loop callback sees when it fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Musical position of this firing.
    pub tick: u64,
    /// `tick / TICKS_PER_BAR`.
    pub bar: u64,
    /// Graph time in seconds.
    pub time: f64,
    pub bpm: f64,
}

impl Tick {
    fn new(tick: u64, time: f64, bpm: f64) -> Self {
        Tick {
            tick,
            bar: tick / TICKS_PER_BAR,
            time,
            bpm,
        }
    }

    /// Length of `sub` in seconds at the tempo current at this tick.
    pub fn duration(&self, sub: Subdivision) -> f64 {
        sub.seconds(self.bpm)
    }
}

pub type LoopCallback = Box<dyn FnMut(&Tick, &mut InstrumentGraph) + Send>;

/// Cancelable reference to a scheduled loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopHandle(u64);

impl fmt::Display for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop#{}", self.0)
    }
}

struct ScheduledLoop {
    handle: LoopHandle,
    interval: u64,
    start: u64,
    next_tick: u64,
    callback: LoopCallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Started,
}

pub struct Transport {
    sample_rate: f64,
    bpm: Param,
    state: TransportState,
    /// Fractional tick position.
    ticks: f64,
    loops: Vec<ScheduledLoop>,
    next_id: u64,
}

impl Transport {
    pub fn new(sample_rate: f64, bpm: f64) -> Self {
        Transport {
            sample_rate,
            bpm: Param::new(bpm),
            state: TransportState::Stopped,
            ticks: 0.0,
            loops: Vec::new(),
            next_id: 0,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm.value()
    }

    /// Glide to a new tempo over `duration` seconds from graph time `now`.
    pub fn ramp_bpm(&mut self, bpm: f64, duration: f64, now: f64) {
        self.bpm.ramp_to(bpm, duration, now);
    }

    /// Call `callback` every `interval`, starting at tick `start`.
    pub fn schedule_repeating(
        &mut self,
        interval: Subdivision,
        start: u64,
        callback: LoopCallback,
    ) -> LoopHandle {
        let handle = LoopHandle(self.next_id);
        self.next_id += 1;
        self.loops.push(ScheduledLoop {
            handle,
            interval: interval.ticks(),
            start,
            next_tick: self.first_tick_from(start, interval.ticks()),
            callback,
        });
        tracing::debug!(%handle, ?interval, start, "loop scheduled");
        handle
    }

    /// First firing at or after the current position.
    fn first_tick_from(&self, start: u64, interval: u64) -> u64 {
        let pos = self.ticks.ceil() as u64;
        if pos <= start {
            start
        } else {
            start + (pos - start).div_ceil(interval) * interval
        }
    }

    /// Drop one loop. Returns false if it was already gone.
    pub fn cancel(&mut self, handle: LoopHandle) -> bool {
        let before = self.loops.len();
        self.loops.retain(|l| l.handle != handle);
        before != self.loops.len()
    }

    /// Drop every scheduled loop.
    pub fn cancel_all(&mut self) {
        self.loops.clear();
    }

    pub fn active_loops(&self) -> usize {
        self.loops.len()
    }

    pub fn is_scheduled(&self, handle: LoopHandle) -> bool {
        self.loops.iter().any(|l| l.handle == handle)
    }

    /// Rewind to tick 0 and start running.
    pub fn start(&mut self) {
        self.ticks = 0.0;
        for l in &mut self.loops {
            l.next_tick = l.start;
        }
        self.state = TransportState::Started;
    }

    /// Halt; the position is kept until the next `start`.
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == TransportState::Started
    }

    pub fn position_ticks(&self) -> f64 {
        self.ticks
    }

    pub fn bar(&self) -> u64 {
        self.ticks.max(0.0) as u64 / TICKS_PER_BAR
    }

    /// Render `left.len()` frames of `graph`, firing loops as the clock
    /// passes their ticks.
    pub fn render(&mut self, graph: &mut InstrumentGraph, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let now = graph.now();
            let bpm = self.bpm.advance(now);
            if self.state == TransportState::Started {
                let ticks_per_sample = bpm / 60.0 * PPQ as f64 / self.sample_rate;
                self.fire_due(graph, now, bpm, ticks_per_sample);
                self.ticks += ticks_per_sample;
            }
            (*l, *r) = graph.next_frame();
        }
    }

    fn fire_due(&mut self, graph: &mut InstrumentGraph, now: f64, bpm: f64, ticks_per_sample: f64) {
        // Fire on the sample closest to the boundary.
        let horizon = self.ticks + ticks_per_sample * 0.5;
        for l in &mut self.loops {
            while (l.next_tick as f64) < horizon {
                let tick = Tick::new(l.next_tick, now, bpm);
                (l.callback)(&tick, graph);
                l.next_tick += l.interval;
            }
        }
    }
}
