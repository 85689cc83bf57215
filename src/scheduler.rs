//! Musical scheduling: the chord loop, the arpeggio loop and attractor
//! automation from a precomputed trajectory.

use std::sync::Arc;

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::attractor::{AttractorMappings, TrajectoryPoint};
use crate::dsp::note::{note_to_frequency, transpose};
use crate::graph::InstrumentGraph;
use crate::pattern::Pattern;
use crate::transport::{LoopHandle, Subdivision, Tick, Transport};

/// Chance that an eighth-note slot plays an arpeggio note.
pub const ARPEGGIO_PROBABILITY: f64 = 0.7;
/// Arpeggio notes sound an octave above the chord.
pub const ARPEGGIO_TRANSPOSE: i32 = 12;
/// Pitch the attractor voice starts on.
pub const ATTRACTOR_START_HZ: f64 = 200.0;

/// Everything the loops need, moved into them when scheduled.
pub struct ScheduleContext {
    pub pattern: Arc<Pattern>,
    pub rng: StdRng,
}

/// Schedule the chord loop (every bar) and the arpeggio loop (every eighth)
/// on `transport`, both starting at tick 0.
///
/// Bar `n` plays chord `n mod len` on the pad and the matching bass note,
/// if the bass line has one, for a whole bar. On each eighth the arpeggio
/// rolls against [`ARPEGGIO_PROBABILITY`] and plays one random note of the
/// current chord, an octave up, for a sixteenth.
pub fn schedule_events(transport: &mut Transport, ctx: ScheduleContext) -> [LoopHandle; 2] {
    let ScheduleContext { pattern, mut rng } = ctx;
    tracing::debug!(bars = pattern.len(), "scheduling pattern loops");

    let chords = Arc::clone(&pattern);
    let chord_loop = transport.schedule_repeating(
        Subdivision::Bar,
        0,
        Box::new(move |tick: &Tick, graph: &mut InstrumentGraph| {
            let length = tick.duration(Subdivision::Bar);
            let frequencies = resolve(chords.chord_for_bar(tick.bar));
            if !frequencies.is_empty() {
                graph.trigger_pad(&frequencies, length);
            }
            if let Some(freq) = chords.bass_for_bar(tick.bar).and_then(note_to_frequency) {
                graph.trigger_bass(freq, length);
            }
        }),
    );

    let arpeggio_loop = transport.schedule_repeating(
        Subdivision::Eighth,
        0,
        Box::new(move |tick: &Tick, graph: &mut InstrumentGraph| {
            if !rng.gen_bool(ARPEGGIO_PROBABILITY) {
                return;
            }
            let chord = pattern.chord_for_bar(tick.bar);
            let Some(note) = chord.choose(&mut rng) else {
                return;
            };
            if let Some(freq) = transpose(note, ARPEGGIO_TRANSPOSE) {
                graph.trigger_keys(&[freq], tick.duration(Subdivision::Sixteenth));
            }
        }),
    );

    [chord_loop, arpeggio_loop]
}

fn resolve(notes: &[String]) -> Vec<f64> {
    notes.iter().filter_map(|n| note_to_frequency(n)).collect()
}

/// Start the attractor voice at [`ATTRACTOR_START_HZ`] and lay the
/// trajectory down as set-at-time automation, one event per axis per point.
/// Points with a NaN coordinate are skipped. Returns the number of points
/// applied.
pub fn schedule_trajectory(
    graph: &mut InstrumentGraph,
    mappings: &AttractorMappings,
    trajectory: &[TrajectoryPoint],
) -> usize {
    graph.attractor_attack(ATTRACTOR_START_HZ, graph.now());

    let mut applied = 0;
    for point in trajectory {
        let Some(targets) = mappings.targets(point.x, point.y, point.z) else {
            continue;
        };
        for (param, value) in targets {
            graph
                .attractor_param(param)
                .set_value_at_time(value, point.time);
        }
        applied += 1;
    }
    if applied < trajectory.len() {
        tracing::debug!(
            skipped = trajectory.len() - applied,
            "skipped trajectory points with NaN coordinates"
        );
    }
    applied
}
