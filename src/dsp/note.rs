//! Pitch names, MIDI numbers, frequencies and decibel helpers.

/// Standard concert pitch for A4.
pub const A4_HZ: f64 = 440.0;

/// Octaves accepted in pitch names: C-1 (MIDI 0) up to B9.
pub const OCTAVE_RANGE: std::ops::RangeInclusive<i32> = -1..=9;

/// Parse a pitch name (e.g. "C4", "F#3", "Bb1") into a MIDI note number.
pub fn note_to_midi(note: &str) -> Option<i32> {
    let bytes = note.as_bytes();
    if bytes.is_empty() {
        return None;
    }

    let base_semitone = match bytes[0].to_ascii_uppercase() as char {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let mut idx = 1;
    let mut semitone = base_semitone;

    if idx < bytes.len() {
        match bytes[idx] as char {
            '#' => {
                semitone += 1;
                idx += 1;
            }
            'b' => {
                semitone -= 1;
                idx += 1;
            }
            _ => {}
        }
    }

    let octave: i32 = note[idx..].parse().ok()?;
    if !OCTAVE_RANGE.contains(&octave) {
        return None;
    }

    // C4 = 60
    octave.checked_add(1)?.checked_mul(12)?.checked_add(semitone)
}

/// `A4_HZ * 2^((midi - 69) / 12)`
pub fn midi_to_frequency(midi: i32) -> f64 {
    A4_HZ * (2.0_f64).powf((midi as f64 - 69.0) / 12.0)
}

pub fn note_to_frequency(note: &str) -> Option<f64> {
    note_to_midi(note).map(midi_to_frequency)
}

/// Frequency of `note` shifted by `semitones`.
pub fn transpose(note: &str, semitones: i32) -> Option<f64> {
    note_to_midi(note).map(|m| midi_to_frequency(m + semitones))
}

/// Convert a level in decibels to linear gain.
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    if db == f64::NEG_INFINITY {
        0.0
    } else {
        10.0_f64.powf(db / 20.0)
    }
}

/// Convert linear gain to decibels.
#[inline]
pub fn gain_to_db(gain: f64) -> f64 {
    if gain <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}
