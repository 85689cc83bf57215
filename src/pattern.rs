//! Patterns (chord progressions + bass lines), their optional synth
//! configuration, and the named pattern library.
//!
//! The JSON shape matches the document served by the pattern store:
//!
//! ```json
//! { "Ethereal": { "chords": [["C3", "G3"]], "bass": ["C2"], "synths": { ... } } }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attractor::AttractorMappings;
use crate::dsp::envelope::EnvelopeConfig;
use crate::dsp::note::note_to_midi;
use crate::dsp::oscillator::OscillatorShape;
use crate::error::EngineError;

/// Synthesis template for one voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Volume in dB.
    pub vol: f64,
    pub osc: OscillatorShape,
    pub env: EnvelopeConfig,
}

/// Synthesis template for the attractor voice plus its axis mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttractorConfig {
    pub vol: f64,
    pub osc0: OscillatorShape,
    pub osc1: OscillatorShape,
    pub env: EnvelopeConfig,
    #[serde(default)]
    pub mappings: AttractorMappings,
}

/// Per-voice configuration for a whole graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthConfig {
    pub pad: InstrumentConfig,
    pub keys: InstrumentConfig,
    pub bass: InstrumentConfig,
    pub attractor: AttractorConfig,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            pad: InstrumentConfig {
                vol: -12.0,
                osc: OscillatorShape::FatSawtooth,
                env: EnvelopeConfig::new(2.0, 3.0, 0.8, 5.0),
            },
            keys: InstrumentConfig {
                vol: -10.0,
                osc: OscillatorShape::Triangle,
                env: EnvelopeConfig::new(0.02, 0.3, 0.1, 1.5),
            },
            bass: InstrumentConfig {
                vol: -8.0,
                osc: OscillatorShape::Square,
                env: EnvelopeConfig::new(0.1, 0.5, 0.4, 2.0),
            },
            attractor: AttractorConfig {
                vol: -60.0,
                osc0: OscillatorShape::Sine,
                osc1: OscillatorShape::Triangle,
                env: EnvelopeConfig::new(0.1, 0.1, 1.0, 1.0),
                mappings: AttractorMappings::default(),
            },
        }
    }
}

/// A chord progression with an aligned bass line. Bar `i` plays
/// `chords[i % len]` and, when present, `bass[i % len]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub chords: Vec<Vec<String>>,
    #[serde(default)]
    pub bass: Vec<String>,
    /// Voice settings that travel with the pattern; defaults otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synths: Option<SynthConfig>,
}

impl Pattern {
    pub fn new(chords: &[&[&str]], bass: &[&str]) -> Self {
        Pattern {
            chords: chords
                .iter()
                .map(|c| c.iter().map(|n| n.to_string()).collect())
                .collect(),
            bass: bass.iter().map(|n| n.to_string()).collect(),
            synths: None,
        }
    }

    /// Number of bars before the progression repeats.
    pub fn len(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    fn bar_index(&self, bar: u64) -> Option<usize> {
        let len = self.chords.len() as u64;
        (len > 0).then(|| (bar % len) as usize)
    }

    /// Chord for bar `bar`, wrapping around the progression.
    pub fn chord_for_bar(&self, bar: u64) -> &[String] {
        self.bar_index(bar).map_or(&[], |i| &self.chords[i])
    }

    /// Bass note aligned with the chord for `bar`, if the bass line has one.
    pub fn bass_for_bar(&self, bar: u64) -> Option<&str> {
        self.bass
            .get(self.bar_index(bar)?)
            .map(String::as_str)
            .filter(|n| !n.is_empty())
    }

    /// The pattern's own synth config, or the compiled-in defaults.
    pub fn synth_config(&self) -> SynthConfig {
        self.synths.clone().unwrap_or_default()
    }

    /// Check the structural invariants: at least one chord, no empty chord,
    /// every pitch name parses.
    pub fn validate(&self, name: &str) -> Result<(), EngineError> {
        let invalid = |reason: String| EngineError::InvalidPattern {
            name: name.to_string(),
            reason,
        };

        if self.chords.is_empty() {
            return Err(invalid("no chords".into()));
        }
        for (i, chord) in self.chords.iter().enumerate() {
            if chord.is_empty() {
                return Err(invalid(format!("chord {i} is empty")));
            }
            if let Some(bad) = chord.iter().find(|n| note_to_midi(n).is_none()) {
                return Err(invalid(format!("chord {i} has bad pitch '{bad}'")));
            }
        }
        if let Some(bad) = self
            .bass
            .iter()
            .find(|n| !n.is_empty() && note_to_midi(n).is_none())
        {
            return Err(invalid(format!("bad bass pitch '{bad}'")));
        }
        Ok(())
    }
}

/// Name of the pattern selected when nothing else is configured.
pub const DEFAULT_PATTERN: &str = "Ethereal";

/// Named patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternLibrary {
    patterns: BTreeMap<String, Pattern>,
}

impl Default for PatternLibrary {
    fn default() -> Self {
        PatternLibrary::builtin()
    }
}

impl PatternLibrary {
    /// The compiled-in library.
    pub fn builtin() -> Self {
        let mut patterns = BTreeMap::new();
        patterns.insert(
            "Ethereal".to_string(),
            Pattern::new(
                &[
                    &["C3", "G3", "B3", "E4"], // Cmaj7
                    &["A2", "E3", "G3", "C4"], // Am7
                    &["F2", "C3", "E3", "A3"], // Fmaj7
                    &["G2", "D3", "F3", "B3"], // G7
                ],
                &["C2", "A1", "F1", "G1"],
            ),
        );
        patterns.insert(
            "Dark Space".to_string(),
            Pattern::new(
                &[
                    &["C3", "Eb3", "G3", "Bb3"], // Cm7
                    &["Ab2", "Eb3", "G3", "C4"], // Abmaj7
                    &["F2", "C3", "Eb3", "Ab3"], // Fm7
                    &["G2", "D3", "F3", "B3"],   // G7
                ],
                &["C2", "Ab1", "F1", "G1"],
            ),
        );
        patterns.insert(
            "Mystery".to_string(),
            Pattern::new(
                &[
                    &["D3", "F3", "A3", "C4"],  // Dm7
                    &["Bb2", "F3", "A3", "D4"], // Bbmaj7
                    &["G2", "D3", "F3", "Bb3"], // Gm7
                    &["A2", "E3", "G3", "C4"],  // Am7
                ],
                &["D2", "Bb1", "G1", "A1"],
            ),
        );
        patterns.insert(
            "Drone".to_string(),
            Pattern::new(
                &[
                    &["C3", "G3", "C4"],
                    &["C3", "G3", "D4"],
                    &["C3", "F3", "C4"],
                    &["C3", "G3", "B3"],
                ],
                &["C2", "C2", "C2", "C2"],
            ),
        );
        PatternLibrary { patterns }
    }

    /// Parse a name → pattern JSON document. Rejects the whole document if
    /// it is empty or any pattern is invalid.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let library: PatternLibrary = serde_json::from_str(json)?;
        if library.patterns.is_empty() {
            return Err(EngineError::EmptyLibrary);
        }
        for (name, pattern) in &library.patterns {
            pattern.validate(name)?;
        }
        Ok(library)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn names(&self) -> Vec<String> {
        self.patterns.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Pattern> {
        self.patterns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.patterns.contains_key(name)
    }

    pub fn first_name(&self) -> Option<&str> {
        self.patterns.keys().next().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Add or replace one pattern after validating it.
    pub fn insert(&mut self, name: &str, pattern: Pattern) -> Result<(), EngineError> {
        pattern.validate(name)?;
        self.patterns.insert(name.to_string(), pattern);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_patterns_are_valid() {
        let lib = PatternLibrary::builtin();
        assert_eq!(lib.names(), vec!["Dark Space", "Drone", "Ethereal", "Mystery"]);
        assert!(lib.contains(DEFAULT_PATTERN));
        for name in lib.names() {
            let p = lib.get(&name).unwrap();
            p.validate(&name).unwrap();
            assert_eq!(p.chords.len(), p.bass.len());
        }
    }

    #[test]
    fn bar_lookup_wraps() {
        let lib = PatternLibrary::builtin();
        let p = lib.get("Ethereal").unwrap();
        assert_eq!(p.chord_for_bar(0), p.chord_for_bar(4));
        assert_eq!(p.chord_for_bar(1)[0], "A2");
        assert_eq!(p.bass_for_bar(6), Some("F1"));
    }

    #[test]
    fn short_bass_line_leaves_gaps() {
        let p = Pattern::new(&[&["C3"], &["D3"], &["E3"]], &["C2"]);
        assert_eq!(p.bass_for_bar(0), Some("C2"));
        assert_eq!(p.bass_for_bar(1), None);
        assert_eq!(p.bass_for_bar(3), Some("C2"));
    }

    #[test]
    fn parses_store_document() {
        let json = r#"{
            "Sparse": {
                "chords": [["C3", "E3"], ["F3", "A3"]],
                "bass": ["C2", "F1"],
                "synths": {
                    "pad": {"vol": -6, "osc": "sine", "env": {"attack": 1, "decay": 1, "sustain": 0.5, "release": 2}},
                    "keys": {"vol": -9, "osc": "square", "env": {"attack": 0.01, "decay": 0.2, "sustain": 0.2, "release": 1}},
                    "bass": {"vol": -7, "osc": "sawtooth", "env": {"attack": 0.1, "decay": 0.5, "sustain": 0.4, "release": 2}},
                    "attractor": {
                        "vol": -30, "osc0": "sine", "osc1": "sine",
                        "env": {"attack": 0.1, "decay": 0.1, "sustain": 1, "release": 1},
                        "mappings": {
                            "x": {"param": "volume", "min": -40, "max": -10},
                            "y": {"param": "vibratoAmount", "min": 0, "max": 1},
                            "z": {"param": "frequency", "min": 50, "max": 400}
                        }
                    }
                }
            },
            "Plain": {"chords": [["A2", "C3", "E3"]]}
        }"#;
        let lib = PatternLibrary::from_json(json).unwrap();
        assert_eq!(lib.len(), 2);

        let sparse = lib.get("Sparse").unwrap();
        let cfg = sparse.synth_config();
        assert_eq!(cfg.pad.osc, OscillatorShape::Sine);
        assert_eq!(cfg.attractor.mappings.z.max, 400.0);

        let plain = lib.get("Plain").unwrap();
        assert!(plain.synths.is_none());
        assert_eq!(plain.synth_config(), SynthConfig::default());
        assert_eq!(plain.bass_for_bar(0), None);
    }

    #[test]
    fn rejects_bad_documents() {
        assert!(matches!(PatternLibrary::from_json("{}"), Err(EngineError::EmptyLibrary)));
        assert!(matches!(PatternLibrary::from_json("[1,2]"), Err(EngineError::PatternJson(_))));
        assert!(matches!(
            PatternLibrary::from_json(r#"{"Empty": {"chords": []}}"#),
            Err(EngineError::InvalidPattern { .. })
        ));
        assert!(matches!(
            PatternLibrary::from_json(r#"{"Bad": {"chords": [["C3", "Q9"]]}}"#),
            Err(EngineError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn rejects_unplayable_octaves() {
        assert!(matches!(
            PatternLibrary::from_json(r#"{"X": {"chords": [["C999999999"]]}}"#),
            Err(EngineError::InvalidPattern { .. })
        ));
        assert!(matches!(
            PatternLibrary::from_json(r#"{"X": {"chords": [["C3"]], "bass": ["E-2147483648"]}}"#),
            Err(EngineError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn json_round_trip_keeps_library() {
        let lib = PatternLibrary::builtin();
        let back = PatternLibrary::from_json(&lib.to_json().unwrap()).unwrap();
        assert_eq!(lib, back);
    }

    #[test]
    fn insert_validates() {
        let mut lib = PatternLibrary::builtin();
        assert!(lib.insert("Broken", Pattern::new(&[], &[])).is_err());
        lib.insert("Fifths", Pattern::new(&[&["C3", "G3"]], &["C2"])).unwrap();
        assert!(lib.contains("Fifths"));
    }
}
