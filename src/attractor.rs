//! Mapping attractor coordinates onto synthesis parameters.
//!
//! Each spatial axis drives one parameter of the attractor voice. The axis
//! magnitude is normalised against [`AXIS_SCALE`] (the rough extent of the
//! attractors being visualised), interpolated into the mapping's output
//! range, then clamped to what the parameter can safely take.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Axis magnitude that maps to the top of an output range.
pub const AXIS_SCALE: f64 = 20.0;

pub const MIN_FREQUENCY: f64 = 20.0;
pub const MAX_FREQUENCY: f64 = 20000.0;
/// Headroom allowed when an axis drives the attractor volume.
pub const MAX_VOLUME_DB: f64 = 6.0;

/// Attractor voice parameter an axis can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SynthParam {
    Frequency,
    Harmonicity,
    VibratoRate,
    VibratoAmount,
    Volume,
}

impl SynthParam {
    pub const ALL: [SynthParam; 5] = [
        SynthParam::Frequency,
        SynthParam::Harmonicity,
        SynthParam::VibratoRate,
        SynthParam::VibratoAmount,
        SynthParam::Volume,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SynthParam::Frequency => "frequency",
            SynthParam::Harmonicity => "harmonicity",
            SynthParam::VibratoRate => "vibratoRate",
            SynthParam::VibratoAmount => "vibratoAmount",
            SynthParam::Volume => "volume",
        }
    }

    /// Clamp `value` into this parameter's safe domain.
    pub fn clamp(self, value: f64) -> f64 {
        match self {
            SynthParam::Frequency => value.clamp(MIN_FREQUENCY, MAX_FREQUENCY),
            SynthParam::Harmonicity | SynthParam::VibratoRate => value.max(0.0),
            SynthParam::VibratoAmount => value.clamp(0.0, 1.0),
            SynthParam::Volume => value.min(MAX_VOLUME_DB),
        }
    }
}

impl fmt::Display for SynthParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SynthParam {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SynthParam::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| EngineError::UnknownSynthParam(s.to_string()))
    }
}

/// Target parameter and output range for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisMapping {
    pub param: SynthParam,
    pub min: f64,
    pub max: f64,
}

impl AxisMapping {
    pub const fn new(param: SynthParam, min: f64, max: f64) -> Self {
        AxisMapping { param, min, max }
    }

    /// `|value| / AXIS_SCALE` capped at 1.
    pub fn normalize(value: f64) -> f64 {
        (value.abs() / AXIS_SCALE).min(1.0)
    }

    /// Parameter value for an axis coordinate.
    pub fn map(&self, value: f64) -> f64 {
        let norm = Self::normalize(value);
        self.param.clamp(self.min + (self.max - self.min) * norm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttractorMappings {
    pub x: AxisMapping,
    pub y: AxisMapping,
    pub z: AxisMapping,
}

impl Default for AttractorMappings {
    fn default() -> Self {
        AttractorMappings {
            x: AxisMapping::new(SynthParam::Frequency, 100.0, 800.0),
            y: AxisMapping::new(SynthParam::Harmonicity, 0.5, 2.0),
            z: AxisMapping::new(SynthParam::VibratoRate, 1.0, 10.0),
        }
    }
}

impl AttractorMappings {
    /// Mapped `(param, value)` for each axis, or `None` if any coordinate is
    /// NaN.
    pub fn targets(&self, x: f64, y: f64, z: f64) -> Option<[(SynthParam, f64); 3]> {
        if x.is_nan() || y.is_nan() || z.is_nan() {
            return None;
        }
        Some([
            (self.x.param, self.x.map(x)),
            (self.y.param, self.y.map(y)),
            (self.z.param, self.z.map(z)),
        ])
    }
}

/// One externally simulated attractor sample. `time` is seconds from the
/// start of the render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    #[serde(alias = "t")]
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl TrajectoryPoint {
    pub const fn new(time: f64, x: f64, y: f64, z: f64) -> Self {
        TrajectoryPoint { time, x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_mapping_endpoints() {
        let m = AxisMapping::new(SynthParam::Frequency, 100.0, 800.0);
        assert_eq!(AxisMapping::normalize(20.0), 1.0);
        assert_eq!(m.map(20.0), 800.0);
        assert_eq!(m.map(-20.0), 800.0);
        assert_eq!(m.map(0.0), 100.0);
        assert_eq!(m.map(55.0), m.map(20.0));
        assert!((m.map(10.0) - 450.0).abs() < 1e-9);
    }

    #[test]
    fn frequency_always_clamped() {
        let wide = AxisMapping::new(SynthParam::Frequency, -500.0, 90_000.0);
        for v in [0.0, 0.1, 1.0, 5.0, 19.9, 20.0, 1e9, -1e9, f64::INFINITY] {
            let out = wide.map(v);
            assert!((MIN_FREQUENCY..=MAX_FREQUENCY).contains(&out), "{v} -> {out}");
        }
    }

    #[test]
    fn other_params_clamped() {
        assert_eq!(SynthParam::VibratoAmount.clamp(3.0), 1.0);
        assert_eq!(SynthParam::Harmonicity.clamp(-1.0), 0.0);
        assert_eq!(SynthParam::Volume.clamp(40.0), MAX_VOLUME_DB);
        assert_eq!(SynthParam::Volume.clamp(-60.0), -60.0);
    }

    #[test]
    fn nan_rejected() {
        let m = AttractorMappings::default();
        assert!(m.targets(f64::NAN, 0.0, 0.0).is_none());
        assert!(m.targets(0.0, 0.0, f64::NAN).is_none());
        let t = m.targets(20.0, 0.0, 10.0).unwrap();
        assert_eq!(t[0], (SynthParam::Frequency, 800.0));
        assert_eq!(t[1], (SynthParam::Harmonicity, 0.5));
        assert_eq!(t[2], (SynthParam::VibratoRate, 5.5));
    }

    #[test]
    fn param_names_round_trip_through_json() {
        let m: AxisMapping =
            serde_json::from_str(r#"{"param":"vibratoAmount","min":0,"max":1}"#).unwrap();
        assert_eq!(m.param, SynthParam::VibratoAmount);
        assert_eq!("vibratoRate".parse::<SynthParam>().unwrap(), SynthParam::VibratoRate);
        assert!("wobble".parse::<SynthParam>().is_err());
    }

    #[test]
    fn trajectory_accepts_short_time_key() {
        let p: TrajectoryPoint = serde_json::from_str(r#"{"t":1.5,"x":1,"y":2,"z":3}"#).unwrap();
        assert_eq!(p, TrajectoryPoint::new(1.5, 1.0, 2.0, 3.0));
    }
}
