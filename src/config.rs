//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! sample_rate = 48000
//! bpm = 72
//! initial_pattern = "Dark Space"
//! seed = 7
//! patterns_url = "https://example.org/patterns.json"
//!
//! [mix]
//! master = -6
//! reverb = 0.4
//! ```
//!
//! Every key is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::graph::MixParams;
use crate::pattern::DEFAULT_PATTERN;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub bpm: f64,
    pub initial_pattern: String,
    /// Seeds the arpeggio RNG. Realtime playback is unseeded without it;
    /// offline renders fall back to a fixed seed.
    pub seed: Option<u64>,
    /// Where to fetch the pattern library from, if anywhere.
    pub patterns_url: Option<String>,
    pub mix: MixParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100,
            bpm: 60.0,
            initial_pattern: DEFAULT_PATTERN.to_string(),
            seed: None,
            patterns_url: None,
            mix: MixParams::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
