pub mod attractor;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod graph;
pub mod loader;
pub mod pattern;
pub mod renderer;
pub mod scheduler;
pub mod transport;
pub mod wav;

pub use crate::attractor::{AttractorMappings, AxisMapping, SynthParam, TrajectoryPoint};
pub use crate::config::EngineConfig;
pub use crate::engine::{AudioEngine, EngineParam, EngineState};
pub use crate::error::EngineError;
pub use crate::graph::{MixParams, VoiceKind};
pub use crate::pattern::{Pattern, PatternLibrary, SynthConfig};
pub use crate::renderer::AudioBuffer;
pub use crate::wav::encode_wav;

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the attractor-audio version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// WASM-exposed: list the built-in pattern names.
#[wasm_bindgen]
pub fn builtin_pattern_names() -> Vec<String> {
    PatternLibrary::builtin().names()
}

/// WASM-exposed: render `pattern` offline to a WAV byte array.
///
/// `patterns_json` replaces the built-in library when non-empty; an
/// invalid document falls back to the built-ins. `trajectory` is either
/// `undefined`/`null` or an array of `{time, x, y, z}` objects.
#[wasm_bindgen]
pub fn render_pattern_wav(
    patterns_json: &str,
    pattern: &str,
    duration: f64,
    sample_rate: u32,
    trajectory: JsValue,
) -> Result<Vec<u8>, JsValue> {
    let mut engine = AudioEngine::new(EngineConfig {
        sample_rate,
        ..EngineConfig::default()
    });
    if !patterns_json.trim().is_empty() {
        match PatternLibrary::from_json(patterns_json) {
            Ok(library) => engine.replace_library(library),
            Err(e) => tracing::warn!(error = %e, "ignoring pattern library"),
        }
    }
    engine.set_pattern(pattern);

    let points: Option<Vec<TrajectoryPoint>> = if trajectory.is_undefined() || trajectory.is_null() {
        None
    } else {
        Some(serde_wasm_bindgen::from_value(trajectory).map_err(js_err)?)
    };
    engine
        .render_offline_wav(duration, points.as_deref())
        .map_err(js_err)
}
