use thiserror::Error;

/// Errors surfaced by the engine, the pattern loader and the renderer.
///
/// Most runtime failures are swallowed and logged (remote pattern loads,
/// unknown pattern names, non-finite coordinates); only the operations that
/// cannot fall back to a sensible default return one of these.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid render duration: {0}s")]
    InvalidDuration(f64),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Unknown voice '{0}'")]
    UnknownVoice(String),

    #[error("Unknown parameter '{0}'")]
    UnknownParam(String),

    #[error("Unknown attractor parameter '{0}'")]
    UnknownSynthParam(String),

    #[error("Invalid pattern '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("Pattern library is empty")]
    EmptyLibrary,

    #[error("Pattern JSON error: {0}")]
    PatternJson(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "remote")]
    #[error("Pattern fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[cfg(feature = "remote")]
    #[error("Pattern fetch returned HTTP {0}")]
    FetchStatus(u16),
}
