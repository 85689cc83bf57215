//! Pattern library sources.
//!
//! The engine only needs the raw JSON document; parsing and validation
//! happen in [`PatternLibrary::from_json`](crate::pattern::PatternLibrary::from_json).

use std::future::Future;
use std::path::PathBuf;

use crate::error::EngineError;

/// Something that can produce a pattern library JSON document.
pub trait PatternSource {
    fn fetch(&self) -> impl Future<Output = Result<String, EngineError>> + Send;
}

/// A document already in memory.
#[derive(Debug, Clone)]
pub struct StaticPatternSource(pub String);

impl StaticPatternSource {
    pub fn new(json: impl Into<String>) -> Self {
        StaticPatternSource(json.into())
    }
}

impl PatternSource for StaticPatternSource {
    async fn fetch(&self) -> Result<String, EngineError> {
        Ok(self.0.clone())
    }
}

/// A document on disk, read when fetched.
#[derive(Debug, Clone)]
pub struct FilePatternSource {
    pub path: PathBuf,
}

impl FilePatternSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FilePatternSource { path: path.into() }
    }
}

impl PatternSource for FilePatternSource {
    async fn fetch(&self) -> Result<String, EngineError> {
        Ok(std::fs::read_to_string(&self.path)?)
    }
}

/// A document served over HTTP(S).
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpPatternSource {
    url: String,
    client: reqwest::Client,
}

#[cfg(feature = "remote")]
impl HttpPatternSource {
    pub fn new(url: impl Into<String>) -> Self {
        HttpPatternSource {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(feature = "remote")]
impl PatternSource for HttpPatternSource {
    async fn fetch(&self) -> Result<String, EngineError> {
        tracing::debug!(url = %self.url, "fetching pattern library");
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::FetchStatus(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}
