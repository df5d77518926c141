use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Registry or snapshot file could not be read or written.
    #[error("Store unavailable at {}: {reason}", .path.display())]
    StoreUnavailable { path: PathBuf, reason: String },

    /// The registry file has not been created yet.
    #[error("Store does not exist yet: {}", .0.display())]
    StoreMissing(PathBuf),

    #[error("Timed out after {timeout_ms}ms waiting for {locator}")]
    RenderTimeout { locator: String, timeout_ms: u64 },

    #[error("Element {locator}[{index}] not found")]
    ElementMissing { locator: String, index: usize },

    #[error("Parse failure: {0}")]
    ParseFailure(String),

    #[error("Failed to launch polling worker for {url}: {reason}")]
    LaunchFailure { url: String, reason: String },

    #[error("WebDriver error: {0}")]
    WebDriver(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn store(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        AppError::StoreUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// First line of the rendered message, as recorded in failure rows.
    pub fn first_line(&self) -> String {
        self.to_string()
            .trim()
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
