// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for newfiles

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for newfiles operations
pub type Result<T> = std::result::Result<T, NewfilesError>;

/// newfiles error types
#[derive(Error, Debug)]
pub enum NewfilesError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    ConfigParse(String),

    #[error("Monitored directory does not exist: {}", .0.display())]
    MonitoredDirectoryMissing(PathBuf),

    #[error("Prompt file not found: {}", .0.display())]
    PromptFileMissing(PathBuf),

    #[error("Cannot read directory {}: {source}", .path.display())]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Image generation failed: {0}")]
    ImageGenerationFailed(String),

    #[error("Processing {} failed: {reason}", .path.display())]
    ProcessingFailed { path: PathBuf, reason: String },

    #[error("Missing API credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
