// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for newfiles
//!
//! Settings are loaded once from a JSON document and are read-only after
//! that. Command-line overrides produce a new value through
//! [`Settings::with_override`] instead of editing the loaded one.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{NewfilesError, Result};

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Directory to watch for new files
    #[serde(default = "default_monitored_directory")]
    pub monitored_directory: PathBuf,

    /// Settle delay in seconds before a new file is inspected
    #[serde(default = "default_delay")]
    pub delay: f64,

    /// Watch subdirectories as well
    #[serde(default = "default_true")]
    pub monitor_subdirectories: bool,

    #[serde(default = "default_text_prompt_file")]
    pub default_text_prompt_file: PathBuf,

    #[serde(default = "default_image_prompt_file")]
    pub default_image_prompt_file: PathBuf,

    /// Model used for extensions without their own mapping
    #[serde(default = "default_text_model")]
    pub default_text_model: String,

    /// Model used for image extensions without their own mapping
    #[serde(default = "default_image_model")]
    pub default_image_model: String,

    /// Requested image dimensions, always square
    #[serde(default = "default_image_size")]
    pub image_size: String,

    /// Per-extension model and prompt, keyed by lowercase extension without dot
    #[serde(default, deserialize_with = "normalized_extensions")]
    pub extension_settings: HashMap<String, ExtensionConfig>,

    /// Generation API settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Number of concurrent processing workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum number of queued file events
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Log file written alongside stderr output
    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,
}

/// Model and prompt applied to one file extension
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ExtensionConfig {
    pub model: String,
    pub prompt_file: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// A single field replaced on top of loaded settings
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsOverride {
    MonitoredDirectory(PathBuf),
    Delay(f64),
    MonitorSubdirectories(bool),
}

// Default value functions
fn default_delay() -> f64 { 0.5 }
fn default_true() -> bool { true }
fn default_text_prompt_file() -> PathBuf { PathBuf::from("prompts/default_text.md") }
fn default_image_prompt_file() -> PathBuf { PathBuf::from("prompts/default_image.md") }
fn default_text_model() -> String { "gpt-4.1-nano".to_string() }
fn default_image_model() -> String { "gpt-image-1".to_string() }
fn default_image_size() -> String { "1024x1024".to_string() }
fn default_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_timeout() -> u64 { 120 }
fn default_max_tokens() -> u32 { 1000 }
fn default_temperature() -> f32 { 0.7 }
fn default_workers() -> usize { 4 }
fn default_queue_capacity() -> usize { 64 }
fn default_log_file() -> Option<PathBuf> { Some(PathBuf::from("logs/newfiles.log")) }

/// The user's desktop, falling back to the working directory
fn default_monitored_directory() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Desktop")
}

/// Strip a leading dot and lowercase
pub fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_lowercase()
}

fn normalized_extensions<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, ExtensionConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, ExtensionConfig>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(ext, cfg)| (normalize_extension(&ext), cfg))
        .collect())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            monitored_directory: default_monitored_directory(),
            delay: default_delay(),
            monitor_subdirectories: true,
            default_text_prompt_file: default_text_prompt_file(),
            default_image_prompt_file: default_image_prompt_file(),
            default_text_model: default_text_model(),
            default_image_model: default_image_model(),
            image_size: default_image_size(),
            extension_settings: HashMap::new(),
            generation: GenerationConfig::default(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            log_file: default_log_file(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Settings {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NewfilesError::ConfigNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)
            .map_err(|e| NewfilesError::ConfigParse(format!("Failed to parse config: {}", e)))?;
        settings.validate()?;

        tracing::debug!(
            "Loaded config from {:?} ({} extension mappings)",
            path,
            settings.extension_settings.len()
        );
        Ok(settings)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        Duration::try_from_secs_f64(self.delay).map_err(|e| {
            NewfilesError::ConfigParse(format!(
                "delay must be a non-negative number of seconds, got {}: {}",
                self.delay, e
            ))
        })?;
        if self.workers == 0 || self.queue_capacity == 0 {
            return Err(NewfilesError::ConfigParse(
                "workers and queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Return a copy with one field replaced, checked like a loaded file
    pub fn with_override(&self, field: SettingsOverride) -> Result<Self> {
        let mut next = self.clone();
        match field {
            SettingsOverride::MonitoredDirectory(dir) => next.monitored_directory = dir,
            SettingsOverride::Delay(delay) => next.delay = delay,
            SettingsOverride::MonitorSubdirectories(recursive) => next.monitor_subdirectories = recursive,
        }
        next.validate()?;
        Ok(next)
    }

    /// Settle delay as a duration. Unrepresentable values saturate.
    pub fn settle_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay).unwrap_or(if self.delay > 0.0 {
            Duration::MAX
        } else {
            Duration::ZERO
        })
    }

    /// Raw mapping lookup, `None` when the extension has no entry
    pub fn lookup_extension(&self, extension: &str) -> Option<&ExtensionConfig> {
        self.extension_settings.get(&normalize_extension(extension))
    }

    /// Extension settings, falling back to the default text model and prompt
    pub fn resolve_extension(&self, extension: &str) -> ExtensionConfig {
        self.lookup_extension(extension)
            .cloned()
            .unwrap_or_else(|| ExtensionConfig {
                model: self.default_text_model.clone(),
                prompt_file: self.default_text_prompt_file.clone(),
            })
    }

    pub fn is_supported_extension(&self, extension: &str) -> bool {
        self.lookup_extension(extension).is_some()
    }
}
