// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-file dispatch: resolve settings, generate, write back

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::Settings;
use crate::generator::ContentSynthesizer;
use crate::reference;
use crate::{NewfilesError, Result};

/// Extensions handled by image generation
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Image,
}

/// What happened to a file handed to the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// New content was written
    Written { kind: ContentKind, bytes: usize },
    /// Nothing was written; the reason has been logged
    Failed { reason: String },
}

impl ProcessOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, ProcessOutcome::Written { .. })
    }
}

/// Fills files with generated content
#[derive(Clone)]
pub struct FileProcessor {
    settings: Arc<Settings>,
    synthesizer: ContentSynthesizer,
}

impl FileProcessor {
    pub fn new(settings: Arc<Settings>, synthesizer: ContentSynthesizer) -> Self {
        Self { settings, synthesizer }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Process one file. Errors are logged and reported as [`ProcessOutcome::Failed`].
    pub async fn process(&self, path: &Path) -> ProcessOutcome {
        let span = info_span!("process", path = %path.display());
        match self.try_process(path).instrument(span).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Error processing file {:?}: {}", path, e);
                ProcessOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    /// Process one file, returning the first error encountered
    pub async fn try_process(&self, path: &Path) -> Result<ProcessOutcome> {
        let target = TargetFile::from_path(path)?;

        info!("Processing new file: {}", target.filename);

        // Fail before spending a generation call on a file that is already gone
        let metadata = std::fs::metadata(path)?;
        if metadata.is_dir() {
            return Err(invalid_target(path, "is a directory"));
        }

        if IMAGE_EXTENSIONS.contains(&target.extension.as_str()) {
            self.process_image(path, &target).await
        } else {
            self.process_text(path, &target).await
        }
    }

    async fn process_image(&self, path: &Path, target: &TargetFile) -> Result<ProcessOutcome> {
        let configured = self.settings.lookup_extension(&target.extension);
        let prompt_file = configured
            .map(|c| c.prompt_file.clone())
            .unwrap_or_else(|| self.settings.default_image_prompt_file.clone());
        let model = configured
            .map(|c| c.model.clone())
            .unwrap_or_else(|| self.settings.default_image_model.clone());

        let bytes = self
            .synthesizer
            .generate_image(&target.filename, &target.extension, &prompt_file, &model)
            .await?;

        write_in_place(path, &bytes)?;
        info!("Generated image content for: {} ({} bytes)", target.filename, bytes.len());

        Ok(ProcessOutcome::Written { kind: ContentKind::Image, bytes: bytes.len() })
    }

    async fn process_text(&self, path: &Path, target: &TargetFile) -> Result<ProcessOutcome> {
        let config = self.settings.resolve_extension(&target.extension);

        let references = if is_dynamic(&config.prompt_file, &target.filename) {
            debug!("Dynamic prompt, collecting references from {:?}", target.directory);
            Some(reference::collect(&target.directory, &target.extension, &target.filename)?)
        } else {
            None
        };

        let content = self
            .synthesizer
            .generate_text(
                &target.filename,
                &target.extension,
                &config.prompt_file,
                references.as_deref(),
                &config.model,
            )
            .await;

        write_in_place(path, content.as_bytes())?;
        info!("Generated text content for: {}", target.filename);

        Ok(ProcessOutcome::Written { kind: ContentKind::Text, bytes: content.len() })
    }
}

/// Name, parent directory and lowercase extension of a target path
#[derive(Debug, PartialEq, Eq)]
struct TargetFile {
    filename: String,
    directory: PathBuf,
    extension: String,
}

impl TargetFile {
    fn from_path(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| invalid_target(path, "has no usable file name"))?
            .to_string();

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        Ok(Self { filename, directory, extension })
    }
}

/// Whether the prompt should be rendered with sibling reference files
pub fn is_dynamic(prompt_file: &Path, filename: &str) -> bool {
    prompt_file.to_string_lossy().to_lowercase().contains("dynamic")
        || filename.to_lowercase().contains("dynamic")
}

/// Overwrite an existing file. A file deleted in the meantime is not recreated.
fn write_in_place(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;
    file.write_all(content)?;
    file.flush()?;
    Ok(())
}

fn invalid_target(path: &Path, why: &str) -> NewfilesError {
    NewfilesError::FileSystem(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("{:?} {}", path, why),
    ))
}
