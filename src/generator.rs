// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Prompt rendering and content generation
//!
//! [`ContentSynthesizer`] turns a prompt template plus a target filename into
//! file content by calling a [`GenerationBackend`]. Text and image requests
//! fail differently: a failed text request yields a readable error string
//! that is written into the file, while a failed image request is an error
//! so that nothing is written.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::Settings;
use crate::reference::{format_reference_files, ReferenceFile, NO_REFERENCE_FILES};
use crate::{NewfilesError, Result};

/// A model provider able to produce text completions and images
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Complete `prompt` with `model`, returning the generated text
    async fn complete(&self, model: &str, prompt: &str) -> Result<String>;

    /// Generate one image of `size` (e.g. `1024x1024`), returning the base64 payload
    async fn generate_image(&self, model: &str, prompt: &str, size: &str) -> Result<String>;
}

/// Renders prompts and calls the backend
#[derive(Clone)]
pub struct ContentSynthesizer {
    backend: Arc<dyn GenerationBackend>,
    image_size: String,
    timeout: Duration,
}

impl ContentSynthesizer {
    pub fn new(backend: Arc<dyn GenerationBackend>, image_size: impl Into<String>, timeout: Duration) -> Self {
        Self {
            backend,
            image_size: image_size.into(),
            timeout,
        }
    }

    pub fn from_settings(backend: Arc<dyn GenerationBackend>, settings: &Settings) -> Self {
        Self::new(
            backend,
            settings.image_size.clone(),
            Duration::from_secs(settings.generation.timeout_secs),
        )
    }

    /// Generate text for `filename`.
    ///
    /// Never fails: any error (missing prompt, backend failure, timeout) is
    /// returned as `Error generating content: ...` so it ends up visible in
    /// the target file.
    pub async fn generate_text(
        &self,
        filename: &str,
        extension: &str,
        prompt_file: &Path,
        reference_files: Option<&[ReferenceFile]>,
        model: &str,
    ) -> String {
        match self
            .try_generate_text(filename, extension, prompt_file, reference_files, model)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                error!("Error generating text content for {}: {}", filename, e);
                format!("Error generating content: {}", e)
            }
        }
    }

    async fn try_generate_text(
        &self,
        filename: &str,
        extension: &str,
        prompt_file: &Path,
        reference_files: Option<&[ReferenceFile]>,
        model: &str,
    ) -> Result<String> {
        let template = load_template(prompt_file)?;
        let references = match reference_files {
            Some(refs) => format_reference_files(refs),
            None => NO_REFERENCE_FILES.to_string(),
        };

        let prompt = render_prompt(
            &template,
            &[
                ("filename", filename),
                ("extension", extension),
                ("reference_files", &references),
            ],
        );

        debug!("Requesting text for {} with model {}", filename, model);
        let text = self.bounded(self.backend.complete(model, &prompt)).await?;
        Ok(text.trim().to_string())
    }

    /// Generate image bytes for `filename`, encoded to match `extension`.
    ///
    /// Errors propagate; the caller must not write anything on failure.
    pub async fn generate_image(
        &self,
        filename: &str,
        extension: &str,
        prompt_file: &Path,
        model: &str,
    ) -> Result<Vec<u8>> {
        let template = load_template(prompt_file)?;
        let prompt = render_prompt(&template, &[("filename", filename), ("extension", extension)]);

        debug!("Requesting {} image for {} with model {}", self.image_size, filename, model);
        let payload = self
            .bounded(self.backend.generate_image(model, &prompt, &self.image_size))
            .await
            .map_err(|e| match e {
                NewfilesError::ImageGenerationFailed(_) => e,
                other => NewfilesError::ImageGenerationFailed(other.to_string()),
            })?;

        let bytes = general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| NewfilesError::ImageGenerationFailed(format!("invalid base64 payload: {}", e)))?;

        conform_image(bytes, extension)
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| NewfilesError::Generation(format!("request timed out after {:?}", self.timeout)))?
    }
}

/// Read a prompt template
pub fn load_template(prompt_file: &Path) -> Result<String> {
    std::fs::read_to_string(prompt_file).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => NewfilesError::PromptFileMissing(prompt_file.to_path_buf()),
        _ => NewfilesError::FileSystem(e),
    })
}

/// Substitute `{name}` placeholders.
///
/// `{{` and `}}` render as literal braces. Placeholders without a value are
/// kept as written.
pub fn render_prompt(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{') {
            if let Some(end) = tail.find('}') {
                let name = &tail[1..end];
                if let Some((_, value)) = values.iter().find(|(key, _)| *key == name) {
                    out.push_str(value);
                    rest = &tail[end + 1..];
                    continue;
                }
            }
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

/// Check that `bytes` decode as an image and re-encode to the format implied by `extension`
fn conform_image(bytes: Vec<u8>, extension: &str) -> Result<Vec<u8>> {
    let source = image::guess_format(&bytes)
        .map_err(|e| NewfilesError::ImageGenerationFailed(format!("payload is not an image: {}", e)))?;
    let img = image::load_from_memory_with_format(&bytes, source)
        .map_err(|e| NewfilesError::ImageGenerationFailed(format!("corrupt image payload: {}", e)))?;

    let target = match ImageFormat::from_extension(extension.trim_start_matches('.')) {
        Some(format) if format != source => format,
        _ => return Ok(bytes),
    };

    debug!("Re-encoding {:?} payload as {:?}", source, target);
    let img = match target {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => img,
    };

    let mut buffer = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buffer), target)
        .map_err(|e| NewfilesError::ImageGenerationFailed(format!("cannot encode as {:?}: {}", target, e)))?;
    Ok(buffer)
}
