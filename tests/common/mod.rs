// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use newfiles::config::{ExtensionConfig, Settings};
use newfiles::generator::{ContentSynthesizer, GenerationBackend};
use newfiles::processor::FileProcessor;
use newfiles::watcher::WatchHandler;
use newfiles::{NewfilesError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub model: String,
    pub prompt: String,
}

/// Backend that records every request and answers from canned behavior
pub struct RecordingBackend {
    text_fails: bool,
    image_payload: Option<String>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingBackend {
    /// Text requests succeed with `Generated: <prompt>`, image requests fail
    pub fn echo() -> Self {
        Self { text_fails: false, image_payload: None, calls: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { text_fails: true, image_payload: None, calls: Mutex::new(Vec::new()) }
    }

    pub fn with_png() -> Self {
        Self { text_fails: false, image_payload: Some(png_base64()), calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, model: &str, prompt: &str) {
        self.calls.lock().unwrap().push(Call { model: model.to_string(), prompt: prompt.to_string() });
    }
}

#[async_trait]
impl GenerationBackend for RecordingBackend {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        self.record(model, prompt);
        if self.text_fails {
            return Err(NewfilesError::Generation("rate limit reached".to_string()));
        }
        Ok(format!("Generated: {}", prompt))
    }

    async fn generate_image(&self, model: &str, prompt: &str, _size: &str) -> Result<String> {
        self.record(model, prompt);
        self.image_payload
            .clone()
            .ok_or_else(|| NewfilesError::Generation("simulated image outage".to_string()))
    }
}

pub fn png_base64() -> String {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(4, 4, image::Rgb([200, 100, 50])));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png).unwrap();
    general_purpose::STANDARD.encode(&bytes)
}

/// Scratch layout: `<root>/watch` for targets, `<root>/templates` for prompts
pub struct Fixture {
    pub root: TempDir,
    pub settings: Settings,
}

impl Fixture {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("watch")).unwrap();
        std::fs::create_dir(root.path().join("templates")).unwrap();

        let mut settings = Settings::default();
        settings.monitored_directory = root.path().join("watch");
        settings.delay = 0.0;
        settings.default_text_prompt_file = root.path().join("templates/default_text.md");
        settings.default_image_prompt_file = root.path().join("templates/default_image.md");
        std::fs::write(&settings.default_text_prompt_file, "Default for {filename}").unwrap();
        std::fs::write(&settings.default_image_prompt_file, "Default picture of {filename}").unwrap();

        Self { root, settings }
    }

    /// Write a template and map `extension` to it
    pub fn map(&mut self, extension: &str, model: &str, template: &str, body: &str) -> PathBuf {
        let prompt_file = self.root.path().join("templates").join(template);
        std::fs::write(&prompt_file, body).unwrap();
        self.settings.extension_settings.insert(
            extension.to_string(),
            ExtensionConfig { model: model.to_string(), prompt_file: prompt_file.clone() },
        );
        prompt_file
    }

    pub fn file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.watch_dir().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn watch_dir(&self) -> &Path {
        &self.settings.monitored_directory
    }

    pub fn processor(&self, backend: Arc<RecordingBackend>) -> FileProcessor {
        let backend: Arc<dyn GenerationBackend> = backend;
        let settings = Arc::new(self.settings.clone());
        let synthesizer = ContentSynthesizer::from_settings(backend, &settings);
        FileProcessor::new(settings, synthesizer)
    }

    pub fn handler(&self, backend: Arc<RecordingBackend>) -> WatchHandler {
        WatchHandler::new(self.processor(backend))
    }
}
