// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! OpenAI-compatible API client for text and image generation

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::generator::GenerationBackend;
use crate::{NewfilesError, Result};

/// OpenAI API client
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
}

impl OpenAiClient {
    /// Create a client with an explicit key
    pub fn new(config: &GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Create a client reading the key from the configured environment variable
    pub fn from_env(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| NewfilesError::MissingCredential(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<R> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(NewfilesError::Generation(format!(
                "API returned status {}: {}",
                status,
                detail.trim()
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl GenerationBackend for OpenAiClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!("Sending chat completion request: model={}", model);

        let response: ChatResponse = self.post_json("chat/completions", &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| NewfilesError::Generation("No choices returned from API".to_string()))
    }

    async fn generate_image(&self, model: &str, prompt: &str, size: &str) -> Result<String> {
        let request = ImageRequest { model, prompt, n: 1, size };

        debug!("Sending image generation request: model={}, size={}", model, size);

        let response: ImageResponse = self.post_json("images/generations", &request).await?;
        response
            .data
            .into_iter()
            .next()
            .and_then(|image| image.b64_json)
            .ok_or_else(|| NewfilesError::ImageGenerationFailed("No image data returned from API".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let config = GenerationConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..GenerationConfig::default()
        };
        let client = OpenAiClient::new(&config, "key").unwrap();
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_from_env_requires_key() {
        let config = GenerationConfig {
            api_key_env: "NEWFILES_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..GenerationConfig::default()
        };
        let err = OpenAiClient::from_env(&config).err().unwrap();
        assert!(matches!(err, NewfilesError::MissingCredential(_)));
    }

    #[test]
    fn test_from_env_reads_key_loaded_from_dotenv_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let dotenv = dir.path().join(".env");
        std::fs::write(&dotenv, "NEWFILES_DOTENV_TEST_KEY=sk-from-file\n").unwrap();

        dotenvy::from_path(&dotenv).unwrap();

        let config = GenerationConfig {
            api_key_env: "NEWFILES_DOTENV_TEST_KEY".to_string(),
            ..GenerationConfig::default()
        };
        let client = OpenAiClient::from_env(&config).unwrap();
        assert_eq!(client.api_key, "sk-from-file");
    }

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "m1",
            messages: vec![ChatMessage { role: "user", content: "Hello note.txt" }],
            max_tokens: 1000,
            temperature: 0.5,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "m1");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "Hello note.txt");
    }

    #[test]
    fn test_image_response_parsing() {
        let body = r#"{"created": 1, "data": [{"b64_json": "aGVsbG8="}]}"#;
        let parsed: ImageResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data[0].b64_json.as_deref(), Some("aGVsbG8="));
    }
}
