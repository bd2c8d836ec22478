//! Gemini REST client

use super::stream::{GenerateResponse, decode_sse};
use super::{LanguageModel, TextStream};
use crate::config::LlmConfig;
use crate::error::LlmError;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Talks to the generative language API: one HTTP request per call
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    generation_model: String,
    chat_model: String,
    embedding_model: String,
    dimension: usize,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| LlmError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        tracing::info!(
            "Configured model client (generation: {}, chat: {}, embedding: {} x{})",
            config.generation_model,
            config.chat_model,
            config.embedding_model,
            config.embedding_dimension
        );

        Ok(Self {
            client,
            api_key: config
                .api_key
                .as_ref()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            generation_model: config.generation_model.clone(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post<B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(status_error(status, message))
    }
}

fn status_error(status: StatusCode, message: String) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited {
            status: status.as_u16(),
            message,
        }
    } else {
        LlmError::Http {
            status: status.as_u16(),
            message,
        }
    }
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

impl<'a> Content<'a> {
    fn text(text: &'a str) -> Self {
        Self {
            parts: [TextPart { text }],
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait::async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = self.endpoint(&self.generation_model, "generateContent");
        let request = GenerateRequest {
            contents: [Content::text(prompt)],
        };

        let parsed: GenerateResponse = self
            .post(&url, &request)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(parsed.text())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let url = self.endpoint(&self.embedding_model, "embedContent");
        let request = EmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content::text(text),
        };

        let parsed: EmbedResponse = self
            .post(&url, &request)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(parsed.embedding.values)
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream, LlmError> {
        let url = format!(
            "{}?alt=sse",
            self.endpoint(&self.chat_model, "streamGenerateContent")
        );
        let request = GenerateRequest {
            contents: [Content::text(prompt)],
        };

        let response = self.post(&url, &request).await?;
        Ok(Box::pin(decode_sse(response.bytes_stream())))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.generation_model
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("generation_model", &self.generation_model)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("dimension", &self.dimension)
            .finish()
    }
}
