//! llama.cpp server completion engine

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{GenerationEngine, base_url, endpoint};
use crate::persona::GenerationRequest;
use crate::{Error, Result};

/// Body of a `/completion` request
#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    repeat_penalty: f32,
    stop: &'a [String],
    stream: bool,
}

impl<'a> From<&'a GenerationRequest> for CompletionBody<'a> {
    fn from(request: &'a GenerationRequest) -> Self {
        Self {
            prompt: &request.prompt,
            n_predict: request.params.max_tokens,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            top_k: request.params.top_k,
            repeat_penalty: request.params.repeat_penalty,
            stop: &request.stop,
            stream: false,
        }
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
}

/// Generates replies through a llama.cpp server
pub struct LlamaServerEngine {
    client: Client,
    base_url: Url,
}

impl LlamaServerEngine {
    /// Create a new engine
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base_url: base_url(url)?,
        })
    }
}

#[async_trait]
impl GenerationEngine for LlamaServerEngine {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let body = CompletionBody::from(request);

        let response = self
            .client
            .post(endpoint(&self.base_url, "completion")?)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "llama.cpp error {status}: {body}"
            )));
        }

        let result: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("failed to parse response: {e}")))?;

        Ok(result.content)
    }

    fn name(&self) -> &'static str {
        "llama-server"
    }
}
