//! Candidate-query generator collaborator
//!
//! The generator is a black box: prompt and sampling options in, one text
//! response out. [`HttpGenerator`] talks to an OpenAI-compatible
//! `/completions` endpoint; the timeout lives here, not in the controller.

use crate::error::{EvalError, EvalResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sm_core::{GeneratorConfig, SamplingParams};
use std::time::Duration;

/// Produces one response per prompt
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a response for `prompt`
    async fn generate(&self, prompt: &str, sampling: &SamplingParams) -> EvalResult<String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

/// Client for an OpenAI-compatible text-completion server
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpGenerator {
    /// Build a client from the generator configuration
    ///
    /// The API key, if any, is read from the environment variable named by
    /// `api_key_env`.
    pub fn from_config(config: &GeneratorConfig) -> EvalResult<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                EvalError::Generator(format!("environment variable '{var}' is not set"))
            })?),
            None => None,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EvalError::Generator(e.to_string()))?;

        Ok(Self {
            client,
            url: completions_url(&config.endpoint),
            model: config.model.clone(),
            api_key,
        })
    }

    /// Full URL requests are posted to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str, sampling: &SamplingParams) -> EvalResult<String> {
        let body = CompletionRequest {
            model: &self.model,
            prompt,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            max_tokens: sampling.max_tokens,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EvalError::Generator(format!("request failed: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EvalError::Generator(format!("failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(EvalError::Generator(format!("server returned {status}: {text}")));
        }

        parse_completion(&text)
    }
}

fn completions_url(endpoint: &str) -> String {
    format!("{}/completions", endpoint.trim_end_matches('/'))
}

/// Text of the first choice in a completion response body
fn parse_completion(body: &str) -> EvalResult<String> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| EvalError::Generator(format!("malformed response: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.text)
        .ok_or_else(|| EvalError::Generator("response has no choices".to_string()))
}

/// Canned-response generator for tests
///
/// Returns its responses in order and keeps repeating the last one once
/// they run out. Every prompt it receives is recorded.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Vec<String>,
    prompts: std::sync::Mutex<Vec<String>>,
}

#[cfg(any(test, feature = "test-support"))]
impl ScriptedGenerator {
    /// Generator answering with `responses`
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Every prompt received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Number of generate calls so far
    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _sampling: &SamplingParams) -> EvalResult<String> {
        let mut prompts = self.prompts.lock().unwrap_or_else(|p| p.into_inner());
        let index = prompts.len().min(self.responses.len().saturating_sub(1));
        prompts.push(prompt.to_string());
        self.responses
            .get(index)
            .cloned()
            .ok_or_else(|| EvalError::Generator("no scripted responses".to_string()))
    }
}
