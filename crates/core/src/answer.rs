use crate::error::{SearchError, ServiceError};
use crate::models::RetrievalResult;
use crate::traits::Generator;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const INSTRUCTIONS: &str = concat!(
    "Human: Please use the given context to provide concise answer to the question\n",
    "If you don't know the answer, just say that you don't know, don't try to make up an answer."
);

const CONTEXT_SEPARATOR: &str = "\n\n";

pub fn build_context(retrieved: &RetrievalResult) -> String {
    retrieved.texts().join(CONTEXT_SEPARATOR)
}

/// Single-pass render, so braces inside chunk text or the question are
/// never treated as placeholders.
pub fn build_prompt(retrieved: &RetrievalResult, question: &str) -> String {
    format!(
        "{INSTRUCTIONS}\n<context>\n{}\n</context>\nQuestion: {question}\nAssistant:",
        build_context(retrieved)
    )
}

/// Fills the grounding prompt and calls the model exactly once. The
/// generated text is returned untouched.
pub async fn answer<G>(
    retrieved: &RetrievalResult,
    question: &str,
    generator: &G,
) -> Result<String, SearchError>
where
    G: Generator + ?Sized,
{
    if question.trim().is_empty() {
        return Err(SearchError::Request("question is empty".to_string()));
    }

    let prompt = build_prompt(retrieved, question);
    Ok(generator.generate(&prompt).await?)
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Generative model client for an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens,
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&OllamaGenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: OllamaOptions {
                    num_predict: self.max_tokens,
                },
            })
            .send()
            .await
            .map_err(|error| ServiceError::new("generator", error.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::new(
                "generator",
                format!(
                    "{}/api/generate returned {}",
                    self.base_url,
                    response.status()
                ),
            ));
        }

        let payload: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|error| ServiceError::new("generator", error.to_string()))?;

        payload
            .response
            .ok_or_else(|| ServiceError::new("generator", "response has no generated text"))
    }
}
