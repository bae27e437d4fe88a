//! LLM client plumbing shared by the Header Matcher's AI step and the Layer-AI
//! Validator. The LLM is advisory everywhere it is used: a failed or malformed
//! response always falls through to a non-AI path in the caller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::case_store::FewShotExample;
use crate::error::{Error, Result, TransientReason};
use crate::schema::{SheetAffinity, StandardSchema};

#[derive(Debug, Clone, Deserialize)]
pub struct AiMapping {
    pub customer_header: String,
    pub standard_field: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MatchResponse {
    #[serde(default)]
    pub mappings: Vec<AiMapping>,
    #[serde(default)]
    pub unmapped: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiFinding {
    pub row: usize,
    pub field: String,
    pub value: Option<String>,
    pub message: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ValidationResponse {
    #[serde(default)]
    pub errors: Vec<AiFinding>,
    #[serde(default)]
    pub warnings: Vec<AiFinding>,
    #[serde(default)]
    pub reasoning: String,
}

/// LLM client trait. Implementations must be advisory-only: callers treat any
/// `Err` as "fall through", not as a hard failure.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn match_headers(
        &self,
        headers: &[String],
        schema: &StandardSchema,
        sheet: SheetAffinity,
        few_shot: &[FewShotExample],
    ) -> Result<MatchResponse>;

    async fn validate_rows(&self, prompt: &str) -> Result<ValidationResponse>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            model: "claude-3-5-sonnet-latest".to_string(),
            timeout_secs: 60,
        }
    }
}

fn build_http_client(timeout_secs: u64) -> Client {
    let timeout = Duration::from_secs(timeout_secs);
    // Some sandboxed environments panic during proxy auto-detection in reqwest's
    // default client builder. Fall back to no-proxy in that case.
    match catch_unwind(AssertUnwindSafe(|| Client::builder().timeout(timeout).build())) {
        Ok(Ok(client)) => client,
        Ok(Err(_)) | Err(_) => {
            Client::builder().no_proxy().timeout(timeout).build().expect("failed to build HTTP client")
        }
    }
}

/// Anthropic-backed implementation. Temperature 0 for header matching (spec §4.4);
/// a low temperature for row validation.
pub struct AnthropicClient {
    config: ClientConfig,
    http: Client,
}

impl AnthropicClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(Self::DEFAULT_BASE_URL)
    }

    async fn complete(&self, system: &str, user: &str, temperature: f64) -> Result<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f64,
            system: &'a str,
            messages: Vec<Message<'a>>,
        }
        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct Response {
            content: Vec<ContentBlock>,
        }

        let body = Request {
            model: &self.config.model,
            max_tokens: 2000,
            temperature,
            system,
            messages: vec![Message { role: "user", content: user }],
        };

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url()))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::transient(TransientReason::Timeout, e.to_string())
                } else {
                    Error::transient(TransientReason::ApiError, e.to_string())
                }
            })?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::transient(TransientReason::RateLimit, "rate limited".to_string()));
        }
        if !resp.status().is_success() {
            return Err(Error::transient(
                TransientReason::ApiError,
                format!("status {}", resp.status()),
            ));
        }

        let parsed: Response = resp
            .json()
            .await
            .map_err(|e| Error::transient(TransientReason::ApiError, e.to_string()))?;

        Ok(parsed.content.into_iter().filter_map(|c| c.text).collect::<Vec<_>>().join(""))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn match_headers(
        &self,
        headers: &[String],
        schema: &StandardSchema,
        sheet: SheetAffinity,
        few_shot: &[FewShotExample],
    ) -> Result<MatchResponse> {
        let schema_json = serde_json::to_string(&schema.fields(sheet)).unwrap_or_default();
        let headers_json = serde_json::to_string(headers).unwrap_or_default();
        let few_shot_text = if few_shot.is_empty() {
            String::new()
        } else {
            format!(
                "\n\n### prior confirmed mappings (for reference):\n{}",
                serde_json::to_string(few_shot).unwrap_or_default()
            )
        };

        let prompt = format!(
            "customer headers: {headers_json}\nstandard schema: {schema_json}{few_shot_text}\n\
             rules: match each header to the closest field by meaning, using aliases; \
             mark unmapped if unsure; confidence in 0.0..1.0. Respond with JSON only: \
             {{\"mappings\":[{{\"customer_header\":...,\"standard_field\":...,\"confidence\":...}}],\"unmapped\":[...]}}"
        );

        let text = self
            .complete("You are an HR data schema matching expert. Respond with JSON only.", &prompt, 0.0)
            .await?;

        extract_json(&text)
            .and_then(|j| serde_json::from_str(&j).ok())
            .ok_or_else(|| Error::transient(TransientReason::ApiError, "invalid JSON from matcher".to_string()))
    }

    async fn validate_rows(&self, prompt: &str) -> Result<ValidationResponse> {
        let text = self
            .complete(
                "You are an HR data validation expert. Respond with JSON only.",
                prompt,
                0.1,
            )
            .await?;

        extract_json(&text)
            .and_then(|j| serde_json::from_str(&j).ok())
            .ok_or_else(|| Error::transient(TransientReason::ApiError, "invalid JSON from validator".to_string()))
    }
}

/// Extract a `{...}` JSON object from free text, tolerating ```json fences.
fn extract_json(text: &str) -> Option<String> {
    let candidate = if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        rest.find("```").map(|end| &rest[..end]).unwrap_or(rest)
    } else if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        rest.find("```").map(|end| &rest[..end]).unwrap_or(rest)
    } else {
        text
    };

    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end > start {
        Some(candidate[start..=end].to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_fenced_block() {
        let text = "here you go:\n```json\n{\"mappings\":[],\"unmapped\":[]}\n```";
        let extracted = extract_json(text).unwrap();
        assert!(extracted.contains("mappings"));
    }

    #[test]
    fn extracts_bare_json_object() {
        let text = "{\"a\":1}";
        assert_eq!(extract_json(text).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn returns_none_when_no_braces() {
        assert!(extract_json("no json here").is_none());
    }
}
