//! Generative model client.
//!
//! The [`ModelClient`] trait decouples the pipeline from the provider. Tests
//! use scripted clients; production uses [`GeminiClient`] against the
//! `generateContent` endpoint. One request per call, no retries, no
//! conversation state.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::TransportError;
use crate::io::config::SamplingConfig;

/// Abstraction over "given a prompt, return text".
pub trait ModelClient {
    fn generate(
        &self,
        prompt: &str,
        model: &str,
        sampling: &SamplingConfig,
    ) -> Result<String, TransportError>;
}

/// Client for Google's Generative Language API.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    /// Use a preconfigured HTTP client (e.g. without proxies in tests).
    pub fn with_client(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Parts of the first candidate joined without separators, trimmed.
    fn into_text(self) -> String {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();
        text.trim().to_string()
    }
}

/// `{base}/models/{model}:generateContent`, with the model id percent-encoded
/// as a single path segment.
fn endpoint_url(base_url: &str, model: &str) -> Result<Url, TransportError> {
    let invalid = |reason: String| TransportError {
        status: None,
        body: format!("invalid model endpoint {base_url}: {reason}"),
    };
    let mut url = Url::parse(base_url).map_err(|err| invalid(err.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("URL cannot have a path".to_string()))?
        .pop_if_empty()
        .push("models")
        .push(&format!("{model}:generateContent"));
    Ok(url)
}

impl ModelClient for GeminiClient {
    #[instrument(skip_all, fields(model = %model, prompt_bytes = prompt.len()))]
    fn generate(
        &self,
        prompt: &str,
        model: &str,
        sampling: &SamplingConfig,
    ) -> Result<String, TransportError> {
        info!(model, "calling model");
        let url = endpoint_url(&self.base_url, model)?;
        let body = GenerateContentRequest {
            contents: [RequestContent {
                role: "user",
                parts: [RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: sampling.temperature,
                top_p: sampling.top_p,
                max_output_tokens: sampling.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .map_err(|err| TransportError {
                status: err.status().map(|s| s.as_u16()),
                body: err.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), "model request failed");
            return Err(TransportError {
                status: Some(status.as_u16()),
                body: text,
            });
        }

        let parsed: GenerateContentResponse = response.json().map_err(|err| TransportError {
            status: Some(status.as_u16()),
            body: format!("decode response: {}", err.without_url()),
        })?;
        let text = parsed.into_text();
        debug!(response_bytes = text.len(), "model responded");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client_for(server: &Server) -> GeminiClient {
        let http = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("http client");
        GeminiClient::with_client(http, &server.url(), "test-key")
    }

    #[test]
    fn concatenates_first_candidate_parts() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/models/gemini-test:generateContent")
            .match_query(Matcher::UrlEncoded("key".into(), "test-key".into()))
            .match_body(Matcher::PartialJsonString(
                r#"{"contents":[{"role":"user","parts":[{"text":"hello"}]}],"generationConfig":{"maxOutputTokens":1400}}"#
                    .to_string(),
            ))
            .with_status(200)
            .with_body(
                json!({
                    "candidates": [
                        {"content": {"parts": [{"text": "## Plan\n"}, {"text": "Do it.\n"}]}},
                        {"content": {"parts": [{"text": "ignored"}]}}
                    ]
                })
                .to_string(),
            )
            .create();

        let text = client_for(&server)
            .generate("hello", "gemini-test", &SamplingConfig::default())
            .expect("generate");

        mock.assert();
        assert_eq!(text, "## Plan\nDo it.");
    }

    #[test]
    fn missing_candidates_yield_empty_text() {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/models/gemini-test:generateContent")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)
            .create();

        let text = client_for(&server)
            .generate("hello", "gemini-test", &SamplingConfig::default())
            .expect("generate");
        assert_eq!(text, "");
    }

    #[test]
    fn non_success_status_is_transport_error_with_body() {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/models/gemini-test:generateContent")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("quota exceeded")
            .create();

        let err = client_for(&server)
            .generate("hello", "gemini-test", &SamplingConfig::default())
            .unwrap_err();
        assert_eq!(err.status, Some(429));
        assert_eq!(err.body, "quota exceeded");
    }

    #[test]
    fn malformed_json_is_transport_error() {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/models/gemini-test:generateContent")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create();

        let err = client_for(&server)
            .generate("hello", "gemini-test", &SamplingConfig::default())
            .unwrap_err();
        assert!(err.body.contains("decode response"));
    }

    #[test]
    fn endpoint_encodes_model_id() {
        let url = endpoint_url("https://generativelanguage.googleapis.com/v1beta", "tuned/my model")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/tuned%2Fmy%20model:generateContent"
        );
    }

    #[test]
    fn endpoint_on_bare_host_has_single_slash() {
        let url = endpoint_url("http://127.0.0.1:1234", "gemini-test").expect("url");
        assert_eq!(url.as_str(), "http://127.0.0.1:1234/models/gemini-test:generateContent");
    }

    #[test]
    fn invalid_base_url_is_transport_error() {
        let err = endpoint_url("not a url", "gemini-test").unwrap_err();
        assert_eq!(err.status, None);
        assert!(err.body.contains("invalid model endpoint"));
    }

    #[test]
    fn request_body_uses_camel_case_generation_config() {
        let body = GenerateContentRequest {
            contents: [RequestContent {
                role: "user",
                parts: [RequestPart { text: "p" }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                top_p: 0.9,
                max_output_tokens: 1400,
            },
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1400);
        assert!(json["generationConfig"].get("topP").is_some());
        assert_eq!(json["contents"][0]["role"], "user");
    }
}
