//! [`Extractor`] backed by the Anthropic Messages API.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use regwatch_shared::{ExtractedFinding, IntelligenceConfig, RegwatchError, Result};

use crate::extraction::{ExtractionRequest, Extractor, parse_extraction};

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

// ---------------------------------------------------------------------------
// ClaudeExtractor
// ---------------------------------------------------------------------------

/// Sends each diff to Claude and parses the JSON reply.
pub struct ClaudeExtractor {
    config: IntelligenceConfig,
    api_key: String,
    http: Client,
}

impl ClaudeExtractor {
    pub fn new(config: IntelligenceConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RegwatchError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            api_key: api_key.into(),
            http,
        })
    }

    /// Read the API key from the env var named in `config.api_key_env`.
    pub fn from_env(config: IntelligenceConfig) -> Result<Self> {
        let key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RegwatchError::config(format!(
                    "extraction API key not found. Set the {} environment variable.",
                    config.api_key_env
                ))
            })?;
        Self::new(config, key)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| RegwatchError::config(format!("invalid API key: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Send one prompt and return the concatenated text blocks of the reply.
    async fn complete(&self, prompt: String) -> Result<String> {
        let url = format!("{}/messages", self.config.base_url.trim_end_matches('/'));
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: vec![WireMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(model = %self.config.model, "extraction request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| RegwatchError::Extraction(format!("request failed: {e}")))?;

        let status = response.status();
        // A rejected key fails every remaining call the same way.
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(RegwatchError::config(format!(
                "extraction API rejected the credentials ({status})"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegwatchError::Extraction(format!(
                "API error ({status}): {body}"
            )));
        }

        let reply: MessagesResponse = response
            .json()
            .await
            .map_err(|e| RegwatchError::Extraction(format!("unreadable API response: {e}")))?;

        let text: String = reply
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();

        if text.trim().is_empty() {
            return Err(RegwatchError::Extraction("API reply had no text".into()));
        }
        Ok(text)
    }
}

impl Extractor for ClaudeExtractor {
    #[instrument(skip_all, fields(change_id = %request.change_id, source = %request.source_name))]
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractedFinding> {
        let reply = self.complete(build_prompt(request)).await?;
        parse_extraction(&reply)
    }
}

/// Prompt asking for a single JSON object describing the change.
pub fn build_prompt(request: &ExtractionRequest) -> String {
    format!(
        r#"You are a compliance expert analyzing changes to payment industry documentation.

Source: {name}
URL: {url}

Below is a diff showing changes detected on this page. Analyze this change and extract compliance-relevant information.

DIFF:
{diff}

Extract the following information and return ONLY a valid JSON object (no markdown, no explanation):

{{
  "title": "Brief title of the compliance change",
  "summary": "2-3 sentence summary of what changed and why it matters",
  "deadline": "YYYY-MM-DD format if deadline mentioned, or null",
  "impact_level": "high|medium|low",
  "mccs": ["list", "of", "MCC", "codes", "if", "mentioned"],
  "regions": ["list", "of", "regions", "like", "Global", "MENA", "Europe"],
  "transaction_types": ["AFT", "OCT", "etc"],
  "technical_requirements": ["list", "of", "technical", "requirements"],
  "keywords": ["relevant", "keywords"]
}}

Guidelines:
- If no deadline is mentioned, use null
- impact_level: "high" if requires code changes, "medium" if requires process changes, "low" if informational
- Include all relevant MCCs, regions, transaction types
- Extract 5-10 relevant keywords
- Be concise and technical

Return ONLY the JSON object, nothing else."#,
        name = request.source_name,
        url = request.source_url,
        diff = request.diff_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use regwatch_shared::Impact;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> IntelligenceConfig {
        IntelligenceConfig {
            base_url: base_url.into(),
            timeout_secs: 5,
            ..IntelligenceConfig::default()
        }
    }

    fn request() -> ExtractionRequest {
        ExtractionRequest {
            change_id: "c1".into(),
            source_name: "Visa Core Rules".into(),
            source_url: "https://example.com/visa".into(),
            diff_text: "-old rule\n+new rule".into(),
        }
    }

    #[test]
    fn prompt_carries_source_and_diff() {
        let prompt = build_prompt(&request());
        assert!(prompt.contains("Source: Visa Core Rules"));
        assert!(prompt.contains("URL: https://example.com/visa"));
        assert!(prompt.contains("-old rule\n+new rule"));
        assert!(prompt.contains("\"impact_level\": \"high|medium|low\""));
    }

    #[tokio::test]
    async fn extracts_from_text_block() {
        let server = MockServer::start().await;
        let reply = serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "```json\n{\"title\": \"New AFT rule\", \"impact_level\": \"high\", \"regions\": [\"Global\"]}\n```"}
            ],
            "stop_reason": "end_turn"
        });

        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .expect(1)
            .mount(&server)
            .await;

        let extractor = ClaudeExtractor::new(config(&server.uri()), "test-key").unwrap();
        let finding = extractor.extract(&request()).await.unwrap();
        assert_eq!(finding.title, "New AFT rule");
        assert_eq!(finding.impact, Impact::High);
        assert_eq!(finding.regions, vec!["Global"]);
    }

    #[tokio::test]
    async fn api_errors_become_extraction_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let extractor = ClaudeExtractor::new(config(&server.uri()), "test-key").unwrap();
        let err = extractor.extract(&request()).await.unwrap_err();
        assert!(matches!(err, RegwatchError::Extraction(ref m) if m.contains("overloaded")));
    }

    #[tokio::test]
    async fn rejected_credentials_are_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
            .mount(&server)
            .await;

        let extractor = ClaudeExtractor::new(config(&server.uri()), "revoked-key").unwrap();
        let err = extractor.extract(&request()).await.unwrap_err();
        assert!(matches!(err, RegwatchError::Config { .. }), "got {err:?}");
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn non_json_reply_is_an_extraction_error() {
        let server = MockServer::start().await;
        let reply = serde_json::json!({
            "content": [{"type": "text", "text": "Sorry, I cannot help with that."}]
        });
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&server)
            .await;

        let extractor = ClaudeExtractor::new(config(&server.uri()), "test-key").unwrap();
        let err = extractor.extract(&request()).await.unwrap_err();
        assert!(matches!(err, RegwatchError::Extraction(_)));
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = IntelligenceConfig {
            api_key_env: "RW_TEST_MISSING_CLAUDE_KEY_987".into(),
            ..IntelligenceConfig::default()
        };
        let err = ClaudeExtractor::from_env(config).err().expect("missing key");
        assert!(matches!(err, RegwatchError::Config { .. }));
    }
}
