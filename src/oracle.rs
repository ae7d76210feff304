//! The summarization oracle boundary: text in, structured summary out.

use async_openai::types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs};
use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::options::GenerationOptions;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::db::Sentiment;
use crate::error::TributaryError;
use crate::{LLMClient, LLMParams, TARGET_LLM_REQUEST};

const ORACLE_TIMEOUT: Duration = Duration::from_secs(120);

const INSTRUCTIONS: &str = "Summarize the following content. Respond with a single JSON object \
and nothing else, with these fields: \
\"summary\" (2-3 sentence summary), \
\"key_points\" (array of strings, most important points first), \
\"topics\" (array of short topic strings), \
\"sentiment\" (one of \"positive\", \"negative\", \"neutral\"), \
\"confidence\" (integer 0-100).";

/// The structured result the oracle must produce. Anything that does not
/// parse into this shape is a hard failure; no partial summary is kept.
#[derive(Debug, Clone)]
pub struct OracleSummary {
    pub summary: String,
    pub key_points: Vec<String>,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
    pub confidence: u8,
    pub model: String,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<OracleSummary, TributaryError>;
}

#[derive(Deserialize)]
struct RawOracleResponse {
    summary: String,
    #[serde(default, alias = "keyPoints")]
    key_points: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
    sentiment: String,
    confidence: f64,
}

/// Strips an optional markdown code fence so a ```json wrapped object still
/// parses; everything else must be the bare JSON object.
fn unfence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    else {
        return trimmed;
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

pub fn parse_oracle_response(raw: &str, model: &str) -> Result<OracleSummary, TributaryError> {
    let parsed: RawOracleResponse = serde_json::from_str(unfence(raw))
        .map_err(|e| TributaryError::Oracle(format!("malformed oracle response: {}", e)))?;

    let sentiment: Sentiment = parsed
        .sentiment
        .parse()
        .map_err(TributaryError::Oracle)?;

    Ok(OracleSummary {
        summary: parsed.summary,
        key_points: parsed.key_points,
        topics: parsed.topics,
        sentiment,
        confidence: parsed.confidence.clamp(0.0, 100.0).round() as u8,
        model: model.to_string(),
    })
}

/// Oracle implementation over a hosted LLM, Ollama or OpenAI. One call per
/// summarization request; retry policy belongs to the caller.
pub struct LlmOracle {
    params: LLMParams,
}

impl LlmOracle {
    pub fn new(params: LLMParams) -> Self {
        Self { params }
    }

    async fn generate(&self, prompt: &str) -> Result<String, TributaryError> {
        match &self.params.llm_client {
            LLMClient::Ollama(ollama) => {
                let mut request =
                    GenerationRequest::new(self.params.model.clone(), prompt.to_string());
                request.options =
                    Some(GenerationOptions::default().temperature(self.params.temperature));

                match timeout(ORACLE_TIMEOUT, ollama.generate(request)).await {
                    Ok(Ok(response)) => Ok(response.response),
                    Ok(Err(e)) => {
                        warn!(target: TARGET_LLM_REQUEST, "Ollama generation failed: {}", e);
                        Err(TributaryError::Oracle(e.to_string()))
                    }
                    Err(_) => {
                        warn!(target: TARGET_LLM_REQUEST, "Ollama request timed out");
                        Err(TributaryError::Oracle("oracle request timed out".into()))
                    }
                }
            }
            LLMClient::OpenAI(client) => {
                let request = CreateChatCompletionRequestArgs::default()
                    .model(&self.params.model)
                    .temperature(self.params.temperature)
                    .messages([ChatCompletionRequestUserMessageArgs::default()
                        .content(prompt)
                        .build()
                        .map_err(|e| TributaryError::Oracle(e.to_string()))?
                        .into()])
                    .build()
                    .map_err(|e| TributaryError::Oracle(e.to_string()))?;

                match timeout(ORACLE_TIMEOUT, client.chat().create(request)).await {
                    Ok(Ok(response)) => response
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .ok_or_else(|| {
                            TributaryError::Oracle("empty completion choices".into())
                        }),
                    Ok(Err(e)) => {
                        warn!(target: TARGET_LLM_REQUEST, "OpenAI completion failed: {}", e);
                        Err(TributaryError::Oracle(e.to_string()))
                    }
                    Err(_) => {
                        warn!(target: TARGET_LLM_REQUEST, "OpenAI request timed out");
                        Err(TributaryError::Oracle("oracle request timed out".into()))
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn summarize(&self, text: &str) -> Result<OracleSummary, TributaryError> {
        let prompt = format!("{}\n\n{}", INSTRUCTIONS, text);
        debug!(target: TARGET_LLM_REQUEST, "Requesting summary from model {}", self.params.model);

        let raw = self.generate(&prompt).await?;
        parse_oracle_response(&raw, &self.params.model).inspect_err(|e| {
            error!(target: TARGET_LLM_REQUEST, "Oracle response rejected: {}", e);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"{
        "summary": "A short summary.",
        "key_points": ["first", "second"],
        "topics": ["rust"],
        "sentiment": "positive",
        "confidence": 87
    }"#;

    #[test]
    fn parses_well_formed_response() {
        let parsed = parse_oracle_response(GOOD, "test-model").unwrap();
        assert_eq!(parsed.summary, "A short summary.");
        assert_eq!(parsed.key_points, vec!["first", "second"]);
        assert_eq!(parsed.sentiment, Sentiment::Positive);
        assert_eq!(parsed.confidence, 87);
        assert_eq!(parsed.model, "test-model");
    }

    #[test]
    fn tolerates_a_json_code_fence() {
        let fenced = format!("```json\n{}\n```", GOOD);
        assert!(parse_oracle_response(&fenced, "m").is_ok());
    }

    #[test]
    fn non_json_is_a_hard_failure() {
        let err = parse_oracle_response("I could not summarize this.", "m").unwrap_err();
        assert!(matches!(err, TributaryError::Oracle(_)));
    }

    #[test]
    fn unknown_sentiment_is_rejected() {
        let raw = GOOD.replace("positive", "ecstatic");
        assert!(parse_oracle_response(&raw, "m").is_err());
    }

    #[test]
    fn confidence_is_clamped() {
        let raw = GOOD.replace("87", "250");
        assert_eq!(parse_oracle_response(&raw, "m").unwrap().confidence, 100);

        let raw = GOOD.replace("87", "-3");
        assert_eq!(parse_oracle_response(&raw, "m").unwrap().confidence, 0);
    }

    #[test]
    fn camel_case_key_points_accepted() {
        let raw = GOOD.replace("key_points", "keyPoints");
        assert_eq!(
            parse_oracle_response(&raw, "m").unwrap().key_points,
            vec!["first", "second"]
        );
    }
}
