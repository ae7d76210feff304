pub mod db;
pub mod environment;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod logging;
pub mod oracle;
pub mod replicate;
pub mod summarize;

use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use ollama_rs::Ollama;

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_LLM_REQUEST: &str = "llm_request";
pub const TARGET_DB: &str = "db_query";

/// Maximum number of characters handed to the summarization oracle in one
/// call. Longer raw text is truncated, not rejected.
pub const DEFAULT_SUMMARY_INPUT_CAP: usize = 8_000;

#[derive(Clone, Debug)]
pub enum LLMClient {
    Ollama(Ollama),
    OpenAI(OpenAIClient<OpenAIConfig>),
}

#[derive(Clone)]
pub struct LLMParams {
    pub llm_client: LLMClient,
    pub model: String,
    pub temperature: f32,
}
