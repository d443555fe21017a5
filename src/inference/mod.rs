//! Model invocation
//!
//! Everything that talks to a language model goes through [`InferenceClient`].
//! Callers always get a [`ModelResponse`] back: transport problems, bad
//! prompts and model-side errors are reported in it rather than raised.

pub mod script;
pub mod watsonx;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use thiserror::Error;

pub use script::ScriptInference;
pub use watsonx::WatsonxClient;

/// Primary reasoning model
pub const PRIMARY_MODEL: &str = "granite33";

/// Long-context model
pub const LONG_CONTEXT_MODEL: &str = "granite40";

/// Model ids accepted by the adapters
pub const KNOWN_MODELS: [&str; 2] = [PRIMARY_MODEL, LONG_CONTEXT_MODEL];

/// Largest prompt accepted, in characters
pub const MAX_PROMPT_CHARS: usize = 50_000;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("invalid model type: {0}")]
    UnknownModel(String),

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("prompt is {0} characters, limit is {MAX_PROMPT_CHARS}")]
    PromptTooLong(usize),

    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model call timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API call failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid model output: {0}")]
    InvalidOutput(String),

    #[error("model returned an error: {0}")]
    Model(String),

    #[error("no response generated")]
    EmptyResponse,
}

/// Outcome of one model call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub success: bool,
    pub text: String,
    pub error: Option<String>,
}

impl ModelResponse {
    pub fn ok(text: String) -> Self {
        ModelResponse {
            success: true,
            text,
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        ModelResponse {
            success: false,
            text: String::new(),
            error: Some(error.to_string()),
        }
    }
}

impl From<Result<String, InferenceError>> for ModelResponse {
    fn from(result: Result<String, InferenceError>) -> Self {
        match result {
            Ok(text) => ModelResponse::ok(text),
            Err(e) => ModelResponse::failure(e),
        }
    }
}

/// A language model that can be asked to complete a prompt
pub trait InferenceClient: Send + Sync {
    /// Send `prompt` to the model registered as `model_id`
    fn invoke_model(&self, model_id: &str, prompt: &str) -> impl Future<Output = ModelResponse> + Send;
}

/// Connection settings for the hosted model service.
///
/// Shared by both adapters; the script adapter hands them to its script as JSON.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub endpoint_url: String,
    pub project_id: String,
    pub iam_token: String,
    pub granite33_model: String,
    pub granite40_model: String,
}

impl ModelSettings {
    /// Provider model name for a model id
    pub fn resolve(&self, model_id: &str) -> Option<&str> {
        match model_id {
            PRIMARY_MODEL => Some(&self.granite33_model),
            LONG_CONTEXT_MODEL => Some(&self.granite40_model),
            _ => None,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            endpoint_url: "https://us-south.ml.cloud.ibm.com".to_string(),
            project_id: String::new(),
            iam_token: String::new(),
            granite33_model: "ibm/granite-3-3-8b-instruct".to_string(),
            granite40_model: "ibm/granite-4-0-tiny".to_string(),
        }
    }
}

impl fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSettings")
            .field("endpoint_url", &self.endpoint_url)
            .field("project_id", &self.project_id)
            .field("iam_token", &if self.iam_token.is_empty() { "" } else { "***" })
            .field("granite33_model", &self.granite33_model)
            .field("granite40_model", &self.granite40_model)
            .finish()
    }
}

/// Check a model id and prompt before sending them anywhere
pub fn validate_request(model_id: &str, prompt: &str) -> Result<(), InferenceError> {
    if !KNOWN_MODELS.contains(&model_id) {
        return Err(InferenceError::UnknownModel(model_id.to_string()));
    }
    if prompt.trim().is_empty() {
        return Err(InferenceError::EmptyPrompt);
    }
    let chars = prompt.chars().count();
    if chars > MAX_PROMPT_CHARS {
        return Err(InferenceError::PromptTooLong(chars));
    }
    Ok(())
}
