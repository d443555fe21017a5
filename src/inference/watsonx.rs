use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{validate_request, InferenceClient, InferenceError, ModelResponse, ModelSettings};

/// Prompts longer than this are cut before sending
pub const MAX_HOSTED_PROMPT_CHARS: usize = 8000;

const TRUNCATION_NOTE: &str = "\n\n[Note: Prompt truncated due to length limit]";
const API_VERSION: &str = "2023-05-29";

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    results: Vec<GenerationResult>,
}

#[derive(Debug, Deserialize)]
struct GenerationResult {
    #[serde(default)]
    generated_text: String,
}

/// Calls the hosted text-generation endpoint directly over HTTP
#[derive(Debug, Clone)]
pub struct WatsonxClient {
    client: Client,
    settings: ModelSettings,
}

impl WatsonxClient {
    pub fn new(settings: ModelSettings, timeout: Duration) -> Self {
        WatsonxClient {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            settings,
        }
    }

    fn generation_url(&self) -> String {
        format!(
            "{}/ml/v1/text/generation?version={}",
            self.settings.endpoint_url.trim_end_matches('/'),
            API_VERSION
        )
    }

    async fn call(&self, model_id: &str, prompt: &str) -> Result<String, InferenceError> {
        validate_request(model_id, prompt)?;

        let model = self
            .settings
            .resolve(model_id)
            .ok_or_else(|| InferenceError::UnknownModel(model_id.to_string()))?;
        if self.settings.iam_token.is_empty() {
            return Err(InferenceError::NotConfigured("IAM token"));
        }
        if self.settings.project_id.is_empty() {
            return Err(InferenceError::NotConfigured("Project ID"));
        }

        let body = json!({
            "input": truncate_prompt(prompt),
            "parameters": {
                "decoding_method": "greedy",
                "max_new_tokens": 1000,
                "repetition_penalty": 1.1,
                "temperature": 0.7
            },
            "model_id": model,
            "project_id": self.settings.project_id,
        });

        let response = self
            .client
            .post(self.generation_url())
            .bearer_auth(&self.settings.iam_token)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout
                } else {
                    InferenceError::Http(e)
                }
            })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(InferenceError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        let parsed: GenerationResponse =
            serde_json::from_str(&text).map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;

        parsed
            .results
            .into_iter()
            .next()
            .map(|r| r.generated_text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(InferenceError::EmptyResponse)
    }
}

impl InferenceClient for WatsonxClient {
    async fn invoke_model(&self, model_id: &str, prompt: &str) -> ModelResponse {
        let result = self.call(model_id, prompt).await;
        if let Err(ref e) = result {
            log::warn!("Hosted model call for {} failed: {}", model_id, e);
        }
        result.into()
    }
}

/// Cut a prompt to the hosted limit, marking that it was cut
pub fn truncate_prompt(prompt: &str) -> String {
    match prompt.char_indices().nth(MAX_HOSTED_PROMPT_CHARS) {
        Some((cut, _)) => format!("{}{}", &prompt[..cut], TRUNCATION_NOTE),
        None => prompt.to_string(),
    }
}

/// Best error message from an error body
fn api_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };

    value
        .get("errors")
        .and_then(|errors| errors.get(0))
        .and_then(|first| first.get("message"))
        .or_else(|| value.get("message"))
        .and_then(|message| message.as_str())
        .map(|message| message.to_string())
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_prompt() {
        let short = "a".repeat(MAX_HOSTED_PROMPT_CHARS);
        assert_eq!(truncate_prompt(&short), short);

        let long = "é".repeat(MAX_HOSTED_PROMPT_CHARS + 10);
        let cut = truncate_prompt(&long);
        assert!(cut.ends_with(TRUNCATION_NOTE));
        assert_eq!(
            cut.chars().count(),
            MAX_HOSTED_PROMPT_CHARS + TRUNCATION_NOTE.chars().count()
        );
    }

    #[test]
    fn test_api_error_message() {
        assert_eq!(
            api_error_message(r#"{"errors": [{"code": "x", "message": "token expired"}]}"#),
            "token expired"
        );
        assert_eq!(api_error_message(r#"{"message": "bad project"}"#), "bad project");
        assert_eq!(api_error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_generation_url() {
        let settings = ModelSettings {
            endpoint_url: "https://example.test/".to_string(),
            ..ModelSettings::default()
        };
        let client = WatsonxClient::new(settings, Duration::from_secs(1));
        assert_eq!(
            client.generation_url(),
            "https://example.test/ml/v1/text/generation?version=2023-05-29"
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_without_network() {
        let client = WatsonxClient::new(ModelSettings::default(), Duration::from_secs(1));
        let response = client.invoke_model("granite33", "hello").await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("IAM token not configured"));

        let client = WatsonxClient::new(
            ModelSettings {
                iam_token: "token".to_string(),
                ..ModelSettings::default()
            },
            Duration::from_secs(1),
        );
        let response = client.invoke_model("granite33", "hello").await;
        assert_eq!(response.error.as_deref(), Some("Project ID not configured"));
    }
}
