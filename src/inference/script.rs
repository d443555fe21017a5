use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;

use super::{validate_request, InferenceClient, InferenceError, ModelResponse, ModelSettings};

/// JSON the model script prints on stdout
#[derive(Debug, Deserialize)]
struct ScriptOutput {
    response: Option<String>,
    error: Option<String>,
}

/// Invokes models through an external script.
///
/// Runs `interpreter script model_id prompt_file config_file`, where the two
/// files are scratch files holding the prompt and the JSON settings.
#[derive(Debug, Clone)]
pub struct ScriptInference {
    interpreter: String,
    script: PathBuf,
    settings: ModelSettings,
    timeout: Duration,
}

impl ScriptInference {
    pub fn new(interpreter: &str, script: PathBuf, settings: ModelSettings, timeout: Duration) -> Self {
        ScriptInference {
            interpreter: interpreter.to_string(),
            script,
            settings,
            timeout,
        }
    }

    async fn call(&self, model_id: &str, prompt: &str) -> Result<String, InferenceError> {
        validate_request(model_id, prompt)?;

        // Both files must outlive the child process
        let mut prompt_file = NamedTempFile::new()?;
        prompt_file.write_all(prompt.as_bytes())?;
        prompt_file.flush()?;

        let mut config_file = NamedTempFile::new()?;
        serde_json::to_writer(&mut config_file, &self.settings)
            .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;
        config_file.flush()?;

        log::debug!(
            "Invoking {} via {:?} ({} prompt chars)",
            model_id,
            self.script,
            prompt.chars().count()
        );

        let child = Command::new(&self.interpreter)
            .arg(&self.script)
            .arg(model_id)
            .arg(prompt_file.path())
            .arg(config_file.path())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| InferenceError::Timeout)??;

        if !output.stderr.is_empty() {
            log::debug!("Model script stderr: {}", String::from_utf8_lossy(&output.stderr).trim());
        }

        parse_script_output(&output.stdout)
    }
}

impl InferenceClient for ScriptInference {
    async fn invoke_model(&self, model_id: &str, prompt: &str) -> ModelResponse {
        self.call(model_id, prompt).await.into()
    }
}

/// Parse the script's stdout.
///
/// Scripts sometimes print diagnostics before the result, so when the whole
/// output is not JSON the last non-empty line is tried.
fn parse_script_output(stdout: &[u8]) -> Result<String, InferenceError> {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(InferenceError::InvalidOutput("empty output".to_string()));
    }

    let parsed = serde_json::from_str::<ScriptOutput>(trimmed).or_else(|first_err| {
        trimmed
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| serde_json::from_str::<ScriptOutput>(line.trim()).ok())
            .ok_or_else(|| InferenceError::InvalidOutput(first_err.to_string()))
    })?;

    match parsed {
        ScriptOutput { error: Some(error), .. } => Err(InferenceError::Model(error)),
        ScriptOutput { response: Some(text), .. } if !text.trim().is_empty() => Ok(text),
        _ => Err(InferenceError::EmptyResponse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(body: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".sh").tempfile().unwrap();
        write!(file, "{}", body).unwrap();
        file
    }

    fn client(file: &NamedTempFile) -> ScriptInference {
        ScriptInference::new(
            "sh",
            file.path().to_path_buf(),
            ModelSettings::default(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_parse_script_output() {
        assert_eq!(parse_script_output(br#"{"response": "RISK SCORE: 4"}"#).unwrap(), "RISK SCORE: 4");
        assert!(matches!(
            parse_script_output(br#"{"error": "IAM token not configured"}"#),
            Err(InferenceError::Model(msg)) if msg == "IAM token not configured"
        ));
        assert_eq!(
            parse_script_output(b"loading...\n{\"response\": \"ok\"}\n").unwrap(),
            "ok"
        );
        assert!(matches!(parse_script_output(br#"{"response": ""}"#), Err(InferenceError::EmptyResponse)));
        assert!(matches!(parse_script_output(b"not json"), Err(InferenceError::InvalidOutput(_))));
        assert!(matches!(parse_script_output(b""), Err(InferenceError::InvalidOutput(_))));
    }

    #[tokio::test]
    async fn test_script_receives_model_and_prompt() {
        // Echo back the model id and the prompt file contents
        let file = script(
            "prompt=$(cat \"$2\")\nprintf '{\"response\": \"%s:%s\"}' \"$1\" \"$prompt\"\n",
        );
        let response = client(&file).invoke_model("granite40", "hello").await;
        assert!(response.success, "{:?}", response.error);
        assert_eq!(response.text, "granite40:hello");
    }

    #[tokio::test]
    async fn test_script_receives_settings() {
        let file = script("grep -q 'granite-3-3-8b-instruct' \"$3\" && echo '{\"response\": \"configured\"}'\n");
        let response = client(&file).invoke_model("granite33", "hello").await;
        assert_eq!(response.text, "configured");
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_the_script() {
        let file = script("echo '{\"response\": \"should not run\"}'\n");
        let client = client(&file);

        let response = client.invoke_model("unknown", "hello").await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("invalid model type"));

        let response = client.invoke_model("granite33", "").await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_script_error_and_timeout() {
        let failing = script("echo '{\"error\": \"Project ID not configured\"}'\n");
        let response = client(&failing).invoke_model("granite33", "hi").await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("Project ID not configured"));

        let slow = script("sleep 5\n");
        let client = ScriptInference::new(
            "sh",
            slow.path().to_path_buf(),
            ModelSettings::default(),
            Duration::from_millis(100),
        );
        let response = client.invoke_model("granite33", "hi").await;
        assert_eq!(response.error.as_deref(), Some("model call timed out"));
    }

    #[test]
    fn test_blocking_invocation() {
        let file = script("echo '{\"response\": \"blocking\"}'\n");
        let client = client(&file);
        let response = tokio_test::block_on(client.invoke_model("granite33", "hi"));
        assert_eq!(response.text, "blocking");
    }
}
