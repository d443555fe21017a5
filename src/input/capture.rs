//! Traffic observation sources
//!
//! The monitoring session pulls observations through [`ObservationSource`].
//! [`ScriptCapture`] runs an external capture script and reads its JSON output.

use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::models::TrafficObservation;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to run capture script: {0}")]
    Io(#[from] std::io::Error),

    #[error("capture script timed out after {0:?}")]
    Timeout(Duration),

    #[error("capture script exited with {status}: {stderr}")]
    ScriptFailed { status: String, stderr: String },

    #[error("capture script reported an error: {0}")]
    Reported(String),

    #[error("invalid capture output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

/// Anything that can hand over a batch of fresh observations
pub trait ObservationSource: Send + Sync {
    /// Fetch the observations captured since the previous call
    fn poll(&self) -> impl Future<Output = Result<Vec<TrafficObservation>, CaptureError>> + Send;
}

#[derive(Debug, Deserialize)]
struct CaptureOutput {
    #[serde(default)]
    data: Vec<TrafficObservation>,
    #[serde(default)]
    error: Option<String>,
}

/// Runs `interpreter script` and parses `{"data": [...]}` from stdout
#[derive(Debug, Clone)]
pub struct ScriptCapture {
    interpreter: String,
    script: PathBuf,
    timeout: Duration,
}

impl ScriptCapture {
    pub fn new(interpreter: &str, script: PathBuf, timeout: Duration) -> Self {
        ScriptCapture {
            interpreter: interpreter.to_string(),
            script,
            timeout,
        }
    }

    async fn run(&self) -> Result<Vec<TrafficObservation>, CaptureError> {
        let child = Command::new(&self.interpreter)
            .arg(&self.script)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| CaptureError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(CaptureError::ScriptFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_capture_output(&output.stdout)
    }
}

impl ObservationSource for ScriptCapture {
    async fn poll(&self) -> Result<Vec<TrafficObservation>, CaptureError> {
        let observations = self.run().await?;
        log::debug!(
            "Capture script {:?} returned {} observations",
            self.script,
            observations.len()
        );
        Ok(observations)
    }
}

/// Parse the capture script's stdout
pub fn parse_capture_output(stdout: &[u8]) -> Result<Vec<TrafficObservation>, CaptureError> {
    let output: CaptureOutput = serde_json::from_slice(stdout)?;
    if let Some(error) = output.error {
        return Err(CaptureError::Reported(error));
    }
    Ok(output.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn script(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".sh").tempfile().unwrap();
        write!(file, "{}", body).unwrap();
        file
    }

    #[test]
    fn test_parse_capture_output() {
        let stdout = br#"{"data": [
            {"source_ip": "8.8.8.8", "destination_ip": "10.0.0.5", "protocol": "TCP",
             "source_port": "443", "destination_port": 3389, "packet_length": 2000,
             "state": "ESTABLISHED", "timestamp": "2024-05-02T10:11:12.123456",
             "connection_type": "inet"},
            {"source_ip": "10.0.0.9", "protocol": "UDP", "source_port": "", "packet_length": "bad"}
        ]}"#;

        let observations = parse_capture_output(stdout).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].source_port, Some(443));
        assert_eq!(observations[0].destination_port, Some(3389));
        assert_eq!(observations[0].packet_length, 2000);
        assert_eq!(observations[1].source_port, None);
        assert_eq!(observations[1].destination_ip, "");
        assert_eq!(observations[1].packet_length, 0);
    }

    #[test]
    fn test_reported_error() {
        let result = parse_capture_output(br#"{"error": "permission denied"}"#);
        assert!(matches!(result, Err(CaptureError::Reported(msg)) if msg == "permission denied"));
    }

    #[test]
    fn test_garbage_output() {
        assert!(matches!(
            parse_capture_output(b"Traceback (most recent call last)"),
            Err(CaptureError::InvalidOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_script_capture_runs_script() {
        let file = script(
            "echo '{\"data\": [{\"source_ip\": \"1.2.3.4\", \"destination_ip\": \"10.0.0.1\", \"protocol\": \"TCP\"}]}'\n",
        );
        let capture = ScriptCapture::new("sh", file.path().to_path_buf(), Duration::from_secs(5));

        let observations = capture.poll().await.unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].source_ip, "1.2.3.4");
    }

    #[tokio::test]
    async fn test_script_capture_failure_and_timeout() {
        let failing = script("echo boom >&2\nexit 3\n");
        let capture = ScriptCapture::new("sh", failing.path().to_path_buf(), Duration::from_secs(5));
        match capture.poll().await {
            Err(CaptureError::ScriptFailed { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("unexpected result: {:?}", other),
        }

        let slow = script("sleep 5\n");
        let capture = ScriptCapture::new("sh", slow.path().to_path_buf(), Duration::from_millis(100));
        assert!(matches!(capture.poll().await, Err(CaptureError::Timeout(_))));
    }
}
