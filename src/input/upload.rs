//! Checks applied to uploaded files before they reach the parser

use std::path::Path;
use thiserror::Error;

/// Default maximum upload size (50 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Extensions accepted by default
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 5] = ["pcap", "pcapng", "cap", "txt", "log"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file is empty")]
    Empty,

    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("file type '{0}' is not allowed")]
    DisallowedExtension(String),

    #[error("file has no extension")]
    MissingExtension,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Size and extension policy for uploaded files
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_bytes: u64,
    allowed_extensions: Vec<String>,
}

impl UploadPolicy {
    pub fn new(max_bytes: u64, allowed_extensions: &[String]) -> Self {
        UploadPolicy {
            max_bytes,
            allowed_extensions: allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Validate a file by name and size
    pub fn check(&self, file_name: &str, size: u64) -> Result<(), UploadError> {
        if size == 0 {
            return Err(UploadError::Empty);
        }
        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .ok_or(UploadError::MissingExtension)?;

        if !self.allowed_extensions.iter().any(|allowed| *allowed == extension) {
            return Err(UploadError::DisallowedExtension(extension));
        }

        Ok(())
    }

    /// Validate and read a file from disk
    pub fn read_file(&self, path: &Path) -> Result<Vec<u8>, UploadError> {
        let size = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        self.check(name, size)?;
        Ok(std::fs::read(path)?)
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        let allowed: Vec<String> = DEFAULT_ALLOWED_EXTENSIONS
            .iter()
            .map(|ext| ext.to_string())
            .collect();
        Self::new(DEFAULT_MAX_UPLOAD_BYTES, &allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_accepts_log_and_capture_files() {
        let policy = UploadPolicy::default();
        assert!(policy.check("access.log", 10).is_ok());
        assert!(policy.check("dump.PCAPNG", 10).is_ok());
        assert!(policy.check("notes.txt", DEFAULT_MAX_UPLOAD_BYTES).is_ok());
    }

    #[test]
    fn test_rejects_bad_uploads() {
        let policy = UploadPolicy::default();
        assert!(matches!(policy.check("a.log", 0), Err(UploadError::Empty)));
        assert!(matches!(
            policy.check("a.log", DEFAULT_MAX_UPLOAD_BYTES + 1),
            Err(UploadError::TooLarge { .. })
        ));
        assert!(matches!(
            policy.check("payload.exe", 10),
            Err(UploadError::DisallowedExtension(ext)) if ext == "exe"
        ));
        assert!(matches!(policy.check("README", 10), Err(UploadError::MissingExtension)));
    }

    #[test]
    fn test_custom_policy_normalizes_extensions() {
        let policy = UploadPolicy::new(100, &[".JSON".to_string()]);
        assert!(policy.check("events.json", 50).is_ok());
        assert!(policy.check("events.log", 50).is_err());
        assert!(policy.check("events.json", 101).is_err());
    }

    #[test]
    fn test_read_file() {
        let mut file = tempfile::Builder::new().suffix(".log").tempfile().unwrap();
        writeln!(file, "hello").unwrap();

        let bytes = UploadPolicy::default().read_file(file.path()).unwrap();
        assert_eq!(bytes, b"hello\n");
    }
}
