pub mod capture;
pub mod file_tailer;
pub mod parser;
pub mod syslog_listener;
pub mod timestamp;
pub mod upload;

pub use capture::{CaptureError, ObservationSource, ScriptCapture};
pub use file_tailer::FileTailer;
pub use parser::{LineFormat, LogRecordParser};
pub use syslog_listener::SyslogListener;
pub use upload::{UploadError, UploadPolicy};
