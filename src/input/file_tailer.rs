use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use super::parser::LogRecordParser;
use crate::models::LogRecord;

/// Follows a growing log file and turns each appended line into a record
pub struct FileTailer {
    file_path: PathBuf,
    source_name: String,
    parser: LogRecordParser,
    from_start: bool,
    lines_read: usize,
}

impl FileTailer {
    /// Tail `file_path` from its current end
    pub fn new(file_path: PathBuf) -> Self {
        let source_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| file_path.display().to_string());

        FileTailer {
            file_path,
            source_name,
            parser: LogRecordParser::new(),
            from_start: false,
            lines_read: 0,
        }
    }

    /// Read the existing contents first instead of skipping to the end
    pub fn from_start(mut self, from_start: bool) -> Self {
        self.from_start = from_start;
        self
    }

    /// Run the tailer, sending records through the channel.
    ///
    /// Runs until the channel is closed. Line numbers count lines seen by
    /// this tailer, so they only match file line numbers with `from_start`.
    pub async fn run(&mut self, tx: mpsc::Sender<LogRecord>) -> std::io::Result<()> {
        let file = File::open(&self.file_path).await?;
        let mut reader = BufReader::new(file);

        if !self.from_start {
            reader.seek(std::io::SeekFrom::End(0)).await?;
        }

        log::info!("File tailer started for {:?}", self.file_path);

        let mut pending = String::new();
        loop {
            match reader.read_line(&mut pending).await {
                Ok(0) => {
                    if tx.is_closed() {
                        break;
                    }
                    sleep(Duration::from_millis(100)).await;
                }
                Ok(_) => {
                    // A line without its newline is still being written
                    if !pending.ends_with('\n') {
                        continue;
                    }

                    self.lines_read += 1;
                    let line = pending.trim_end_matches(['\r', '\n']);
                    if !line.trim().is_empty() {
                        let record = self.parser.parse_line(line, &self.source_name, self.lines_read);
                        if tx.send(record).await.is_err() {
                            log::info!("Channel closed, stopping file tailer");
                            break;
                        }
                    }
                    pending.clear();
                }
                Err(e) => {
                    log::error!("Error reading {:?}: {}", self.file_path, e);
                    pending.clear();
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }

        Ok(())
    }
}
