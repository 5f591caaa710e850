use crate::schema::Record;
use crate::utils::{CsvIoError, Result};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;

/// A file-backed input for either pipeline direction.
pub struct InputSource {
    path: String,
}

impl InputSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn open(&self) -> Result<File> {
        if !file_exists(&self.path) {
            return Err(CsvIoError::FileNotFound(self.path.clone()));
        }
        Ok(File::open(&self.path).await?)
    }

    /// Reads at most `max_bytes` from the start of the file.
    pub async fn read_sample(&self, max_bytes: usize) -> Result<Vec<u8>> {
        let file = self.open().await?;
        let mut sample = Vec::new();
        file.take(max_bytes as u64).read_to_end(&mut sample).await?;
        Ok(sample)
    }

    /// Sends every JSON object line of the file as a record. Blank lines are
    /// skipped. Returns the number of records sent.
    pub async fn stream_records(&self, tx: mpsc::Sender<Record>) -> Result<usize> {
        let file = self.open().await?;
        let mut lines = BufReader::new(file).lines();
        let mut line_number = 0;
        let mut sent = 0;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            let json: serde_json::Value = serde_json::from_str(&line)?;
            let record = Record::from_json(json).ok_or_else(|| {
                CsvIoError::SourceFailed(format!(
                    "{} line {} is not a JSON object",
                    self.path, line_number
                ))
            })?;

            if tx.send(record).await.is_err() {
                tracing::debug!(path = %self.path, "Record receiver closed");
                break;
            }
            sent += 1;
        }

        Ok(sent)
    }
}

pub async fn get_file_size(path: &str) -> Result<u64> {
    let metadata = tokio::fs::metadata(path).await?;
    Ok(metadata.len())
}

pub fn file_exists(path: &str) -> bool {
    Path::new(path).exists()
}
