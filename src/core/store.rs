/// Append-only logs: flushed context lines and failed dialogues.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON encode error: {0}")]
    Encode(#[from] ron::Error),
    #[error("RON decode error: {0}")]
    Decode(#[from] ron::error::SpannedError),
}

const CHUNK: u64 = 4096;

fn open_append(path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Serialized context lines evicted from memory, one per line.
#[derive(Debug, Clone)]
pub struct ContextLog {
    path: PathBuf,
}

impl ContextLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_lines(&self, lines: &[String]) -> Result<(), StoreError> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut file = open_append(&self.path)?;
        let mut buf = String::new();
        for line in lines {
            buf.push_str(line);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())?;
        Ok(())
    }

    /// The last `n` lines, read backwards from the end of the file.
    pub fn tail(&self, n: usize) -> Result<Vec<String>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut pos = file.metadata()?.len();
        let mut buf: Vec<u8> = Vec::new();
        let mut newlines = 0;

        // One newline more than wanted guarantees the first kept line is whole.
        while pos > 0 && newlines <= n {
            let read = CHUNK.min(pos);
            pos -= read;
            file.seek(SeekFrom::Start(pos))?;
            let mut chunk = vec![0u8; read as usize];
            file.read_exact(&mut chunk)?;
            newlines += chunk.iter().filter(|&&b| b == b'\n').count();
            chunk.extend_from_slice(&buf);
            buf = chunk;
        }

        let text = String::from_utf8_lossy(&buf);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..].iter().map(|l| l.to_string()).collect())
    }

    /// Number of lines written so far.
    pub fn len(&self) -> Result<usize, StoreError> {
        match File::open(&self.path) {
            Ok(f) => Ok(BufReader::new(f).lines().count()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Everything needed to reproduce a failed dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub dialogue: u64,
    pub template: String,
    pub seed: u64,
    pub error: String,
    pub lines: Vec<String>,
}

/// Failed dialogues, one RON entry per line.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, entry: &ErrorEntry) -> Result<(), StoreError> {
        let mut line = ron::to_string(entry)?;
        line.push('\n');
        open_append(&self.path)?.write_all(line.as_bytes())?;
        Ok(())
    }

    pub fn entries(&self) -> Result<Vec<ErrorEntry>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                out.push(ron::from_str(&line)?);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_reads_last_lines_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let log = ContextLog::new(dir.path().join("context.log"));
        let lines: Vec<String> = (0..2000).map(|i| format!("bsent line {} esent", i)).collect();
        log.append_lines(&lines[..1200]).unwrap();
        log.append_lines(&lines[1200..]).unwrap();

        assert_eq!(log.len().unwrap(), 2000);
        assert_eq!(log.tail(3).unwrap(), lines[1997..].to_vec());
        assert_eq!(log.tail(700).unwrap(), lines[1300..].to_vec());
        assert_eq!(log.tail(5000).unwrap(), lines);
        assert!(log.tail(0).unwrap().is_empty());
    }

    #[test]
    fn missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = ContextLog::new(dir.path().join("absent.log"));
        assert!(log.tail(4).unwrap().is_empty());
        assert!(log.is_empty().unwrap());
    }

    #[test]
    fn error_entries_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("errors.log"));
        let entry = ErrorEntry {
            dialogue: 3,
            template: "go_location".to_string(),
            seed: 42,
            error: "entity not found: #9".to_string(),
            lines: vec!["bsent esent".to_string()],
        };
        log.append(&entry).unwrap();
        log.append(&entry).unwrap();
        assert_eq!(log.entries().unwrap(), vec![entry.clone(), entry]);
    }
}
