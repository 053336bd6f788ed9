//! Append-only event journal.
//!
//! The journal is the only shared state between the frame path and the
//! consolidation worker. Every writer and the single drainer go through the
//! same lock, so a drain never observes a half-written line and no append
//! is lost between the read and the truncate.

use anyhow::{anyhow, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::event::DetectionEvent;

pub trait EventJournal: Send + Sync {
    /// Append one raw line. Must not contain a newline.
    fn append_line(&self, line: &str) -> Result<()>;

    /// Read every pending line and clear the journal, atomically.
    fn drain_all(&self) -> Result<Vec<String>>;

    /// Pending line count (diagnostics only).
    fn len_hint(&self) -> Result<usize>;

    fn append(&self, event: &DetectionEvent) -> Result<()> {
        self.append_line(&event.to_line()?)
    }
}

fn check_line(line: &str) -> Result<()> {
    if line.contains('\n') || line.contains('\r') {
        return Err(anyhow!("journal lines must not contain line breaks"));
    }
    Ok(())
}

/// Split raw journal bytes into non-blank lines.
///
/// A line that is not valid UTF-8 (torn write, outside corruption) is passed
/// on lossily so the consumer rejects it as one bad line; the second value
/// counts them.
fn split_lines(raw: &[u8]) -> (Vec<String>, usize) {
    let mut invalid = 0;
    let lines = raw
        .split(|&b| b == b'\n')
        .filter_map(|line| {
            if std::str::from_utf8(line).is_err() {
                invalid += 1;
            }
            let text = String::from_utf8_lossy(line);
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect();
    (lines, invalid)
}

/// Line-oriented JSON journal on local disk.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileJournal {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create journal directory {}", parent.display())
                })?;
            }
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_locked(&self) -> Result<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(raw) => Ok(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => {
                Err(e).with_context(|| format!("failed to read journal {}", self.path.display()))
            }
        }
    }
}

impl EventJournal for FileJournal {
    fn append_line(&self, line: &str) -> Result<()> {
        check_line(line)?;
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("journal lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open journal {}", self.path.display()))?;
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');
        file.write_all(record.as_bytes())
            .with_context(|| format!("failed to append to journal {}", self.path.display()))?;
        Ok(())
    }

    fn drain_all(&self) -> Result<Vec<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("journal lock poisoned"))?;
        let raw = self.read_locked()?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        fs::write(&self.path, b"")
            .with_context(|| format!("failed to truncate journal {}", self.path.display()))?;
        let (lines, invalid) = split_lines(&raw);
        if invalid > 0 {
            log::warn!(
                "journal {} held {} line(s) that were not valid UTF-8",
                self.path.display(),
                invalid
            );
        }
        Ok(lines)
    }

    fn len_hint(&self) -> Result<usize> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("journal lock poisoned"))?;
        Ok(split_lines(&self.read_locked()?).0.len())
    }
}

/// In-process journal with the same drain semantics.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    lines: Mutex<Vec<String>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventJournal for MemoryJournal {
    fn append_line(&self, line: &str) -> Result<()> {
        check_line(line)?;
        let mut lines = self
            .lines
            .lock()
            .map_err(|_| anyhow!("journal lock poisoned"))?;
        lines.push(line.to_string());
        Ok(())
    }

    fn drain_all(&self) -> Result<Vec<String>> {
        let mut lines = self
            .lines
            .lock()
            .map_err(|_| anyhow!("journal lock poisoned"))?;
        Ok(std::mem::take(&mut *lines)
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .collect())
    }

    fn len_hint(&self) -> Result<usize> {
        let lines = self
            .lines
            .lock()
            .map_err(|_| anyhow!("journal lock poisoned"))?;
        Ok(lines.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn draining_an_empty_journal_twice_is_harmless() -> Result<()> {
        let dir = tempdir()?;
        let journal = FileJournal::open(dir.path().join("logs").join("iva.log"))?;
        assert!(journal.drain_all()?.is_empty());
        assert!(journal.drain_all()?.is_empty());

        let memory = MemoryJournal::new();
        assert!(memory.drain_all()?.is_empty());
        assert!(memory.drain_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn drain_returns_lines_in_order_and_clears() -> Result<()> {
        let dir = tempdir()?;
        let journal = FileJournal::open(dir.path().join("iva.log"))?;
        journal.append_line("one")?;
        journal.append_line("two")?;
        assert_eq!(journal.len_hint()?, 2);
        assert_eq!(journal.drain_all()?, vec!["one", "two"]);
        assert_eq!(journal.len_hint()?, 0);
        journal.append_line("three")?;
        assert_eq!(journal.drain_all()?, vec!["three"]);
        Ok(())
    }

    #[test]
    fn invalid_utf8_line_does_not_wedge_the_drain() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("iva.log");
        let journal = FileJournal::open(&path)?;
        journal.append_line(r#"{"ok":1}"#)?;
        {
            let mut file = OpenOptions::new().append(true).open(&path)?;
            file.write_all(b"\xff\xfe garbage\n")?;
        }
        journal.append_line(r#"{"ok":2}"#)?;

        let drained = journal.drain_all()?;
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0], r#"{"ok":1}"#);
        assert!(serde_json::from_str::<serde_json::Value>(&drained[1]).is_err());
        assert_eq!(drained[2], r#"{"ok":2}"#);

        journal.append_line(r#"{"ok":3}"#)?;
        assert_eq!(journal.drain_all()?, vec![r#"{"ok":3}"#]);
        Ok(())
    }

    #[test]
    fn embedded_newlines_are_rejected() {
        let journal = MemoryJournal::new();
        assert!(journal.append_line("a\nb").is_err());
    }

    #[test]
    fn concurrent_writers_and_drainer_lose_nothing() -> Result<()> {
        let dir = tempdir()?;
        let journal = Arc::new(FileJournal::open(dir.path().join("iva.log"))?);
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let journal = journal.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        journal
                            .append_line(&format!("{{\"writer\":{},\"seq\":{}}}", w, i))
                            .unwrap();
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        while writers.iter().any(|h| !h.is_finished()) {
            drained.extend(journal.drain_all()?);
        }
        for h in writers {
            h.join().unwrap();
        }
        drained.extend(journal.drain_all()?);

        assert_eq!(drained.len(), 200);
        for line in &drained {
            let value: serde_json::Value = serde_json::from_str(line)?;
            assert!(value.get("seq").is_some());
        }
        Ok(())
    }
}
