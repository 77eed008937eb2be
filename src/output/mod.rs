//! Atomic, crash-safe persistence into episode workspaces.
//!
//! Each file is written to a temporary file in the destination directory
//! and renamed into place, so a partially written file is never visible.
//! Existing files get a single timestamped backup before overwrite. One
//! file failing never aborts the rest of the batch.

use crate::error::{NotesError, Result};
use chrono::Utc;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// One file to write into the workspace.
#[derive(Debug, Clone)]
pub struct OutputFile {
    /// File name within the workspace (no path separators).
    pub name: String,
    /// Full file contents.
    pub contents: String,
}

impl OutputFile {
    pub fn new(name: &str, contents: String) -> Self {
        Self {
            name: name.to_string(),
            contents,
        }
    }
}

/// A per-file write failure.
#[derive(Debug, Clone)]
pub struct FileWriteError {
    pub name: String,
    pub reason: String,
}

/// Outcome of a batch write.
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Files now present in the workspace.
    pub written: Vec<String>,
    /// (file, backup) pairs for files that were overwritten.
    pub backed_up: Vec<(String, String)>,
    /// Files that failed; their prior state is untouched.
    pub failed: Vec<FileWriteError>,
}

impl WriteReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Atomic workspace writer.
pub struct OutputWriter;

impl OutputWriter {
    /// Write a batch of files into the workspace directory.
    ///
    /// Every file is attempted; failures are reported per file rather than
    /// aborting the batch.
    pub fn write_batch(workspace: &Path, files: &[OutputFile]) -> Result<WriteReport> {
        std::fs::create_dir_all(workspace)?;

        let mut report = WriteReport::default();

        for file in files {
            match Self::write_one(workspace, file) {
                Ok(backup) => {
                    debug!("Wrote {}", file.name);
                    if let Some(backup_name) = backup {
                        report.backed_up.push((file.name.clone(), backup_name));
                    }
                    report.written.push(file.name.clone());
                }
                Err(e) => {
                    warn!("Failed to write {}: {}", file.name, e);
                    report.failed.push(FileWriteError {
                        name: file.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Wrote {}/{} files to {:?}",
            report.written.len(),
            files.len(),
            workspace
        );

        Ok(report)
    }

    /// Write one file atomically. Returns the backup file name if the
    /// destination existed.
    fn write_one(workspace: &Path, file: &OutputFile) -> Result<Option<String>> {
        if file.name.is_empty() || file.name.contains(['/', '\\']) {
            return Err(NotesError::OutputWrite {
                file: file.name.clone(),
                reason: "invalid file name".to_string(),
            });
        }

        let dest = workspace.join(&file.name);

        let mut temp = tempfile::NamedTempFile::new_in(workspace).map_err(|e| {
            NotesError::OutputWrite {
                file: file.name.clone(),
                reason: format!("temp file: {}", e),
            }
        })?;
        temp.write_all(file.contents.as_bytes())
            .and_then(|_| temp.flush())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| NotesError::OutputWrite {
                file: file.name.clone(),
                reason: format!("write: {}", e),
            })?;

        let backup = if dest.exists() {
            let backup_name = format!("{}.{}.bak", file.name, Utc::now().format("%Y%m%dT%H%M%S"));
            std::fs::rename(&dest, workspace.join(&backup_name)).map_err(|e| {
                NotesError::OutputWrite {
                    file: file.name.clone(),
                    reason: format!("backup: {}", e),
                }
            })?;
            Some(backup_name)
        } else {
            None
        };

        temp.persist(&dest).map_err(|e| NotesError::OutputWrite {
            file: file.name.clone(),
            reason: format!("rename: {}", e),
        })?;

        Ok(backup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_batch() {
        let dir = tempfile::tempdir().unwrap();

        let files = vec![
            OutputFile::new("summary.md", "# Summary".to_string()),
            OutputFile::new("quotes.md", "# Quotes".to_string()),
        ];
        let report = OutputWriter::write_batch(dir.path(), &files).unwrap();

        assert!(report.all_succeeded());
        assert_eq!(report.written, vec!["summary.md", "quotes.md"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("summary.md")).unwrap(),
            "# Summary"
        );
    }

    #[test]
    fn test_one_failure_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();

        let files = vec![
            OutputFile::new("good.md", "ok".to_string()),
            OutputFile::new("bad/name.md", "nope".to_string()),
            OutputFile::new("also-good.md", "ok".to_string()),
        ];
        let report = OutputWriter::write_batch(dir.path(), &files).unwrap();

        assert_eq!(report.written, vec!["good.md", "also-good.md"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "bad/name.md");
        assert!(dir.path().join("good.md").exists());
        assert!(dir.path().join("also-good.md").exists());
        assert!(!dir.path().join("bad").exists());
    }

    #[test]
    fn test_overwrite_creates_backup() {
        let dir = tempfile::tempdir().unwrap();

        let first = vec![OutputFile::new("notes.md", "old contents".to_string())];
        OutputWriter::write_batch(dir.path(), &first).unwrap();

        let second = vec![OutputFile::new("notes.md", "new contents".to_string())];
        let report = OutputWriter::write_batch(dir.path(), &second).unwrap();

        assert_eq!(report.backed_up.len(), 1);
        let (name, backup) = &report.backed_up[0];
        assert_eq!(name, "notes.md");
        assert!(backup.starts_with("notes.md.") && backup.ends_with(".bak"));

        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes.md")).unwrap(),
            "new contents"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join(backup)).unwrap(),
            "old contents"
        );
    }

    #[test]
    fn test_fresh_write_has_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let report = OutputWriter::write_batch(
            dir.path(),
            &[OutputFile::new("new.md", "x".to_string())],
        )
        .unwrap();
        assert!(report.backed_up.is_empty());
    }
}
