use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Longest slice of pid file content quoted back in corruption details.
const CONTENT_PREVIEW_LEN: usize = 40;

/// Classified content of a pid file.
///
/// Reading a pid file never fails at the API level. Anything that prevents
/// extracting a usable pid, including an unreadable file, is reported as
/// [`Corrupt`](PidFileRecord::Corrupt) and handled by the status engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PidFileRecord {
    /// No pid file exists at the configured path.
    Absent,
    /// A file exists but does not hold a single positive decimal number.
    /// The payload describes what was found.
    Corrupt(String),
    /// The file holds a well-formed pid.
    Valid(u32),
}

/// Reads and maintains the pid file for one server.
///
/// The accepted format is a single decimal number, optionally surrounded by
/// whitespace, which is what servers conventionally write on startup. A sign
/// prefix, trailing text, or an empty file all classify as corrupt rather
/// than being coerced.
///
/// # Examples
///
/// ```
/// use serverctl::status::{PidFileRecord, PidFileStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = PidFileStore::new(dir.path().join("server.pid"));
///
/// assert_eq!(store.read(), PidFileRecord::Absent);
///
/// store.write(4242).unwrap();
/// assert_eq!(store.read(), PidFileRecord::Valid(4242));
/// ```
#[derive(Debug, Clone)]
pub struct PidFileStore {
    path: PathBuf,
}

impl PidFileStore {
    /// Creates a store for the pid file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the pid file this store manages.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and classifies the pid file.
    ///
    /// A missing file is [`PidFileRecord::Absent`]. A present but unreadable
    /// file is treated as corrupt, since a file we cannot inspect cannot
    /// vouch for a running server.
    pub fn read(&self) -> PidFileRecord {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return PidFileRecord::Absent,
            Err(e) => {
                return PidFileRecord::Corrupt(format!("pid file is unreadable: {}", e));
            }
        };

        classify(&content)
    }

    /// Writes `pid` to the pid file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PidFileWrite`] if the directory cannot be created or
    /// the file cannot be written.
    pub fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::PidFileWrite {
                path: self.path.clone(),
                source: e,
            })?;
        }

        std::fs::write(&self.path, format!("{}\n", pid)).map_err(|e| Error::PidFileWrite {
            path: self.path.clone(),
            source: e,
        })?;

        tracing::debug!(path = %self.path.display(), pid, "Wrote pid file");
        Ok(())
    }

    /// Removes the pid file. A file that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PidFileCleanup`] if the file exists but cannot be
    /// removed, for example due to permissions. Callers must treat this as
    /// fatal: a corrupt pid file that survives cleanup would keep poisoning
    /// every future status check.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed pid file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::PidFileCleanup {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

/// Applies the strict pid format: optional surrounding whitespace around a
/// single run of ASCII digits, parsed as a non-zero `u32`.
fn classify(content: &str) -> PidFileRecord {
    let trimmed = content.trim();

    if trimmed.is_empty() {
        return PidFileRecord::Corrupt("pid file is empty".to_string());
    }

    // A sign prefix or embedded text must not slip through via the integer
    // parser's leniency, so check the characters before parsing.
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return PidFileRecord::Corrupt(format!(
            "pid file does not contain a number: {:?}",
            preview(trimmed)
        ));
    }

    match trimmed.parse::<u32>() {
        Ok(0) => PidFileRecord::Corrupt("pid file contains pid 0".to_string()),
        Ok(pid) => PidFileRecord::Valid(pid),
        Err(_) => PidFileRecord::Corrupt(format!("pid value out of range: {}", preview(trimmed))),
    }
}

fn preview(content: &str) -> &str {
    match content.char_indices().nth(CONTENT_PREVIEW_LEN) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}
