//! Session directories and append-only session logs
//!
//! This module handles the server-side bookkeeping of registered sessions:
//! - Mapping a registering user to a session directory under the log root
//! - Allocating the first unused numbered log file in that directory
//! - Appending log records with a flush after every write
//! - Mirroring every record into additional roots when configured
//!
//! A session directory that already exists is reused; a returning user just
//! gets the next free file number.

use log::{debug, info};
use shared::log_format::to_log_record;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Filesystem problems while setting up or writing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The registered user name cannot be used as a single directory name.
    #[error("user name {0:?} cannot be used as a session directory")]
    InvalidUserName(String),

    /// Any filesystem failure other than an already existing directory.
    #[error("filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    fn filesystem(path: &Path, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Derives the session identifier for a user name.
///
/// The identifier is the user name itself, as long as it is a single normal
/// path component.
pub fn session_id(user_name: &str) -> Result<String, SessionError> {
    let invalid = user_name.is_empty()
        || user_name == "."
        || user_name == ".."
        || user_name.contains(['/', '\\', '\0']);

    if invalid {
        Err(SessionError::InvalidUserName(user_name.to_string()))
    } else {
        Ok(user_name.to_string())
    }
}

/// Returns the smallest `n` such that `<dir>/<n>.txt` does not exist.
pub async fn next_log_index(dir: &Path) -> Result<u32, SessionError> {
    let mut index = 0;
    loop {
        let candidate = log_path(dir, index);
        let exists = fs::try_exists(&candidate)
            .await
            .map_err(|e| SessionError::filesystem(&candidate, e))?;
        if !exists {
            return Ok(index);
        }
        index += 1;
    }
}

fn log_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("{}.txt", index))
}

/// Creates a directory, treating "already exists" as success.
async fn ensure_dir(dir: &Path) -> Result<(), SessionError> {
    match fs::create_dir(dir).await {
        Ok(()) => {
            debug!("Created directory {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            debug!("Directory {} already exists", dir.display());
            Ok(())
        }
        Err(e) => Err(SessionError::filesystem(dir, e)),
    }
}

/// An open session log, one file per configured root
#[derive(Debug)]
pub struct SessionLog {
    /// Session identifier (the registered user name)
    session_id: String,
    /// Number of the log file within the session directory
    index: u32,
    /// Primary path first, then one per mirror root
    paths: Vec<PathBuf>,
    files: Vec<File>,
    /// Records appended so far
    records: u64,
}

impl SessionLog {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Path of the log under the primary root.
    pub fn path(&self) -> &Path {
        &self.paths[0]
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Appends one message as a newline-terminated record to every copy of
    /// the log and flushes each file.
    pub async fn append(&mut self, message: &str) -> Result<(), SessionError> {
        let record = to_log_record(message);

        for (file, path) in self.files.iter_mut().zip(&self.paths) {
            file.write_all(record.as_bytes())
                .await
                .map_err(|e| SessionError::filesystem(path, e))?;
            file.flush()
                .await
                .map_err(|e| SessionError::filesystem(path, e))?;
        }

        self.records += 1;
        Ok(())
    }

    /// Flushes and closes every copy of the log.
    pub async fn close(mut self) -> Result<u64, SessionError> {
        for (file, path) in self.files.iter_mut().zip(&self.paths) {
            file.flush()
                .await
                .map_err(|e| SessionError::filesystem(path, e))?;
        }
        info!(
            "Closed session log {} ({} records)",
            self.path().display(),
            self.records
        );
        Ok(self.records)
    }
}

/// Allocates session logs under a primary root and optional mirror roots.
///
/// The file number is always chosen from the primary root so that every
/// mirror holds the same `<session-id>/<n>.txt` layout.
#[derive(Debug, Clone)]
pub struct SessionManager {
    root: PathBuf,
    mirrors: Vec<PathBuf>,
}

impl SessionManager {
    pub fn new(root: impl Into<PathBuf>, mirrors: Vec<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mirrors,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens a fresh log for a registering user.
    ///
    /// Creates the roots and the session directory as needed, picks the first
    /// unused file number and opens that file for appending in every root.
    pub async fn open_session(&self, user_name: &str) -> Result<SessionLog, SessionError> {
        let session_id = session_id(user_name)?;

        let primary_dir = self.root.join(&session_id);
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| SessionError::filesystem(&self.root, e))?;
        ensure_dir(&primary_dir).await?;
        let index = next_log_index(&primary_dir).await?;

        let mut paths = vec![log_path(&primary_dir, index)];
        for mirror in &self.mirrors {
            let dir = mirror.join(&session_id);
            fs::create_dir_all(mirror)
                .await
                .map_err(|e| SessionError::filesystem(mirror, e))?;
            ensure_dir(&dir).await?;
            paths.push(log_path(&dir, index));
        }

        let mut files = Vec::with_capacity(paths.len());
        for path in &paths {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(|e| SessionError::filesystem(path, e))?;
            files.push(file);
        }

        info!("Session {} logging to {}", session_id, paths[0].display());

        Ok(SessionLog {
            session_id,
            index,
            paths,
            files,
            records: 0,
        })
    }
}
