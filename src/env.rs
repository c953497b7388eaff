//! The environment the writer performs its file system work through.
//!
//! Every directory listing, rename and delete the writer issues goes through an
//! [`Environment`], so tests can observe and interrupt the protocol at any step.
//! Operations are synchronous and single-attempt: an error is returned to the
//! writer as is and never retried.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use log::trace;

use crate::error::{Result, SnapshotError};

/// A task handed to [`Environment::spawn`].
pub type BackgroundTask = Box<dyn FnOnce() + Send + 'static>;

/// File system and thread operations consumed by the stream writer.
pub trait Environment: Send + Sync + 'static {
    /// File handle returned by [`Environment::create_file`].
    type WritableFile: Write + Send;

    /// File handle returned by [`Environment::open_file`].
    type ReadableFile: Read + Send;

    /// Creates `dir` and any missing parents. Succeeds if it already exists.
    fn create_dir_all(&self, dir: &Path) -> Result<()>;

    /// Returns the names of the entries in `dir`, in no particular order.
    fn list_children(&self, dir: &Path) -> Result<Vec<String>>;

    fn file_exists(&self, path: &Path) -> Result<bool>;

    /// Atomically and durably renames `from` to `to`, replacing `to` if it exists.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn delete_file(&self, path: &Path) -> Result<()>;

    /// Creates (or truncates) a file for writing.
    fn create_file(&self, path: &Path) -> Result<Self::WritableFile>;

    /// Flushes a file created by [`Environment::create_file`] and makes its contents durable.
    fn close_file(&self, file: Self::WritableFile) -> Result<()>;

    fn open_file(&self, path: &Path) -> Result<Self::ReadableFile>;

    /// Allocates a fresh, uniquely named file in `dir` and returns its path.
    ///
    /// `dir` must be on the same file system as the final destination so the
    /// file can later be renamed into place atomically.
    fn temp_file_path(&self, dir: &Path, prefix: &str) -> Result<PathBuf>;

    /// Runs `task` on a new named background thread.
    fn spawn(&self, name: &str, task: BackgroundTask) -> Result<JoinHandle<()>>;
}

/// [`Environment`] backed by the local file system and OS threads.
#[derive(Debug, Clone, Default)]
pub struct LocalEnvironment;

impl LocalEnvironment {
    pub fn new() -> Self {
        Self
    }
}

impl Environment for LocalEnvironment {
    type WritableFile = BufWriter<File>;
    type ReadableFile = BufReader<File>;

    fn create_dir_all(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        Ok(())
    }

    fn list_children(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            match name.into_string() {
                Ok(name) => names.push(name),
                Err(name) => {
                    return Err(SnapshotError::MalformedFileName {
                        filename: name.to_string_lossy().into_owned(),
                        prefix: String::new(),
                    })
                }
            }
        }
        Ok(names)
    }

    fn file_exists(&self, path: &Path) -> Result<bool> {
        match fs::metadata(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SnapshotError::Io(e)),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        trace!("Renaming {} to {}", from.display(), to.display());
        fs::rename(from, to)?;
        if let Some(directory) = to.parent() {
            sync_directory(directory)?;
        }
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        trace!("Deleting {}", path.display());
        fs::remove_file(path)?;
        Ok(())
    }

    fn create_file(&self, path: &Path) -> Result<Self::WritableFile> {
        Ok(BufWriter::new(File::create(path)?))
    }

    fn close_file(&self, file: Self::WritableFile) -> Result<()> {
        let file = file.into_inner().map_err(|e| SnapshotError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }

    fn open_file(&self, path: &Path) -> Result<Self::ReadableFile> {
        Ok(BufReader::new(File::open(path)?))
    }

    fn temp_file_path(&self, dir: &Path, prefix: &str) -> Result<PathBuf> {
        let temp_file = tempfile::Builder::new().prefix(prefix).tempfile_in(dir)?;
        temp_file
            .into_temp_path()
            .keep()
            .map_err(|e| SnapshotError::Io(e.error))
    }

    fn spawn(&self, name: &str, task: BackgroundTask) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new().name(name.to_string()).spawn(task)?;
        Ok(handle)
    }
}

/// Persists the directory entries of `directory`, so a rename into it survives power loss.
#[cfg(unix)]
fn sync_directory(directory: &Path) -> Result<()> {
    File::open(directory)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_directory: &Path) -> Result<()> {
    Ok(())
}
