// Copyright 2024
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Utilities shared by the stream writer tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Mutex;
use std::thread::JoinHandle;

use bytes::Bytes;

use crate::env::{BackgroundTask, Environment, LocalEnvironment};
use crate::error::{Result, SnapshotError};
use crate::paths::StreamPaths;
use crate::source::{RecordSource, SourcePiece, VecRecordSource};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A file system operation issued through [`FaultyEnvironment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateDir,
    Rename,
    Delete,
    CreateFile,
    CloseFile,
    TempFile,
}

/// Decides whether mutation number `n` (counting from 0) should fail.
pub type FaultPlan = Box<dyn Fn(usize, Operation, &Path) -> bool + Send + Sync>;

/// A [`LocalEnvironment`] that records every mutation and can simulate a crash.
///
/// Once the plan selects a mutation, that mutation and every later one fail
/// without touching the disk, as if the process had died at that point.
pub struct FaultyEnvironment {
    inner: LocalEnvironment,
    plan: Option<FaultPlan>,
    mutations: AtomicUsize,
    crashed: AtomicBool,
    log: Mutex<Vec<(Operation, PathBuf)>>,
}

impl FaultyEnvironment {
    /// Never fails; only records operations.
    pub fn recording() -> Self {
        Self {
            inner: LocalEnvironment::new(),
            plan: None,
            mutations: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_plan(plan: FaultPlan) -> Self {
        Self {
            plan: Some(plan),
            ..Self::recording()
        }
    }

    /// Crashes at mutation number `n`.
    pub fn crash_at(n: usize) -> Self {
        Self::with_plan(Box::new(move |index: usize, _: Operation, _: &Path| index == n))
    }

    /// Crashes on the first `operation` whose path ends with `suffix`.
    pub fn crash_on(operation: Operation, suffix: &'static str) -> Self {
        Self::with_plan(Box::new(move |_: usize, op: Operation, path: &Path| {
            op == operation && path.ends_with(suffix)
        }))
    }

    /// Never fails, but pauses inside close number `close_index` (counting from 0).
    ///
    /// It signals `reached` and waits for `release`, which lets a test act after
    /// a chunk's records are written and before the writer decides to commit it.
    pub fn pause_at_close(close_index: usize, reached: Sender<()>, release: Receiver<()>) -> Self {
        let closes = AtomicUsize::new(0);
        let channels = Mutex::new((reached, release));
        Self::with_plan(Box::new(move |_: usize, op: Operation, _: &Path| {
            if op == Operation::CloseFile && closes.fetch_add(1, Ordering::SeqCst) == close_index {
                let channels = channels.lock().unwrap();
                let _ = channels.0.send(());
                let _ = channels.1.recv();
            }
            false
        }))
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Mutations that reached the disk, in order.
    pub fn operations(&self) -> Vec<(Operation, PathBuf)> {
        self.log.lock().unwrap().clone()
    }

    fn check(&self, operation: Operation, path: &Path) -> Result<()> {
        let index = self.mutations.fetch_add(1, Ordering::SeqCst);
        let selected = self
            .plan
            .as_ref()
            .map_or(false, |plan| plan(index, operation, path));
        if selected {
            self.crashed.store(true, Ordering::SeqCst);
        }
        if self.crashed() {
            return Err(SnapshotError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected crash at {:?} {}", operation, path.display()),
            )));
        }
        self.log
            .lock()
            .unwrap()
            .push((operation, path.to_path_buf()));
        Ok(())
    }
}

impl Environment for FaultyEnvironment {
    type WritableFile = <LocalEnvironment as Environment>::WritableFile;
    type ReadableFile = <LocalEnvironment as Environment>::ReadableFile;

    fn create_dir_all(&self, dir: &Path) -> Result<()> {
        self.check(Operation::CreateDir, dir)?;
        self.inner.create_dir_all(dir)
    }

    fn list_children(&self, dir: &Path) -> Result<Vec<String>> {
        self.inner.list_children(dir)
    }

    fn file_exists(&self, path: &Path) -> Result<bool> {
        self.inner.file_exists(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.check(Operation::Rename, from)?;
        self.inner.rename(from, to)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        self.check(Operation::Delete, path)?;
        self.inner.delete_file(path)
    }

    fn create_file(&self, path: &Path) -> Result<Self::WritableFile> {
        self.check(Operation::CreateFile, path)?;
        self.inner.create_file(path)
    }

    fn close_file(&self, file: Self::WritableFile) -> Result<()> {
        self.check(Operation::CloseFile, Path::new(""))?;
        self.inner.close_file(file)
    }

    fn open_file(&self, path: &Path) -> Result<Self::ReadableFile> {
        self.inner.open_file(path)
    }

    fn temp_file_path(&self, dir: &Path, prefix: &str) -> Result<PathBuf> {
        self.check(Operation::TempFile, &dir.join(prefix))?;
        self.inner.temp_file_path(dir, prefix)
    }

    fn spawn(&self, name: &str, task: BackgroundTask) -> Result<JoinHandle<()>> {
        self.inner.spawn(name, task)
    }
}

/// A source that pauses before producing record `block_at`.
///
/// It signals `reached` and waits for `release` before continuing, which lets a
/// test act while the writer is in the middle of a chunk.
pub struct BlockingSource {
    inner: VecRecordSource,
    block_at: usize,
    reached: Sender<()>,
    release: Receiver<()>,
}

impl BlockingSource {
    pub fn new(
        inner: VecRecordSource,
        block_at: usize,
        reached: Sender<()>,
        release: Receiver<()>,
    ) -> Self {
        Self {
            inner,
            block_at,
            reached,
            release,
        }
    }
}

impl RecordSource for BlockingSource {
    fn next_record(&mut self) -> Result<SourcePiece> {
        if self.inner.position() == self.block_at {
            let _ = self.reached.send(());
            let _ = self.release.recv();
        }
        self.inner.next_record()
    }

    fn save_state(&mut self) -> Result<Bytes> {
        self.inner.save_state()
    }

    fn restore_state(&mut self, state: Bytes) -> Result<()> {
        self.inner.restore_state(state)
    }
}

/// A source that fails when asked for record `fail_at`.
pub struct FailingSource {
    inner: VecRecordSource,
    fail_at: usize,
}

impl FailingSource {
    pub fn new(inner: VecRecordSource, fail_at: usize) -> Self {
        Self { inner, fail_at }
    }
}

impl RecordSource for FailingSource {
    fn next_record(&mut self) -> Result<SourcePiece> {
        if self.inner.position() == self.fail_at {
            return Err(SnapshotError::source_error("upstream iterator broke"));
        }
        self.inner.next_record()
    }

    fn save_state(&mut self) -> Result<Bytes> {
        self.inner.save_state()
    }

    fn restore_state(&mut self, state: Bytes) -> Result<()> {
        self.inner.restore_state(state)
    }
}

/// Splits `records` into chunks the way the writer does for `max_chunk_size_bytes`.
pub fn expected_chunks(records: &[Vec<u8>], max_chunk_size_bytes: u64) -> Vec<Vec<Vec<u8>>> {
    let mut chunks = Vec::new();
    let mut remaining = records.iter();
    loop {
        let mut chunk = Vec::new();
        let mut size = 0u64;
        let mut end_of_input = false;
        while size < max_chunk_size_bytes {
            match remaining.next() {
                Some(record) => {
                    size += record.len() as u64;
                    chunk.push(record.clone());
                }
                None => {
                    end_of_input = true;
                    break;
                }
            }
        }
        chunks.push(chunk);
        if end_of_input {
            return chunks;
        }
    }
}

/// Sorted names of the files in `dir`; empty if it does not exist.
pub fn list_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

/// Asserts that every committed chunk is attested by a checkpoint, except the
/// chunk that observed the end of input.
pub fn assert_commits_attested(paths: &StreamPaths) {
    let latest_checkpoint = list_names(paths.checkpoints_directory())
        .iter()
        .map(|name| crate::file_index::file_index(name, "checkpoint").unwrap())
        .max();
    let mut unattested: Vec<u64> = committed_indices(paths)
        .into_iter()
        .filter(|index| latest_checkpoint.map_or(true, |k| *index > k))
        .collect();
    if paths.done_file_path().exists() {
        unattested.pop();
    }
    assert!(
        unattested.is_empty(),
        "chunks {:?} committed past checkpoint {:?}",
        unattested,
        latest_checkpoint
    );
}

/// Indices of the committed chunks of a stream, ascending.
pub fn committed_indices(paths: &StreamPaths) -> Vec<u64> {
    let mut indices: Vec<u64> = list_names(paths.committed_chunks_directory())
        .iter()
        .map(|name| crate::file_index::file_index(name, "chunk").unwrap())
        .collect();
    indices.sort_unstable();
    indices
}

pub fn records(values: &[&str]) -> Vec<Vec<u8>> {
    values.iter().map(|v| v.as_bytes().to_vec()).collect()
}
