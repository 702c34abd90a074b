// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Default)]
struct MockState {
    entries: HashMap<PathBuf, MockEntry>,
    fail_writes: bool,
    fail_removes: bool,
    /// Every successful removal, in order. Lets tests assert "exactly once".
    removed: Vec<PathBuf>,
}

/// In-memory filesystem with failure injection.
///
/// Clones share the same state, so a test can keep one handle and give
/// another to the code under test.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut state = self.state.lock().unwrap();
        state
            .entries
            .insert(path.as_ref().to_path_buf(), MockEntry::File(content.into()));
    }

    /// Make every subsequent `write` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Make every subsequent `remove_file` fail (the file stays in place).
    pub fn fail_removes(&self, fail: bool) {
        self.state.lock().unwrap().fail_removes = fail;
    }

    /// Paths of all files currently stored.
    pub fn files(&self) -> Vec<PathBuf> {
        let state = self.state.lock().unwrap();
        let mut files: Vec<_> = state
            .entries
            .iter()
            .filter(|(_, e)| matches!(e, MockEntry::File(_)))
            .map(|(p, _)| p.clone())
            .collect();
        files.sort();
        files
    }

    /// Files under `dir`.
    pub fn files_in(&self, dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let dir = dir.as_ref();
        self.files()
            .into_iter()
            .filter(|p| p.parent() == Some(dir))
            .collect()
    }

    /// Successful removals so far, in order.
    pub fn removed(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().removed.clone()
    }

    /// Number of distinct paths removed more than once.
    pub fn double_removals(&self) -> usize {
        let removed = self.removed();
        let unique: HashSet<_> = removed.iter().collect();
        removed.len() - unique.len()
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.state.lock().unwrap();
        match state.entries.get(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(anyhow!("injected write failure: {:?}", path));
        }
        state
            .entries
            .insert(path.to_path_buf(), MockEntry::File(contents.to_vec()));
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for dir in path.ancestors() {
            if dir.as_os_str().is_empty() {
                continue;
            }
            state.entries.entry(dir.to_path_buf()).or_insert(MockEntry::Dir);
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.fail_removes {
            return Err(anyhow!("injected remove failure: {:?}", path));
        }
        match state.entries.get(path) {
            Some(MockEntry::File(_)) => {
                state.entries.remove(path);
                state.removed.push(path.to_path_buf());
                Ok(true)
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Ok(false),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        state.entries.contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        matches!(state.entries.get(path), Some(MockEntry::File(_)))
    }
}
