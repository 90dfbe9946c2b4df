//! JSON-file store for the todo list and the configuration.
//!
//! Both processes open their own `Storage` over the same directory. Every
//! mutation is written to disk before it becomes visible in memory, so a
//! failed write leaves the in-memory state untouched and the caller gets an
//! error instead of a phantom change.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{AppConfig, CONFIG_FILE, TODOS_FILE};
use crate::error::StorageError;
use crate::model::TodoItem;

// The peer may be mid-write when we read; give it a moment.
const READ_ATTEMPTS: usize = 5;
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Default)]
struct StoreState {
    todos: Vec<TodoItem>,
    config: AppConfig,
}

pub struct Storage {
    dir: PathBuf,
    state: RwLock<StoreState>,
}

impl Storage {
    /// Opens the store rooted at `dir`, creating the directory if needed.
    /// Unreadable files are logged and replaced by defaults in memory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;

        let storage = Self {
            dir,
            state: RwLock::new(StoreState::default()),
        };
        if let Err(e) = storage.load_config() {
            warn!("Using default configuration: {}", e);
        }
        if let Err(e) = storage.load_todos() {
            warn!("Starting with an empty todo list: {}", e);
        }
        Ok(storage)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Re-reads the todo file. A missing file leaves the list as it is.
    pub fn load_todos(&self) -> Result<(), StorageError> {
        let path = self.dir.join(TODOS_FILE);
        if let Some(todos) = read_json::<Vec<TodoItem>>(&path)? {
            self.write_state().todos = todos;
        }
        Ok(())
    }

    /// Re-reads the config file. A missing file leaves the config as it is.
    pub fn load_config(&self) -> Result<(), StorageError> {
        let path = self.dir.join(CONFIG_FILE);
        if let Some(config) = read_json::<AppConfig>(&path)? {
            self.write_state().config = config;
        }
        Ok(())
    }

    pub fn todos(&self) -> Vec<TodoItem> {
        self.read_state().todos.clone()
    }

    pub fn config(&self) -> AppConfig {
        self.read_state().config.clone()
    }

    pub fn add_todo(&self, item: TodoItem) -> Result<(), StorageError> {
        self.mutate_todos(|todos| {
            todos.push(item);
            Ok(())
        })
    }

    /// Flips `completed`, stamping or clearing `completed_at`.
    pub fn toggle_todo(&self, id: &str) -> Result<(), StorageError> {
        self.mutate_todos(|todos| {
            let todo = todos
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
            todo.completed = !todo.completed;
            todo.completed_at = todo.completed.then(Utc::now);
            Ok(())
        })
    }

    pub fn delete_todo(&self, id: &str) -> Result<(), StorageError> {
        self.mutate_todos(|todos| {
            let before = todos.len();
            todos.retain(|t| t.id != id);
            if todos.len() == before {
                return Err(StorageError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }

    pub fn update_config(&self, config: AppConfig) -> Result<(), StorageError> {
        let mut state = self.write_state();
        write_json(&self.dir.join(CONFIG_FILE), &config)?;
        state.config = config;
        Ok(())
    }

    fn mutate_todos<F>(&self, change: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Vec<TodoItem>) -> Result<(), StorageError>,
    {
        let mut state = self.write_state();
        let mut todos = state.todos.clone();
        change(&mut todos)?;
        write_json(&self.dir.join(TODOS_FILE), &todos)?;
        state.todos = todos;
        Ok(())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }

    let mut last_err = None;
    for attempt in 0..READ_ATTEMPTS {
        match fs::read(path) {
            Ok(bytes) => {
                return serde_json::from_slice(&bytes)
                    .map(Some)
                    .map_err(|source| StorageError::Json {
                        path: path.to_path_buf(),
                        source,
                    });
            }
            Err(e) => {
                debug!("Read of {:?} failed (attempt {}): {}", path, attempt + 1, e);
                last_err = Some(e);
                thread::sleep(READ_RETRY_DELAY);
            }
        }
    }

    Err(StorageError::Io {
        path: path.to_path_buf(),
        source: last_err.unwrap_or_else(|| std::io::Error::other("read failed")),
    })
}

/// Whole-file replacement through a sibling temp file.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let data = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{}.{}.tmp", file_name, std::process::id()));

    let io_err = |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, &data).map_err(io_err)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(e));
    }
    Ok(())
}
