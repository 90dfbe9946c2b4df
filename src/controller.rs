//! Command surface used by the UI layer.
//!
//! Every data command writes through `Storage` first and only then tells the
//! peer process to reload; a failed write never produces a notification.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::config::AppConfig;
use crate::dock::{DockEngine, DockPoller};
use crate::error::CommandError;
use crate::events::EventSink;
use crate::model::{
    AppEvent, CloseDecision, DockSide, DockState, ProcessRole, TodoItem, TodoSummary,
};
use crate::platform::{LoginItem, PeerWindows};
use crate::storage::Storage;
use crate::supervisor::ProcessSupervisor;

pub struct AppController {
    role: ProcessRole,
    storage: Arc<Storage>,
    supervisor: Arc<ProcessSupervisor>,
    dock: Arc<DockEngine>,
    peers: Arc<dyn PeerWindows>,
    login: Arc<dyn LoginItem>,
    sink: Arc<dyn EventSink>,
}

impl AppController {
    pub fn new(
        storage: Arc<Storage>,
        supervisor: Arc<ProcessSupervisor>,
        dock: Arc<DockEngine>,
        peers: Arc<dyn PeerWindows>,
        login: Arc<dyn LoginItem>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            role: supervisor.role(),
            storage,
            supervisor,
            dock,
            peers,
            login,
            sink,
        }
    }

    /// Starts listeners, the peer launch and (widget role) the dock poll.
    pub fn start(&self) -> Option<DockPoller> {
        let storage = Arc::clone(&self.storage);
        let sink = Arc::clone(&self.sink);
        self.supervisor.start(move || {
            debug!("Peer changed shared data, reloading");
            reload(&storage);
            sink.emit(AppEvent::DataChanged);
        });

        (self.role == ProcessRole::Ball).then(|| self.dock.start_polling())
    }

    pub fn role(&self) -> ProcessRole {
        self.role
    }

    pub fn todos(&self) -> Vec<TodoItem> {
        self.storage.todos()
    }

    pub fn summary(&self) -> TodoSummary {
        TodoSummary::from_todos(&self.storage.todos(), Utc::now())
    }

    /// Adds a todo. `due_date` is RFC 3339 or empty for none.
    pub fn add_todo(
        &self,
        title: &str,
        due_date: &str,
        reminder_days: u32,
    ) -> Result<TodoItem, CommandError> {
        let due = parse_due_date(due_date)?;
        let item = TodoItem::new(title.trim().to_string(), due, reminder_days);
        self.storage.add_todo(item.clone())?;
        info!("Added todo {}", item.id);
        self.after_write();
        Ok(item)
    }

    pub fn toggle_todo(&self, id: &str) -> Result<(), CommandError> {
        self.storage.toggle_todo(id)?;
        self.after_write();
        Ok(())
    }

    pub fn delete_todo(&self, id: &str) -> Result<(), CommandError> {
        self.storage.delete_todo(id)?;
        self.after_write();
        Ok(())
    }

    /// Configuration as on disk, with `start_on_boot` read from the OS.
    pub fn config(&self) -> AppConfig {
        if let Err(e) = self.storage.load_config() {
            warn!("Keeping cached configuration: {}", e);
        }
        let mut config = self.storage.config();
        match self.login.is_enabled() {
            Ok(enabled) => config.start_on_boot = enabled,
            Err(e) => debug!("Launch-at-login state unknown: {}", e),
        }
        config
    }

    /// Applies launch-at-login, then saves and broadcasts the config.
    pub fn update_config(&self, config: AppConfig) -> Result<(), CommandError> {
        let registered = self
            .login
            .is_enabled()
            .unwrap_or(!config.start_on_boot);
        if registered != config.start_on_boot {
            self.login
                .set_enabled(config.start_on_boot)
                .map_err(|e| CommandError::LoginItem(e.to_string()))?;
        }

        self.storage.update_config(config.clone())?;
        self.after_write();

        if self.role == ProcessRole::Main {
            if let Some((width, height)) = config.main_window_size() {
                self.sink.emit(AppEvent::ResizeMainWindow { width, height });
            }
        }
        Ok(())
    }

    pub fn dock_state(&self) -> DockState {
        self.dock.state()
    }

    pub fn check_docking(&self) -> Option<DockSide> {
        self.dock.check_docking()
    }

    pub fn dock(&self, side: DockSide) {
        if let Err(e) = self.dock.dock(side) {
            warn!("Dock to {} failed: {}", side.as_str(), e);
        }
    }

    pub fn undock(&self, side: DockSide) {
        if let Err(e) = self.dock.undock(side) {
            warn!("Undock from {} failed: {}", side.as_str(), e);
        }
    }

    /// Brings up the todo list window, starting the main process if needed.
    pub fn open_main(&self) {
        match self.role {
            ProcessRole::Main => self.sink.emit(AppEvent::ShowMainWindow),
            ProcessRole::Ball => match self.peers.find(ProcessRole::Main) {
                Some(window) => self.peers.activate(window),
                None => {
                    self.supervisor.launch(ProcessRole::Main);
                }
            },
        }
    }

    pub fn request_full_quit(&self) {
        self.supervisor.request_full_quit();
    }

    pub fn handle_close_request(&self) -> CloseDecision {
        self.supervisor.handle_close_request()
    }

    /// Tears down background work before the event loop exits.
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }

    fn after_write(&self) {
        self.sink.emit(AppEvent::DataChanged);
        if let Err(e) = self.supervisor.channel().notify_update() {
            warn!("Peer not notified: {}", e);
        }
    }
}

fn reload(storage: &Storage) {
    if let Err(e) = storage.load_todos() {
        warn!("Failed to reload todos: {}", e);
    }
    if let Err(e) = storage.load_config() {
        warn!("Failed to reload config: {}", e);
    }
}

fn parse_due_date(value: &str) -> Result<Option<DateTime<Utc>>, CommandError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|due| Some(due.with_timezone(&Utc)))
        .map_err(|source| CommandError::InvalidDueDate {
            value: value.to_string(),
            source,
        })
}
