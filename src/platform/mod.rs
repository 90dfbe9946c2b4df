//! Platform abstraction layer
//!
//! This module provides platform-specific implementations for:
//! - Named cross-process mutexes and auto-reset events
//! - Geometry of the floating widget window
//! - Locating, activating and closing the peer process's window
//! - Launch-at-login

use std::any::Any;
use std::time::Duration;

use crate::error::{GeometryUnavailable, PlatformError};
use crate::model::{MonitorInfo, ProcessRole, Rect};

#[cfg(unix)]
pub mod unix;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(test)]
pub(crate) mod memory;

// Re-export the current platform's modules
#[cfg(unix)]
pub use unix as current;

#[cfg(target_os = "windows")]
pub use windows as current;

/// Visibility of a named object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Machine-wide, across sessions.
    Global,
    /// Current user session only.
    Session,
}

/// Stable name of an OS-visible synchronization object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SignalName {
    scope: Scope,
    base: &'static str,
}

impl SignalName {
    pub const fn global(base: &'static str) -> Self {
        Self {
            scope: Scope::Global,
            base,
        }
    }

    pub const fn session(base: &'static str) -> Self {
        Self {
            scope: Scope::Session,
            base,
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn base(&self) -> &'static str {
        self.base
    }

    /// Kernel object namespace form, e.g. `Global\TodoBallMainMutex_v2`.
    pub fn qualified(&self) -> String {
        let prefix = match self.scope {
            Scope::Global => "Global",
            Scope::Session => "Local",
        };
        format!("{}\\{}", prefix, self.base)
    }
}

impl std::fmt::Display for SignalName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// Outcome of a successful wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    Signaled,
    TimedOut,
}

/// Open handle to a named mutex. Dropping it releases the handle.
pub struct MutexHandle(#[allow(dead_code)] Box<dyn Any + Send>);

impl MutexHandle {
    pub fn new<T: Send + 'static>(inner: T) -> Self {
        Self(Box::new(inner))
    }
}

pub struct MutexClaim {
    pub handle: MutexHandle,
    /// Another holder had the name open before this call.
    pub already_existed: bool,
}

/// Open handle to a named auto-reset event. Dropping it releases the handle.
pub trait NamedEvent: Send {
    /// Fires the event; one current or next waiter wakes, then it resets.
    fn raise(&self) -> Result<(), PlatformError>;

    /// Blocks until raised or until `timeout` elapses (`None` waits forever).
    fn wait(&self, timeout: Option<Duration>) -> Result<WaitStatus, PlatformError>;
}

/// Factory for named objects shared by unrelated processes.
pub trait SignalBackend: Send + Sync {
    fn create_or_open_mutex(&self, name: &SignalName) -> Result<MutexClaim, PlatformError>;

    /// Idempotent: every caller with the same name gets the same underlying event.
    fn create_or_open_event(&self, name: &SignalName) -> Result<Box<dyn NamedEvent>, PlatformError>;
}

/// The floating widget's own window, as seen by the docking engine.
pub trait WidgetSurface: Send + Sync {
    fn window_rect(&self) -> Result<Rect, GeometryUnavailable>;

    fn monitor(&self) -> Result<MonitorInfo, GeometryUnavailable>;

    fn set_bounds(&self, bounds: Rect) -> Result<(), GeometryUnavailable>;

    /// Primary pointer button currently held (a drag may be in progress).
    fn primary_button_down(&self) -> bool;
}

/// Opaque window identifier, valid only for the call that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerWindow(pub(crate) isize);

/// Window finder and chrome for windows owned by either role.
pub trait PeerWindows: Send + Sync {
    fn find(&self, role: ProcessRole) -> Option<PeerWindow>;

    /// Restore and bring to the foreground.
    fn activate(&self, window: PeerWindow);

    /// Ask the owning process to close the window.
    fn request_close(&self, window: PeerWindow);

    /// Frameless, hidden from the taskbar, always on top.
    fn apply_widget_chrome(&self, window: PeerWindow) -> Result<(), PlatformError>;
}

/// OS auto-start registration.
pub trait LoginItem: Send + Sync {
    fn set_enabled(&self, enabled: bool) -> anyhow::Result<()>;

    fn is_enabled(&self) -> anyhow::Result<bool>;
}
