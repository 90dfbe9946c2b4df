//! Peer lookup by pid.
//!
//! Each role's instance lock file records the pid of its holder, so finding
//! the peer means reading that file and checking the pid is alive. Closing
//! is a polite SIGTERM. Activating the main process raises its show request;
//! restyling another process's window has no portable equivalent here.

use log::{debug, info, warn};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use super::signals::{UnixSignals, lock_holder};
use crate::error::PlatformError;
use crate::model::ProcessRole;
use crate::platform::{NamedEvent, PeerWindow, PeerWindows, SignalBackend};
use crate::sync::{SHOW_EVENT, instance_mutex_name};

pub struct PidPeers {
    signals: UnixSignals,
}

impl PidPeers {
    pub fn new(signals: UnixSignals) -> Self {
        Self { signals }
    }

    fn holder(&self, role: ProcessRole) -> Option<i32> {
        lock_holder(&self.signals.lock_path(&instance_mutex_name(role)))
    }
}

impl PeerWindows for PidPeers {
    fn find(&self, role: ProcessRole) -> Option<PeerWindow> {
        let pid = self.holder(role)?;
        match kill(Pid::from_raw(pid), None) {
            Ok(()) => Some(PeerWindow(pid as isize)),
            Err(e) => {
                debug!("Recorded {} pid {} is not alive: {}", role.as_arg(), pid, e);
                None
            }
        }
    }

    fn activate(&self, window: PeerWindow) {
        if self.holder(ProcessRole::Main) != Some(window.0 as i32) {
            info!("No way to raise the window of pid {}", window.0);
            return;
        }
        let raised = self
            .signals
            .create_or_open_event(&SHOW_EVENT)
            .and_then(|event| event.raise());
        match raised {
            Ok(()) => debug!("Asked main pid {} to show its window", window.0),
            Err(e) => warn!("Failed to ask pid {} to show its window: {}", window.0, e),
        }
    }

    fn request_close(&self, window: PeerWindow) {
        if let Err(e) = kill(Pid::from_raw(window.0 as i32), Signal::SIGTERM) {
            warn!("Failed to signal pid {}: {}", window.0, e);
        }
    }

    fn apply_widget_chrome(&self, window: PeerWindow) -> Result<(), PlatformError> {
        debug!("Widget chrome for pid {} set through window attributes", window.0);
        Ok(())
    }
}
