//! Payload-free notification bus between the two processes.
//!
//! `update` means "the shared files changed, re-read them"; `quit` means
//! "the whole application is shutting down"; `show` asks the main process to
//! bring its window back. None carries data and all
//! coalesce: several raises before a wait are observed as one wake.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace, warn};

use super::{QUIT_EVENT, SHOW_EVENT, UPDATE_EVENT};
use crate::error::PlatformError;
use crate::platform::{NamedEvent, SignalBackend, SignalName, WaitStatus};

/// Listeners wait in slices so a stop request is noticed promptly.
const WAIT_SLICE: Duration = Duration::from_millis(250);
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
/// Consecutive wait failures after which the event handle is reopened.
const REOPEN_AFTER: u32 = 5;
const PAUSE_STEP: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuitStatus {
    Signaled,
    NotSignaled,
}

#[derive(Clone)]
pub struct UpdateChannel {
    backend: Arc<dyn SignalBackend>,
}

impl UpdateChannel {
    pub fn new(backend: Arc<dyn SignalBackend>) -> Self {
        Self { backend }
    }

    /// Runs `on_wake` on a background thread every time the peer raises
    /// `update`. The event is opened before this returns, so raises issued
    /// afterwards are never missed.
    pub fn listen_for_updates<F>(&self, mut on_wake: F) -> SignalListener
    where
        F: FnMut() + Send + 'static,
    {
        SignalListener::spawn(self.backend.clone(), UPDATE_EVENT, move || {
            on_wake();
            ControlFlow::Continue(())
        })
    }

    /// Raises `update` once through a short-lived handle. Lost if nobody
    /// holds the event open.
    pub fn notify_update(&self) -> Result<(), PlatformError> {
        self.raise(&UPDATE_EVENT)
    }

    /// Runs `on_quit` once, the first time the peer raises `quit`, then stops.
    pub fn listen_for_quit<F>(&self, on_quit: F) -> SignalListener
    where
        F: FnOnce() + Send + 'static,
    {
        let mut on_quit = Some(on_quit);
        SignalListener::spawn(self.backend.clone(), QUIT_EVENT, move || {
            if let Some(on_quit) = on_quit.take() {
                on_quit();
            }
            ControlFlow::Break(())
        })
    }

    pub fn raise_quit(&self) -> Result<(), PlatformError> {
        self.raise(&QUIT_EVENT)
    }

    /// Runs `on_show` every time a peer asks for the main window.
    pub fn listen_for_show<F>(&self, mut on_show: F) -> SignalListener
    where
        F: FnMut() + Send + 'static,
    {
        SignalListener::spawn(self.backend.clone(), SHOW_EVENT, move || {
            on_show();
            ControlFlow::Continue(())
        })
    }

    pub fn raise_show(&self) -> Result<(), PlatformError> {
        self.raise(&SHOW_EVENT)
    }

    /// Zero-timeout check of `quit`. Consumes the pending raise if there is one.
    pub fn check_quit_now(&self) -> QuitStatus {
        let status = self
            .backend
            .create_or_open_event(&QUIT_EVENT)
            .and_then(|event| event.wait(Some(Duration::ZERO)));
        match status {
            Ok(WaitStatus::Signaled) => QuitStatus::Signaled,
            Ok(WaitStatus::TimedOut) => QuitStatus::NotSignaled,
            Err(e) => {
                warn!("Quit check failed: {}", e);
                QuitStatus::NotSignaled
            }
        }
    }

    fn raise(&self, name: &SignalName) -> Result<(), PlatformError> {
        let event = self.backend.create_or_open_event(name)?;
        event.raise()?;
        debug!("Raised {}", name);
        Ok(())
    }
}

/// Background thread waiting on one named event.
///
/// `shutdown` stops and joins it. Dropping the handle detaches the thread,
/// which then lives until process exit.
pub struct SignalListener {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SignalListener {
    fn spawn<F>(backend: Arc<dyn SignalBackend>, name: SignalName, on_signal: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let event = match backend.create_or_open_event(&name) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Listener for {} starts without a handle: {}", name, e);
                None
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let thread = thread::spawn(move || {
            listen_loop(&*backend, name, event, &thread_stop, on_signal);
        });

        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// The loop has returned (one-shot fired, or stopped).
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn listen_loop<F>(
    backend: &dyn SignalBackend,
    name: SignalName,
    mut event: Option<Box<dyn NamedEvent>>,
    stop: &AtomicBool,
    mut on_signal: F,
) where
    F: FnMut() -> ControlFlow<()>,
{
    let mut failures = 0u32;
    let mut backoff = INITIAL_BACKOFF;

    while !stop.load(Ordering::SeqCst) {
        let Some(current) = event.as_ref() else {
            match backend.create_or_open_event(&name) {
                Ok(opened) => {
                    debug!("Opened {}", name);
                    event = Some(opened);
                }
                Err(e) => {
                    warn!("Cannot open {}, retrying in {:?}: {}", name, backoff, e);
                    pause(stop, backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
            continue;
        };

        match current.wait(Some(WAIT_SLICE)) {
            Ok(WaitStatus::Signaled) => {
                failures = 0;
                backoff = INITIAL_BACKOFF;
                trace!("{} signaled", name);
                if on_signal().is_break() {
                    break;
                }
            }
            Ok(WaitStatus::TimedOut) => {
                failures = 0;
                backoff = INITIAL_BACKOFF;
            }
            Err(e) => {
                failures += 1;
                warn!("Wait on {} failed ({} in a row): {}", name, failures, e);
                pause(stop, backoff);
                backoff = (backoff * 2).min(MAX_BACKOFF);
                if failures >= REOPEN_AFTER {
                    debug!("Reopening {}", name);
                    event = None;
                    failures = 0;
                }
            }
        }
    }
    debug!("Listener for {} stopped", name);
}

/// Sleeps up to `duration`, returning early once `stop` is set.
fn pause(stop: &AtomicBool, duration: Duration) {
    let mut remaining = duration;
    while !remaining.is_zero() && !stop.load(Ordering::SeqCst) {
        let step = remaining.min(PAUSE_STEP);
        thread::sleep(step);
        remaining -= step;
    }
}
