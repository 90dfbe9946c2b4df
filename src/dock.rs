//! Edge docking for the floating widget.
//!
//! While the widget is undocked and not being dragged, a poll compares its
//! left edge against the hosting monitor. Pushed far enough past an edge, it
//! collapses into a thin strip flush with that edge; an explicit undock
//! brings back the square anchored to the same edge.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use log::{debug, info, trace, warn};

use crate::error::GeometryUnavailable;
use crate::events::EventSink;
use crate::model::{AppEvent, DockSide, DockState, MonitorInfo, ProcessRole, Rect};
use crate::platform::WidgetSurface;

/// Nominal widget square.
pub const WIDGET_SIZE: i32 = 80;
/// Rendered container around the widget.
pub const CONTAINER_WIDTH: i32 = 100;
pub const CONTAINER_PADDING: i32 = (CONTAINER_WIDTH - WIDGET_SIZE) / 2;
/// A quarter of the widget must be off-screen before it docks.
pub const MIN_HIDDEN: i32 = WIDGET_SIZE / 4;
/// Initial widget window: the ball centred in its padded container.
pub const WIDGET_WINDOW_WIDTH: i32 = CONTAINER_WIDTH;
pub const WIDGET_WINDOW_HEIGHT: i32 = WIDGET_SIZE;
pub const DOCKED_WIDTH: i32 = 10;
pub const DOCKED_HEIGHT: i32 = 100;
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Edge the window would dock to, judged on its left coordinate only.
///
/// Both thresholds are inclusive: left docks at `monitor.left - 30` or less,
/// right at `monitor.right - 70` or more.
pub fn dock_side_for(window: Rect, monitor: Rect) -> Option<DockSide> {
    let left_threshold = monitor.left - (CONTAINER_PADDING + MIN_HIDDEN);
    let right_threshold = monitor.right - (WIDGET_SIZE - MIN_HIDDEN + CONTAINER_PADDING);
    if window.left <= left_threshold {
        Some(DockSide::Left)
    } else if window.left >= right_threshold {
        Some(DockSide::Right)
    } else {
        None
    }
}

/// Whether window-relative `x` falls on the ball rather than the padding
/// around it. Windows no wider than the ball are all ball.
pub fn ball_contains(window_width: i32, x: f64) -> bool {
    let padding = f64::from((window_width - WIDGET_SIZE).max(0) / 2);
    x >= padding && x < padding + f64::from(WIDGET_SIZE)
}

/// Strip flush with the monitor edge, kept vertically inside the work area.
pub fn docked_bounds(side: DockSide, window: Rect, monitor: &MonitorInfo) -> Rect {
    let left = match side {
        DockSide::Left => monitor.bounds.left,
        DockSide::Right => monitor.bounds.right - DOCKED_WIDTH,
    };
    let lowest_top = (monitor.work.bottom - DOCKED_HEIGHT).max(monitor.work.top);
    let top = window.top.clamp(monitor.work.top, lowest_top);
    Rect::from_origin(left, top, DOCKED_WIDTH, DOCKED_HEIGHT)
}

/// Square restored from a docked strip, keeping the docked edge in place.
pub fn undocked_bounds(side: DockSide, docked: Rect) -> Rect {
    let left = match side {
        DockSide::Left => docked.left,
        DockSide::Right => docked.right - WIDGET_SIZE,
    };
    Rect::from_origin(left, docked.top, WIDGET_SIZE, WIDGET_SIZE)
}

pub struct DockEngine {
    role: ProcessRole,
    surface: Arc<dyn WidgetSurface>,
    sink: Arc<dyn EventSink>,
    state: Mutex<DockState>,
}

impl DockEngine {
    pub fn new(role: ProcessRole, surface: Arc<dyn WidgetSurface>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            role,
            surface,
            sink,
            state: Mutex::new(DockState::Undocked),
        }
    }

    pub fn state(&self) -> DockState {
        *self.lock_state()
    }

    /// Side the widget would dock to right now, ignoring drag and state.
    pub fn check_docking(&self) -> Option<DockSide> {
        if self.role != ProcessRole::Ball {
            return None;
        }
        let window = self.surface.window_rect().ok()?;
        let monitor = self.surface.monitor().ok()?;
        dock_side_for(window, monitor.bounds)
    }

    /// One poll step. Returns the new state when a dock happened.
    pub fn tick(&self) -> Option<DockState> {
        if self.role != ProcessRole::Ball
            || self.state() != DockState::Undocked
            || self.surface.primary_button_down()
        {
            return None;
        }

        let (window, monitor) = match self.geometry() {
            Ok(geometry) => geometry,
            Err(e) => {
                trace!("Skipping dock check: {}", e);
                return None;
            }
        };
        let side = dock_side_for(window, monitor.bounds)?;
        let docked = self.apply(side, window, &monitor)?;
        self.sink.emit(AppEvent::DockStateChanged(docked));
        Some(docked)
    }

    /// Docks to `side` immediately, whatever the current overshoot.
    pub fn dock(&self, side: DockSide) -> Result<(), GeometryUnavailable> {
        if self.role != ProcessRole::Ball || self.state() == DockState::docked(side) {
            return Ok(());
        }
        let (window, monitor) = self.geometry()?;
        let docked = self
            .apply(side, window, &monitor)
            .ok_or(GeometryUnavailable)?;
        self.sink.emit(AppEvent::DockStateChanged(docked));
        Ok(())
    }

    /// Restores the square anchored at `side`. No-op when already undocked.
    pub fn undock(&self, side: DockSide) -> Result<(), GeometryUnavailable> {
        if self.role != ProcessRole::Ball || self.state() == DockState::Undocked {
            return Ok(());
        }
        let docked = self.surface.window_rect()?;
        self.surface.set_bounds(undocked_bounds(side, docked))?;
        *self.lock_state() = DockState::Undocked;

        info!("Undocked from {} edge", side.as_str());
        self.sink.emit(AppEvent::DockStateChanged(DockState::Undocked));
        Ok(())
    }

    /// Starts the background poll. Inert for the main role.
    pub fn start_polling(self: &Arc<Self>) -> DockPoller {
        if self.role != ProcessRole::Ball {
            return DockPoller {
                cancel: None,
                thread: None,
            };
        }

        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        let engine = Arc::clone(self);
        let thread = thread::spawn(move || {
            debug!("Dock poller started");
            loop {
                match cancel_rx.recv_timeout(POLL_INTERVAL) {
                    Err(RecvTimeoutError::Timeout) => {
                        engine.tick();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("Dock poller stopped");
        });

        DockPoller {
            cancel: Some(cancel_tx),
            thread: Some(thread),
        }
    }

    fn geometry(&self) -> Result<(Rect, MonitorInfo), GeometryUnavailable> {
        Ok((self.surface.window_rect()?, self.surface.monitor()?))
    }

    /// Moves the window into the strip and records the state on success.
    fn apply(&self, side: DockSide, window: Rect, monitor: &MonitorInfo) -> Option<DockState> {
        let target = docked_bounds(side, window, monitor);
        if let Err(e) = self.surface.set_bounds(target) {
            warn!("Failed to dock to {} edge: {}", side.as_str(), e);
            return None;
        }
        let docked = DockState::docked(side);
        *self.lock_state() = docked;
        info!("Docked to {} edge at {:?}", side.as_str(), target);
        Some(docked)
    }

    // Never held across surface calls: those may run on the UI thread, which
    // also reads the state.
    fn lock_state(&self) -> MutexGuard<'_, DockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Running dock poll. Stopped by `shutdown` or on drop.
pub struct DockPoller {
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DockPoller {
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DockPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
