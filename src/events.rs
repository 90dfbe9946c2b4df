//! Hand-off from the core to the UI thread.

use std::sync::Mutex;

use log::debug;
use winit::event_loop::EventLoopProxy;

use crate::model::{AppEvent, UserEvent};

/// Receives core notifications. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AppEvent);
}

/// Forwards events into the winit event loop.
pub struct ProxySink {
    proxy: Mutex<EventLoopProxy<UserEvent>>,
}

impl ProxySink {
    pub fn new(proxy: EventLoopProxy<UserEvent>) -> Self {
        Self {
            proxy: Mutex::new(proxy),
        }
    }
}

impl EventSink for ProxySink {
    fn emit(&self, event: AppEvent) {
        let name = event.name();
        let proxy = self.proxy.lock().unwrap_or_else(|e| e.into_inner());
        if proxy.send_event(UserEvent::App(event)).is_err() {
            debug!("Dropped {} event: event loop closed", name);
        }
    }
}
