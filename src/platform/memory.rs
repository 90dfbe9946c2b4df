//! In-process stand-in for OS named objects.
//!
//! Mirrors the kernel rules the real backends rely on: a name maps to one
//! object while anybody holds it open, events auto-reset after releasing one
//! waiter, and a raise on an object nobody else holds is dropped with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::error::PlatformError;
use crate::platform::{
    MutexClaim, MutexHandle, NamedEvent, SignalBackend, SignalName, WaitStatus,
};

#[derive(Default)]
struct EventObject {
    signaled: Mutex<bool>,
    cond: Condvar,
    raises: AtomicUsize,
}

#[derive(Default)]
pub(crate) struct MemorySignals {
    mutexes: Mutex<HashMap<SignalName, Weak<()>>>,
    events: Mutex<HashMap<SignalName, Weak<EventObject>>>,
    fail_events: Mutex<bool>,
}

impl MemorySignals {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Total raises seen by the live object behind `name`.
    pub fn raise_count(&self, name: &SignalName) -> usize {
        self.events
            .lock()
            .unwrap()
            .get(name)
            .and_then(Weak::upgrade)
            .map_or(0, |event| event.raises.load(Ordering::SeqCst))
    }

    /// Makes every subsequent event open fail.
    pub fn fail_event_opens(&self, fail: bool) {
        *self.fail_events.lock().unwrap() = fail;
    }
}

impl SignalBackend for MemorySignals {
    fn create_or_open_mutex(&self, name: &SignalName) -> Result<MutexClaim, PlatformError> {
        let mut mutexes = self.mutexes.lock().unwrap();
        if let Some(existing) = mutexes.get(name).and_then(Weak::upgrade) {
            return Ok(MutexClaim {
                handle: MutexHandle::new(existing),
                already_existed: true,
            });
        }
        let object = Arc::new(());
        mutexes.insert(*name, Arc::downgrade(&object));
        Ok(MutexClaim {
            handle: MutexHandle::new(object),
            already_existed: false,
        })
    }

    fn create_or_open_event(&self, name: &SignalName) -> Result<Box<dyn NamedEvent>, PlatformError> {
        if *self.fail_events.lock().unwrap() {
            return Err(PlatformError::new(
                "CreateEvent",
                name.qualified(),
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }
        let mut events = self.events.lock().unwrap();
        let object = match events.get(name).and_then(Weak::upgrade) {
            Some(existing) => existing,
            None => {
                let created = Arc::new(EventObject::default());
                events.insert(*name, Arc::downgrade(&created));
                created
            }
        };
        Ok(Box::new(MemoryEvent(object)))
    }
}

struct MemoryEvent(Arc<EventObject>);

impl NamedEvent for MemoryEvent {
    fn raise(&self) -> Result<(), PlatformError> {
        self.0.raises.fetch_add(1, Ordering::SeqCst);
        *self.0.signaled.lock().unwrap() = true;
        self.0.cond.notify_one();
        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<WaitStatus, PlatformError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut signaled = self.0.signaled.lock().unwrap();
        loop {
            if *signaled {
                *signaled = false;
                return Ok(WaitStatus::Signaled);
            }
            match deadline {
                None => signaled = self.0.cond.wait(signaled).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(WaitStatus::TimedOut);
                    }
                    signaled = self.0.cond.wait_timeout(signaled, deadline - now).unwrap().0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: SignalName = SignalName::session("MemoryTestEvent");

    #[test]
    fn raise_latches_while_open() {
        let signals = MemorySignals::new();
        let listener = signals.create_or_open_event(&NAME).unwrap();
        let notifier = signals.create_or_open_event(&NAME).unwrap();
        notifier.raise().unwrap();
        notifier.raise().unwrap();
        assert_eq!(listener.wait(Some(Duration::ZERO)).unwrap(), WaitStatus::Signaled);
        // Auto-reset: two raises coalesce into one wake.
        assert_eq!(listener.wait(Some(Duration::ZERO)).unwrap(), WaitStatus::TimedOut);
    }

    #[test]
    fn raise_on_unheld_object_is_lost() {
        let signals = MemorySignals::new();
        signals.create_or_open_event(&NAME).unwrap().raise().unwrap();
        let late = signals.create_or_open_event(&NAME).unwrap();
        assert_eq!(late.wait(Some(Duration::ZERO)).unwrap(), WaitStatus::TimedOut);
    }

    #[test]
    fn mutex_reports_existing_holder() {
        let signals = MemorySignals::new();
        let name = SignalName::global("MemoryTestMutex");
        let first = signals.create_or_open_mutex(&name).unwrap();
        assert!(!first.already_existed);
        assert!(signals.create_or_open_mutex(&name).unwrap().already_existed);
        drop(first);
        assert!(!signals.create_or_open_mutex(&name).unwrap().already_existed);
    }
}
