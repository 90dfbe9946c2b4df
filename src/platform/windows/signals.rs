//! Kernel named mutexes and auto-reset events.

use std::io;
use std::time::Duration;

use windows::Win32::Foundation::{
    CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows::Win32::System::Threading::{
    CreateEventW, CreateMutexW, INFINITE, SetEvent, WaitForSingleObject,
};
use windows::core::HSTRING;

use crate::error::PlatformError;
use crate::platform::{MutexClaim, MutexHandle, NamedEvent, SignalBackend, SignalName, WaitStatus};

/// Kernel handle closed on drop.
struct OwnedHandle(HANDLE);

// Kernel handles are process-wide and may be used from any thread.
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle came from a successful Create* call and is closed once
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

#[derive(Default)]
pub struct Win32Signals;

impl SignalBackend for Win32Signals {
    fn create_or_open_mutex(&self, name: &SignalName) -> Result<MutexClaim, PlatformError> {
        let wide = HSTRING::from(name.qualified());
        // SAFETY: `wide` outlives the call; the returned handle is owned below
        let (handle, already_existed) = unsafe {
            let handle = CreateMutexW(None, false, &wide)
                .map_err(|_| PlatformError::new("CreateMutexW", name.qualified(), io::Error::last_os_error()))?;
            (handle, GetLastError() == ERROR_ALREADY_EXISTS)
        };
        Ok(MutexClaim {
            handle: MutexHandle::new(OwnedHandle(handle)),
            already_existed,
        })
    }

    fn create_or_open_event(&self, name: &SignalName) -> Result<Box<dyn NamedEvent>, PlatformError> {
        let wide = HSTRING::from(name.qualified());
        // Auto-reset, initially unsignalled.
        // SAFETY: `wide` outlives the call; the returned handle is owned below
        let handle = unsafe { CreateEventW(None, false, false, &wide) }
            .map_err(|_| PlatformError::new("CreateEventW", name.qualified(), io::Error::last_os_error()))?;
        Ok(Box::new(Win32Event {
            handle: OwnedHandle(handle),
            name: name.qualified(),
        }))
    }
}

struct Win32Event {
    handle: OwnedHandle,
    name: String,
}

impl NamedEvent for Win32Event {
    fn raise(&self) -> Result<(), PlatformError> {
        // SAFETY: handle is a live event handle
        unsafe { SetEvent(self.handle.0) }
            .map_err(|_| PlatformError::new("SetEvent", self.name.clone(), io::Error::last_os_error()))
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<WaitStatus, PlatformError> {
        let millis = match timeout {
            None => INFINITE,
            Some(t) => u32::try_from(t.as_millis()).unwrap_or(INFINITE - 1),
        };
        // SAFETY: handle is a live event handle
        let result = unsafe { WaitForSingleObject(self.handle.0, millis) };
        match result {
            WAIT_OBJECT_0 => Ok(WaitStatus::Signaled),
            WAIT_TIMEOUT => Ok(WaitStatus::TimedOut),
            _ => Err(PlatformError::new(
                "WaitForSingleObject",
                self.name.clone(),
                io::Error::last_os_error(),
            )),
        }
    }
}
