//! Named objects on top of the filesystem.
//!
//! A named mutex is an exclusive, non-blocking `flock` on `<dir>/<name>.lock`;
//! the holder writes its pid into the file so the peer can find it. A named
//! event is a FIFO at `<dir>/<name>.fifo`, opened read-write so the pipe
//! buffer lives as long as any process holds it open. Raising writes one
//! byte; waiting polls for readability and drains everything that is queued,
//! which coalesces a burst of raises into a single wake.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::debug;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg, OFlag};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::stat::Mode;
use nix::unistd::{getuid, mkfifo};

use crate::error::PlatformError;
use crate::platform::{
    MutexClaim, MutexHandle, NamedEvent, Scope, SignalBackend, SignalName, WaitStatus,
};

const APP_DIR: &str = "todoball";

#[derive(Clone, Debug)]
pub struct UnixSignals {
    global_dir: PathBuf,
    session_dir: PathBuf,
}

impl Default for UnixSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl UnixSignals {
    /// Global names live in the shared temp dir, session names in the
    /// per-user runtime dir.
    pub fn new() -> Self {
        let global_dir = std::env::temp_dir().join(APP_DIR);
        let session_dir = dirs::runtime_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| std::env::temp_dir().join(format!("{}-{}", APP_DIR, getuid())));
        Self::with_dirs(global_dir, session_dir)
    }

    pub fn with_dirs(global_dir: impl Into<PathBuf>, session_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_dir: global_dir.into(),
            session_dir: session_dir.into(),
        }
    }

    fn dir_for(&self, name: &SignalName) -> &Path {
        match name.scope() {
            Scope::Global => &self.global_dir,
            Scope::Session => &self.session_dir,
        }
    }

    /// File backing the named mutex `name`.
    pub fn lock_path(&self, name: &SignalName) -> PathBuf {
        self.dir_for(name).join(format!("{}.lock", name.base()))
    }

    fn fifo_path(&self, name: &SignalName) -> PathBuf {
        self.dir_for(name).join(format!("{}.fifo", name.base()))
    }

    fn ensure_dir(&self, op: &'static str, name: &SignalName) -> Result<(), PlatformError> {
        fs::create_dir_all(self.dir_for(name))
            .map_err(|e| PlatformError::new(op, name.qualified(), e))
    }
}

/// Pid recorded in the lock file at `path`.
///
/// Only reads the file and never touches the lock. A holder clears the pid
/// when it releases the lock; one that crashed leaves it behind, so callers
/// check the pid is still alive.
pub fn lock_holder(path: &Path) -> Option<i32> {
    let contents = fs::read_to_string(path).ok()?;
    contents.trim().parse().ok().filter(|pid: &i32| *pid > 0)
}

/// Held instance lock. Clears the recorded pid before unlocking.
struct PidLock(Flock<File>);

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(e) = self.0.set_len(0) {
            debug!("Could not clear pid from lock file: {}", e);
        }
    }
}

impl SignalBackend for UnixSignals {
    fn create_or_open_mutex(&self, name: &SignalName) -> Result<MutexClaim, PlatformError> {
        self.ensure_dir("flock", name)?;
        let path = self.lock_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| PlatformError::new("open", name.qualified(), e))?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                let mut file: &File = &lock;
                file.set_len(0)
                    .and_then(|_| write!(file, "{}", std::process::id()))
                    .map_err(|e| PlatformError::new("write", name.qualified(), e))?;
                Ok(MutexClaim {
                    handle: MutexHandle::new(PidLock(lock)),
                    already_existed: false,
                })
            }
            Err((file, errno)) if errno == Errno::EWOULDBLOCK => Ok(MutexClaim {
                handle: MutexHandle::new(file),
                already_existed: true,
            }),
            Err((_, errno)) => Err(PlatformError::new(
                "flock",
                name.qualified(),
                io::Error::from(errno),
            )),
        }
    }

    fn create_or_open_event(&self, name: &SignalName) -> Result<Box<dyn NamedEvent>, PlatformError> {
        self.ensure_dir("mkfifo", name)?;
        let path = self.fifo_path(name);
        match mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR) {
            Ok(()) | Err(Errno::EEXIST) => {}
            Err(errno) => {
                return Err(PlatformError::new(
                    "mkfifo",
                    name.qualified(),
                    io::Error::from(errno),
                ));
            }
        }

        let metadata =
            fs::metadata(&path).map_err(|e| PlatformError::new("stat", name.qualified(), e))?;
        if !metadata.file_type().is_fifo() {
            return Err(PlatformError::new(
                "mkfifo",
                name.qualified(),
                io::Error::new(ErrorKind::AlreadyExists, "name taken by a non-FIFO file"),
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&path)
            .map_err(|e| PlatformError::new("open", name.qualified(), e))?;

        Ok(Box::new(FifoEvent {
            file,
            name: name.qualified(),
        }))
    }
}

struct FifoEvent {
    file: File,
    name: String,
}

impl FifoEvent {
    /// Empties the pipe. Returns whether anything was queued.
    fn drain(&self) -> Result<bool, PlatformError> {
        let mut buf = [0u8; 64];
        let mut drained = false;
        loop {
            match (&self.file).read(&mut buf) {
                Ok(0) => return Ok(drained),
                Ok(_) => drained = true,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(drained),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(PlatformError::new("read", self.name.clone(), e)),
            }
        }
    }
}

impl NamedEvent for FifoEvent {
    fn raise(&self) -> Result<(), PlatformError> {
        match (&self.file).write(&[1]) {
            Ok(_) => Ok(()),
            // Pipe full: the event is already pending.
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(PlatformError::new("write", self.name.clone(), e)),
        }
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<WaitStatus, PlatformError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let poll_timeout = match deadline {
                None => PollTimeout::NONE,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    PollTimeout::try_from(remaining).unwrap_or(PollTimeout::MAX)
                }
            };

            let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, poll_timeout) {
                Ok(0) => return Ok(WaitStatus::TimedOut),
                Ok(_) => {
                    if self.drain()? {
                        return Ok(WaitStatus::Signaled);
                    }
                }
                Err(Errno::EINTR) => {}
                Err(errno) => {
                    return Err(PlatformError::new(
                        "poll",
                        self.name.clone(),
                        io::Error::from(errno),
                    ));
                }
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(WaitStatus::TimedOut);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(dir: &Path) -> UnixSignals {
        UnixSignals::with_dirs(dir.join("global"), dir.join("session"))
    }

    #[test]
    fn second_lock_sees_existing_holder() {
        let dir = tempfile::tempdir().unwrap();
        let signals = signals(dir.path());
        let name = SignalName::global("TestMutex");

        let first = signals.create_or_open_mutex(&name).unwrap();
        assert!(!first.already_existed);
        assert!(signals.create_or_open_mutex(&name).unwrap().already_existed);
        assert_eq!(
            lock_holder(&signals.lock_path(&name)),
            Some(std::process::id() as i32)
        );

        drop(first);
        assert_eq!(lock_holder(&signals.lock_path(&name)), None);
        assert!(!signals.create_or_open_mutex(&name).unwrap().already_existed);
    }

    #[test]
    fn stale_pid_is_reported_without_taking_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let signals = signals(dir.path());
        let name = SignalName::global("StaleMutex");
        fs::create_dir_all(dir.path().join("global")).unwrap();
        // Left behind by a holder that crashed.
        fs::write(signals.lock_path(&name), "4242").unwrap();

        assert_eq!(lock_holder(&signals.lock_path(&name)), Some(4242));
        let claim = signals.create_or_open_mutex(&name).unwrap();
        assert!(!claim.already_existed);
        assert_eq!(
            lock_holder(&signals.lock_path(&name)),
            Some(std::process::id() as i32)
        );
    }

    #[test]
    fn claims_succeed_while_the_holder_is_being_read() {
        let dir = tempfile::tempdir().unwrap();
        let signals = signals(dir.path());
        let name = SignalName::global("BusyMutex");
        let path = signals.lock_path(&name);
        drop(signals.create_or_open_mutex(&name).unwrap());

        let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let reader = std::thread::spawn({
            let stop = stop.clone();
            move || {
                while !stop.load(std::sync::atomic::Ordering::SeqCst) {
                    let _ = lock_holder(&path);
                }
            }
        });
        for _ in 0..500 {
            let claim = signals.create_or_open_mutex(&name).unwrap();
            assert!(!claim.already_existed);
        }
        stop.store(true, std::sync::atomic::Ordering::SeqCst);
        reader.join().unwrap();
    }

    #[test]
    fn raises_coalesce_into_one_wake() {
        let dir = tempfile::tempdir().unwrap();
        let signals = signals(dir.path());
        let name = SignalName::session("TestEvent");

        let listener = signals.create_or_open_event(&name).unwrap();
        let notifier = signals.create_or_open_event(&name).unwrap();
        for _ in 0..3 {
            notifier.raise().unwrap();
        }
        drop(notifier);

        assert_eq!(
            listener.wait(Some(Duration::from_millis(100))).unwrap(),
            WaitStatus::Signaled
        );
        assert_eq!(
            listener.wait(Some(Duration::from_millis(20))).unwrap(),
            WaitStatus::TimedOut
        );
    }

    #[test]
    fn wait_wakes_on_raise_from_another_thread() {
        let dir = tempfile::tempdir().unwrap();
        let signals = signals(dir.path());
        let name = SignalName::session("TestThreadEvent");
        let listener = signals.create_or_open_event(&name).unwrap();

        let raiser = {
            let signals = signals.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                signals.create_or_open_event(&name).unwrap().raise().unwrap();
            })
        };
        assert_eq!(listener.wait(None).unwrap(), WaitStatus::Signaled);
        raiser.join().unwrap();
    }

    #[test]
    fn regular_file_cannot_become_an_event() {
        let dir = tempfile::tempdir().unwrap();
        let signals = signals(dir.path());
        let name = SignalName::session("Taken");
        fs::create_dir_all(dir.path().join("session")).unwrap();
        fs::write(dir.path().join("session").join("Taken.fifo"), b"x").unwrap();
        assert!(signals.create_or_open_event(&name).is_err());
    }
}
