//! Startup and shutdown choreography of the two processes.
//!
//! The main role owns the quit listener and launches the widget when it is
//! missing; the widget role owns the update listener. A full quit raises the
//! shared quit signal so the peer treats its own close as final, then asks
//! the peer's window to close.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};

use crate::config::LAUNCH_LOG_FILE;
use crate::events::EventSink;
use crate::model::{AppEvent, CloseDecision, ProcessRole};
use crate::platform::{PeerWindows, SignalBackend};
use crate::sync::{ClaimResult, InstanceGuard, QuitStatus, SignalListener, UpdateChannel};

pub const CHROME_ATTEMPTS: u32 = 20;
pub const CHROME_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Starts a process of the given role.
pub trait PeerLauncher: Send + Sync {
    fn launch(&self, role: ProcessRole) -> io::Result<()>;
}

/// Re-executes the running binary with `--mode <role>`.
pub struct ExecutableLauncher {
    exe: PathBuf,
}

impl ExecutableLauncher {
    pub fn current() -> io::Result<Self> {
        Ok(Self {
            exe: std::env::current_exe()?,
        })
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }
}

impl PeerLauncher for ExecutableLauncher {
    fn launch(&self, role: ProcessRole) -> io::Result<()> {
        let mut command = Command::new(&self.exe);
        command.args(["--mode", role.as_arg()]);
        if let Some(dir) = self.exe.parent() {
            command.current_dir(dir);
        }
        let child = command.spawn()?;
        info!("Started {} process {} from {:?}", role.as_arg(), child.id(), self.exe);
        Ok(())
    }
}

/// Append-only record of launch attempts, one timestamped line each.
pub struct LaunchLog {
    path: PathBuf,
}

impl LaunchLog {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(LAUNCH_LOG_FILE),
        }
    }

    pub fn append(&self, message: &str) {
        let line = format!("{} {}\n", Utc::now().to_rfc3339(), message);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!("Failed to write launch log {:?}: {}", self.path, e);
        }
    }
}

/// Whether startup continues after the single-instance check.
pub enum Startup {
    /// `guard` is `None` when the check itself failed; we run unguarded.
    Proceed { guard: Option<InstanceGuard> },
    /// Another instance of this role runs and was brought forward.
    ExitExisting,
}

/// Claims the role, or foregrounds the instance that already holds it.
pub fn claim_instance(backend: &dyn SignalBackend, peers: &dyn PeerWindows, role: ProcessRole) -> Startup {
    match InstanceGuard::claim(backend, role) {
        Ok(ClaimResult::Owned(guard)) => Startup::Proceed { guard: Some(guard) },
        Ok(ClaimResult::AlreadyRunning) => {
            match peers.find(role) {
                Some(window) => peers.activate(window),
                None => debug!("Running {} instance has no window yet", role.as_arg()),
            }
            Startup::ExitExisting
        }
        Err(e) => {
            warn!("Single-instance check unavailable: {}", e);
            Startup::Proceed { guard: None }
        }
    }
}

/// Polls for the widget window and restyles it. Gives up after `attempts`.
pub fn apply_chrome_with_retry(
    peers: &dyn PeerWindows,
    role: ProcessRole,
    attempts: u32,
    delay: Duration,
) -> bool {
    for attempt in 1..=attempts {
        if let Some(window) = peers.find(role) {
            match peers.apply_widget_chrome(window) {
                Ok(()) => {
                    debug!("Widget chrome applied on attempt {}", attempt);
                    return true;
                }
                Err(e) => {
                    warn!("Failed to apply widget chrome: {}", e);
                    return false;
                }
            }
        }
        thread::sleep(delay);
    }
    warn!("{} window not found after {} attempts", role.window_title(), attempts);
    false
}

pub struct ProcessSupervisor {
    role: ProcessRole,
    channel: UpdateChannel,
    peers: Arc<dyn PeerWindows>,
    launcher: Arc<dyn PeerLauncher>,
    launch_log: LaunchLog,
    sink: Arc<dyn EventSink>,
    intentional_quit: AtomicBool,
    quit_observed: Arc<AtomicBool>,
    listeners: Mutex<Vec<SignalListener>>,
}

impl ProcessSupervisor {
    pub fn new(
        role: ProcessRole,
        channel: UpdateChannel,
        peers: Arc<dyn PeerWindows>,
        launcher: Arc<dyn PeerLauncher>,
        launch_log: LaunchLog,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            role,
            channel,
            peers,
            launcher,
            launch_log,
            sink,
            intentional_quit: AtomicBool::new(false),
            quit_observed: Arc::new(AtomicBool::new(false)),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn role(&self) -> ProcessRole {
        self.role
    }

    pub fn channel(&self) -> &UpdateChannel {
        &self.channel
    }

    /// Starts the role's background work. `on_update` runs on the listener
    /// thread whenever the peer reports a data change (widget role only).
    pub fn start<F>(&self, on_update: F)
    where
        F: FnMut() + Send + 'static,
    {
        match self.role {
            ProcessRole::Ball => {
                let listener = self.channel.listen_for_updates(on_update);
                self.keep(listener);

                let peers = Arc::clone(&self.peers);
                thread::spawn(move || {
                    apply_chrome_with_retry(
                        &*peers,
                        ProcessRole::Ball,
                        CHROME_ATTEMPTS,
                        CHROME_RETRY_DELAY,
                    );
                });
            }
            ProcessRole::Main => {
                let observed = Arc::clone(&self.quit_observed);
                let sink = Arc::clone(&self.sink);
                let listener = self.channel.listen_for_quit(move || {
                    info!("Peer requested a full quit");
                    observed.store(true, Ordering::SeqCst);
                    sink.emit(AppEvent::QuitObserved);
                });
                self.keep(listener);

                let sink = Arc::clone(&self.sink);
                let listener = self.channel.listen_for_show(move || {
                    debug!("Peer asked for the main window");
                    sink.emit(AppEvent::ShowMainWindow);
                });
                self.keep(listener);

                if self.peers.find(ProcessRole::Ball).is_none() {
                    self.launch(ProcessRole::Ball);
                } else {
                    debug!("Ball process already running");
                }
            }
        }
    }

    /// Starts a process of `role`, recording the attempt in the launch log.
    pub fn launch(&self, role: ProcessRole) -> bool {
        self.launch_log
            .append(&format!("Launching {} subprocess", role.as_arg()));
        match self.launcher.launch(role) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to start {}: {}", role.as_arg(), e);
                self.launch_log
                    .append(&format!("Failed to start {}: {}", role.as_arg(), e));
                false
            }
        }
    }

    /// Shuts down both processes.
    pub fn request_full_quit(&self) {
        info!("Full quit requested by {}", self.role.as_arg());
        self.intentional_quit.store(true, Ordering::SeqCst);
        if let Err(e) = self.channel.raise_quit() {
            warn!("Could not raise quit signal: {}", e);
        }
        if let Some(window) = self.peers.find(self.role.peer()) {
            self.peers.request_close(window);
        }
        self.sink.emit(AppEvent::ExitRequested);
    }

    /// Answer to the OS asking our window to close.
    pub fn handle_close_request(&self) -> CloseDecision {
        if self.intentional_quit.load(Ordering::SeqCst) {
            return CloseDecision::Allow;
        }
        match self.role {
            ProcessRole::Ball => {
                self.request_full_quit();
                CloseDecision::Suppress
            }
            ProcessRole::Main => {
                if self.quit_observed.load(Ordering::SeqCst) {
                    return CloseDecision::Allow;
                }
                if self.channel.check_quit_now() == QuitStatus::Signaled {
                    self.quit_observed.store(true, Ordering::SeqCst);
                    return CloseDecision::Allow;
                }
                CloseDecision::Suppress
            }
        }
    }

    pub fn is_quit_observed(&self) -> bool {
        self.quit_observed.load(Ordering::SeqCst)
    }

    pub fn is_intentional_quit(&self) -> bool {
        self.intentional_quit.load(Ordering::SeqCst)
    }

    /// Stops the listeners started by `start`.
    pub fn shutdown(&self) {
        let listeners = std::mem::take(
            &mut *self
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for listener in listeners {
            listener.shutdown();
        }
    }

    fn keep(&self, listener: SignalListener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use super::*;
    use crate::error::PlatformError;
    use crate::platform::{LoginItem, PeerWindow};

    #[derive(Default)]
    pub struct FakePeers {
        pub windows: Mutex<HashMap<ProcessRole, PeerWindow>>,
        pub activated: Mutex<Vec<PeerWindow>>,
        pub closed: Mutex<Vec<PeerWindow>>,
        pub styled: Mutex<Vec<PeerWindow>>,
    }

    impl FakePeers {
        pub fn with(role: ProcessRole, id: isize) -> Self {
            let peers = Self::default();
            peers.windows.lock().unwrap().insert(role, PeerWindow(id));
            peers
        }
    }

    impl PeerWindows for FakePeers {
        fn find(&self, role: ProcessRole) -> Option<PeerWindow> {
            self.windows.lock().unwrap().get(&role).copied()
        }

        fn activate(&self, window: PeerWindow) {
            self.activated.lock().unwrap().push(window);
        }

        fn request_close(&self, window: PeerWindow) {
            self.closed.lock().unwrap().push(window);
        }

        fn apply_widget_chrome(&self, window: PeerWindow) -> Result<(), PlatformError> {
            self.styled.lock().unwrap().push(window);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeLauncher {
        pub launched: Mutex<Vec<ProcessRole>>,
        pub fail: AtomicBool,
    }

    impl PeerLauncher for FakeLauncher {
        fn launch(&self, role: ProcessRole) -> io::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such binary"));
            }
            self.launched.lock().unwrap().push(role);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeLoginItem {
        pub enabled: AtomicBool,
        pub fail: AtomicBool,
        pub calls: Mutex<Vec<bool>>,
    }

    impl LoginItem for FakeLoginItem {
        fn set_enabled(&self, enabled: bool) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(enabled);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("registry is read-only");
            }
            self.enabled.store(enabled, Ordering::SeqCst);
            Ok(())
        }

        fn is_enabled(&self) -> anyhow::Result<bool> {
            Ok(self.enabled.load(Ordering::SeqCst))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::testing::{FakeLauncher, FakePeers};
    use super::*;
    use crate::events::testing::RecordingSink;
    use crate::platform::PeerWindow;
    use crate::platform::memory::MemorySignals;
    use crate::sync::QUIT_EVENT;

    struct Harness {
        signals: Arc<MemorySignals>,
        peers: Arc<FakePeers>,
        launcher: Arc<FakeLauncher>,
        sink: Arc<RecordingSink>,
        supervisor: ProcessSupervisor,
        _dir: tempfile::TempDir,
    }

    fn harness(role: ProcessRole, peers: FakePeers) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let signals = MemorySignals::new();
        let peers = Arc::new(peers);
        let launcher = Arc::new(FakeLauncher::default());
        let sink = Arc::new(RecordingSink::default());
        let supervisor = ProcessSupervisor::new(
            role,
            UpdateChannel::new(signals.clone()),
            peers.clone(),
            launcher.clone(),
            LaunchLog::new(dir.path()),
            sink.clone(),
        );
        Harness {
            signals,
            peers,
            launcher,
            sink,
            supervisor,
            _dir: dir,
        }
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        done()
    }

    #[test]
    fn second_instance_activates_the_first() {
        let signals = MemorySignals::new();
        let peers = FakePeers::with(ProcessRole::Main, 7);
        let first = claim_instance(&*signals, &peers, ProcessRole::Main);
        assert!(matches!(first, Startup::Proceed { guard: Some(_) }));
        assert!(peers.activated.lock().unwrap().is_empty());

        let second = claim_instance(&*signals, &peers, ProcessRole::Main);
        assert!(matches!(second, Startup::ExitExisting));
        assert_eq!(*peers.activated.lock().unwrap(), vec![PeerWindow(7)]);
    }

    #[test]
    fn main_launches_missing_ball_and_logs_it() {
        let h = harness(ProcessRole::Main, FakePeers::default());
        h.supervisor.start(|| {});
        assert_eq!(*h.launcher.launched.lock().unwrap(), vec![ProcessRole::Ball]);

        let log = std::fs::read_to_string(h._dir.path().join(LAUNCH_LOG_FILE)).unwrap();
        assert!(log.contains("Launching ball subprocess"));
        h.supervisor.shutdown();
    }

    #[test]
    fn main_leaves_running_ball_alone() {
        let h = harness(ProcessRole::Main, FakePeers::with(ProcessRole::Ball, 3));
        h.supervisor.start(|| {});
        assert!(h.launcher.launched.lock().unwrap().is_empty());
        h.supervisor.shutdown();
    }

    #[test]
    fn launch_failure_is_logged_not_fatal() {
        let h = harness(ProcessRole::Main, FakePeers::default());
        h.launcher.fail.store(true, Ordering::SeqCst);
        assert!(!h.supervisor.launch(ProcessRole::Ball));

        let log = std::fs::read_to_string(h._dir.path().join(LAUNCH_LOG_FILE)).unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("Failed to start ball: no such binary"));
    }

    #[test]
    fn main_hides_on_close_until_quit() {
        let h = harness(ProcessRole::Main, FakePeers::default());
        assert_eq!(h.supervisor.handle_close_request(), CloseDecision::Suppress);
        assert_eq!(h.supervisor.handle_close_request(), CloseDecision::Suppress);
    }

    #[test]
    fn quit_seen_by_check_is_terminal() {
        let h = harness(ProcessRole::Main, FakePeers::default());
        let peer = h.signals.create_or_open_event(&QUIT_EVENT).unwrap();
        peer.raise().unwrap();

        assert_eq!(h.supervisor.handle_close_request(), CloseDecision::Allow);
        assert!(h.supervisor.is_quit_observed());
        // The raise is consumed, yet every later close is still allowed.
        for _ in 0..3 {
            assert_eq!(h.supervisor.handle_close_request(), CloseDecision::Allow);
        }
    }

    #[test]
    fn quit_seen_by_listener_is_terminal() {
        let h = harness(ProcessRole::Main, FakePeers::with(ProcessRole::Ball, 3));
        h.supervisor.start(|| {});
        UpdateChannel::new(h.signals.clone()).raise_quit().unwrap();

        assert!(wait_until(|| h.supervisor.is_quit_observed()));
        assert_eq!(h.sink.count(&AppEvent::QuitObserved), 1);
        assert_eq!(h.supervisor.handle_close_request(), CloseDecision::Allow);
        assert_eq!(h.supervisor.handle_close_request(), CloseDecision::Allow);
        h.supervisor.shutdown();
    }

    #[test]
    fn main_shows_its_window_when_asked() {
        let h = harness(ProcessRole::Main, FakePeers::with(ProcessRole::Ball, 3));
        h.supervisor.start(|| {});
        UpdateChannel::new(h.signals.clone()).raise_show().unwrap();

        assert!(wait_until(|| h.sink.count(&AppEvent::ShowMainWindow) == 1));
        assert!(!h.supervisor.is_quit_observed());
        h.supervisor.shutdown();
    }

    #[test]
    fn ball_close_turns_into_full_quit() {
        let h = harness(ProcessRole::Ball, FakePeers::with(ProcessRole::Main, 11));
        // The main process listens on quit; hold the event like it would.
        let main_side = h.signals.create_or_open_event(&QUIT_EVENT).unwrap();

        assert_eq!(h.supervisor.handle_close_request(), CloseDecision::Suppress);
        assert!(h.supervisor.is_intentional_quit());
        assert_eq!(h.signals.raise_count(&QUIT_EVENT), 1);
        assert_eq!(*h.peers.closed.lock().unwrap(), vec![PeerWindow(11)]);
        assert_eq!(h.sink.count(&AppEvent::ExitRequested), 1);
        assert_eq!(
            main_side.wait(Some(Duration::ZERO)).unwrap(),
            crate::platform::WaitStatus::Signaled
        );

        // Already quitting: the real close goes through.
        assert_eq!(h.supervisor.handle_close_request(), CloseDecision::Allow);
    }

    #[test]
    fn intentional_main_quit_allows_close() {
        let h = harness(ProcessRole::Main, FakePeers::with(ProcessRole::Ball, 5));
        h.supervisor.request_full_quit();
        assert_eq!(*h.peers.closed.lock().unwrap(), vec![PeerWindow(5)]);
        assert_eq!(h.supervisor.handle_close_request(), CloseDecision::Allow);
    }

    #[test]
    fn chrome_retry_waits_for_the_window() {
        let peers = Arc::new(FakePeers::default());
        let late = Arc::clone(&peers);
        let adder = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            late.windows
                .lock()
                .unwrap()
                .insert(ProcessRole::Ball, PeerWindow(9));
        });
        assert!(apply_chrome_with_retry(
            &*peers,
            ProcessRole::Ball,
            CHROME_ATTEMPTS,
            Duration::from_millis(10)
        ));
        adder.join().unwrap();
        assert_eq!(*peers.styled.lock().unwrap(), vec![PeerWindow(9)]);
    }

    #[test]
    fn chrome_retry_is_bounded() {
        let peers = FakePeers::default();
        let started = Instant::now();
        assert!(!apply_chrome_with_retry(&peers, ProcessRole::Ball, 3, Duration::from_millis(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn ball_start_listens_for_updates() {
        let h = harness(ProcessRole::Ball, FakePeers::with(ProcessRole::Ball, 2));
        let woke = Arc::new(AtomicBool::new(false));
        let flag = woke.clone();
        h.supervisor.start(move || flag.store(true, Ordering::SeqCst));

        UpdateChannel::new(h.signals.clone()).notify_update().unwrap();
        assert!(wait_until(|| woke.load(Ordering::SeqCst)));
        assert!(wait_until(|| !h.peers.styled.lock().unwrap().is_empty()));
        assert!(h.launcher.launched.lock().unwrap().is_empty());
        h.supervisor.shutdown();
    }
}
