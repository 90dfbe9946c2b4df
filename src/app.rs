use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(any(target_os = "windows", target_os = "macos"))]
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
#[cfg(any(target_os = "windows", target_os = "macos"))]
use tray_icon::menu::MenuEvent;
#[cfg(any(target_os = "windows", target_os = "macos"))]
use tray_icon::{TrayIcon, TrayIconBuilder};
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, StartCause, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowLevel};

use crate::config::{self, AppConfig};
use crate::controller::AppController;
use crate::dock::{
    DockEngine, DockPoller, WIDGET_WINDOW_HEIGHT, WIDGET_WINDOW_WIDTH, ball_contains,
};
use crate::events::{EventSink, ProxySink};
use crate::model::*;
use crate::platform::{LoginItem, PeerWindows, SignalBackend, WidgetSurface};
use crate::storage::Storage;
use crate::supervisor::{
    ExecutableLauncher, LaunchLog, PeerLauncher, ProcessSupervisor, Startup, claim_instance,
};
use crate::sync::UpdateChannel;
use crate::ui::icon::icon_for;
#[cfg(any(target_os = "windows", target_os = "macos"))]
use crate::ui::menu::{build_menu, build_tooltip, parse_menu_action};

#[cfg(any(target_os = "windows", target_os = "macos"))]
const MENU_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// OS services for this platform.
struct Platform {
    signals: Arc<dyn SignalBackend>,
    peers: Arc<dyn PeerWindows>,
    login: Arc<dyn LoginItem>,
}

#[cfg(target_os = "windows")]
fn platform() -> Platform {
    use crate::platform::current::{RegistryLoginItem, Win32Peers, Win32Signals};
    Platform {
        signals: Arc::new(Win32Signals),
        peers: Arc::new(Win32Peers),
        login: Arc::new(RegistryLoginItem),
    }
}

#[cfg(unix)]
fn platform() -> Platform {
    use crate::platform::current::{AutoLaunchItem, PidPeers, UnixSignals};
    let signals = UnixSignals::new();
    Platform {
        signals: Arc::new(signals.clone()),
        peers: Arc::new(PidPeers::new(signals)),
        login: Arc::new(AutoLaunchItem),
    }
}

#[cfg(target_os = "windows")]
fn widget_surface(
    role: ProcessRole,
    _window: &Arc<Window>,
    _button: &Arc<AtomicBool>,
) -> Arc<dyn WidgetSurface> {
    Arc::new(crate::platform::current::Win32Surface::new(role))
}

#[cfg(unix)]
fn widget_surface(
    _role: ProcessRole,
    window: &Arc<Window>,
    button: &Arc<AtomicBool>,
) -> Arc<dyn WidgetSurface> {
    Arc::new(crate::platform::current::WinitSurface::new(
        Arc::clone(window),
        Arc::clone(button),
    ))
}

/// Everything that exists once the window does.
struct Running {
    window: Arc<Window>,
    controller: AppController,
    poller: Option<DockPoller>,
    /// Last pointer x inside the window, in physical pixels.
    cursor_x: Cell<Option<f64>>,
}

pub fn run(role: ProcessRole) -> Result<()> {
    let platform = platform();

    // Decide before touching storage: a duplicate instance exits untouched.
    let _guard = match claim_instance(&*platform.signals, &*platform.peers, role) {
        Startup::Proceed { guard } => guard,
        Startup::ExitExisting => {
            info!("{} instance already running, exiting", role.as_arg());
            return Ok(());
        }
    };

    let data_dir = config::data_dir();
    let storage = Arc::new(
        Storage::open(&data_dir)
            .with_context(|| format!("failed to open data directory {:?}", data_dir))?,
    );
    info!("Starting {} role with data in {:?}", role.as_arg(), storage.dir());

    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .context("failed to create event loop")?;
    let proxy = event_loop.create_proxy();
    let sink: Arc<dyn EventSink> = Arc::new(ProxySink::new(proxy.clone()));

    let launcher: Arc<dyn PeerLauncher> =
        Arc::new(ExecutableLauncher::current().context("failed to locate executable")?);
    let supervisor = Arc::new(ProcessSupervisor::new(
        role,
        UpdateChannel::new(Arc::clone(&platform.signals)),
        Arc::clone(&platform.peers),
        launcher,
        LaunchLog::new(storage.dir()),
        Arc::clone(&sink),
    ));

    #[cfg(any(target_os = "windows", target_os = "macos"))]
    let tray_icon = match role {
        ProcessRole::Main => match build_tray(&storage) {
            Ok(tray) => Some(tray),
            Err(e) => {
                warn!("Running without a tray icon: {:#}", e);
                None
            }
        },
        ProcessRole::Ball => None,
    };
    #[cfg(any(target_os = "windows", target_os = "macos"))]
    let menu_receiver = MenuEvent::receiver().clone();

    let button_down = Arc::new(AtomicBool::new(false));
    let mut running: Option<Running> = None;

    #[allow(deprecated)]
    let run_result = event_loop.run(move |event, event_loop| match event {
        Event::NewEvents(StartCause::Init) => {
            #[cfg(any(target_os = "windows", target_os = "macos"))]
            event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + MENU_POLL_INTERVAL));
            #[cfg(not(any(target_os = "windows", target_os = "macos")))]
            event_loop.set_control_flow(ControlFlow::Wait);
        }
        #[cfg(any(target_os = "windows", target_os = "macos"))]
        Event::NewEvents(StartCause::ResumeTimeReached { .. }) => {
            // Poll for menu events (replaces dedicated menu listener thread)
            while let Ok(event) = menu_receiver.try_recv() {
                if let Some(action) = parse_menu_action(event.id().0.as_str()) {
                    let _ = proxy.send_event(UserEvent::MenuAction(action));
                }
            }
            event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + MENU_POLL_INTERVAL));
        }
        Event::Resumed => {
            if running.is_some() {
                return;
            }
            match create_window(event_loop, role, &storage.config()) {
                Ok(window) => {
                    let window = Arc::new(window);
                    let surface = widget_surface(role, &window, &button_down);
                    let dock = Arc::new(DockEngine::new(role, surface, Arc::clone(&sink)));
                    let controller = AppController::new(
                        Arc::clone(&storage),
                        Arc::clone(&supervisor),
                        dock,
                        Arc::clone(&platform.peers),
                        Arc::clone(&platform.login),
                        Arc::clone(&sink),
                    );
                    let poller = controller.start();
                    refresh_icons(&window, &controller);
                    running = Some(Running {
                        window,
                        controller,
                        poller,
                        cursor_x: Cell::new(None),
                    });
                }
                Err(e) => {
                    error!("Failed to create window: {:#}", e);
                    event_loop.exit();
                }
            }
        }
        Event::WindowEvent { event, .. } => {
            let Some(app) = running.as_ref() else {
                return;
            };
            handle_window_event(app, role, &button_down, event_loop, event);
        }
        Event::UserEvent(user_event) => {
            let Some(app) = running.as_ref() else {
                return;
            };
            match user_event {
                UserEvent::App(app_event) => {
                    debug!("Event {}", app_event.name());
                    match app_event {
                        AppEvent::DataChanged => {
                            #[cfg(any(target_os = "windows", target_os = "macos"))]
                            if let Some(tray) = tray_icon.as_ref() {
                                update_tray_display(tray, &app.controller);
                            }
                            refresh_icons(&app.window, &app.controller);
                        }
                        AppEvent::DockStateChanged(state) => {
                            debug!("Dock state now {}", state.as_str());
                        }
                        AppEvent::QuitObserved | AppEvent::ExitRequested => event_loop.exit(),
                        AppEvent::ShowMainWindow => {
                            app.window.set_visible(true);
                            app.window.set_minimized(false);
                            app.window.focus_window();
                        }
                        AppEvent::ResizeMainWindow { width, height } => {
                            let _ = app
                                .window
                                .request_inner_size(LogicalSize::new(width, height));
                        }
                    }
                }
                UserEvent::MenuAction(action) => match action {
                    MenuAction::ShowMain => app.controller.open_main(),
                    MenuAction::Quit => app.controller.request_full_quit(),
                },
            }
        }
        Event::LoopExiting => {
            if let Some(app) = running.take() {
                if let Some(poller) = app.poller {
                    poller.shutdown();
                }
                app.controller.shutdown();
            }
            info!("{} event loop exiting", role.as_arg());
        }
        _ => {}
    });

    run_result.context("event loop terminated unexpectedly")
}

fn create_window(event_loop: &ActiveEventLoop, role: ProcessRole, config: &AppConfig) -> Result<Window> {
    let mut attributes = Window::default_attributes().with_title(role.window_title());
    match role {
        ProcessRole::Main => {
            let fallback = AppConfig::default();
            let (width, height) = config
                .main_window_size()
                .unwrap_or((fallback.window_width, fallback.window_height));
            attributes = attributes.with_inner_size(LogicalSize::new(width, height));
        }
        ProcessRole::Ball => {
            attributes = attributes
                .with_inner_size(PhysicalSize::new(
                    WIDGET_WINDOW_WIDTH as u32,
                    WIDGET_WINDOW_HEIGHT as u32,
                ))
                .with_decorations(false)
                .with_resizable(false)
                .with_window_level(WindowLevel::AlwaysOnTop);
            #[cfg(target_os = "windows")]
            {
                use winit::platform::windows::WindowAttributesExtWindows;
                attributes = attributes.with_skip_taskbar(true);
            }
        }
    }
    event_loop
        .create_window(attributes)
        .context("failed to create window")
}

fn handle_window_event(
    app: &Running,
    role: ProcessRole,
    button_down: &AtomicBool,
    event_loop: &ActiveEventLoop,
    event: WindowEvent,
) {
    match event {
        WindowEvent::CloseRequested => match app.controller.handle_close_request() {
            CloseDecision::Allow => event_loop.exit(),
            CloseDecision::Suppress if role == ProcessRole::Main => {
                // Hide to tray where there is one, otherwise get out of the way.
                if cfg!(any(target_os = "windows", target_os = "macos")) {
                    app.window.set_visible(false);
                } else {
                    app.window.set_minimized(true);
                }
            }
            CloseDecision::Suppress => {}
        },
        WindowEvent::MouseInput {
            state: ElementState::Pressed,
            button: MouseButton::Left,
            ..
        } if role == ProcessRole::Ball => match app.controller.dock_state().side() {
            Some(side) => app.controller.undock(side),
            None if !on_ball(app) => {}
            None => {
                button_down.store(true, Ordering::SeqCst);
                if let Err(e) = app.window.drag_window() {
                    debug!("Drag not started: {}", e);
                }
            }
        },
        WindowEvent::MouseInput {
            state: ElementState::Released,
            button: MouseButton::Left,
            ..
        }
        | WindowEvent::CursorEntered { .. } => {
            button_down.store(false, Ordering::SeqCst);
        }
        WindowEvent::CursorMoved { position, .. } => app.cursor_x.set(Some(position.x)),
        WindowEvent::CursorLeft { .. } => app.cursor_x.set(None),
        WindowEvent::MouseInput {
            state: ElementState::Pressed,
            button: MouseButton::Right,
            ..
        } if role == ProcessRole::Ball => app.controller.open_main(),
        _ => {}
    }
}

/// Presses in the transparent padding around the ball are ignored.
fn on_ball(app: &Running) -> bool {
    let width = app.window.inner_size().width as i32;
    app.cursor_x.get().is_none_or(|x| ball_contains(width, x))
}

fn refresh_icons(window: &Window, controller: &AppController) {
    let icon = icon_for(&controller.config(), &controller.summary());
    match icon.to_window_icon() {
        Ok(icon) => window.set_window_icon(Some(icon)),
        Err(e) => warn!("Window icon not updated: {:#}", e),
    }
}

#[cfg(any(target_os = "windows", target_os = "macos"))]
fn build_tray(storage: &Storage) -> Result<TrayIcon> {
    let summary = TodoSummary::from_todos(&storage.todos(), chrono::Utc::now());
    let icon = icon_for(&storage.config(), &summary)
        .to_tray_icon()
        .context("failed to create tray icon image")?;
    let menu = build_menu().context("failed to build tray menu")?;
    let tray_icon = TrayIconBuilder::new()
        .with_icon(icon)
        .with_menu(Box::new(menu))
        .with_tooltip(build_tooltip(&summary))
        .build()
        .context("failed to create tray icon")?;
    tray_icon
        .set_visible(true)
        .context("failed to show tray icon")?;
    Ok(tray_icon)
}

#[cfg(any(target_os = "windows", target_os = "macos"))]
fn update_tray_display(tray_icon: &TrayIcon, controller: &AppController) {
    let summary = controller.summary();
    if let Ok(icon) = icon_for(&controller.config(), &summary).to_tray_icon() {
        let _ = tray_icon.set_icon(Some(icon));
    }

    let tooltip = build_tooltip(&summary);
    if let Err(err) = tray_icon.set_tooltip(Some(tooltip.as_str())) {
        error!("Failed to update tooltip: {}", err);
    }
}
