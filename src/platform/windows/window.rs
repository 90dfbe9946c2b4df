//! Win32 window lookup by title, widget geometry and widget chrome.

use std::ffi::c_void;
use std::io;

use log::debug;
use windows::Win32::Foundation::{HWND, LPARAM, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    GetMonitorInfoW, MONITOR_DEFAULTTONEAREST, MONITORINFO, MonitorFromWindow,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{GetAsyncKeyState, VK_LBUTTON};
use windows::Win32::UI::WindowsAndMessaging::{
    FindWindowW, GWL_EXSTYLE, GWL_STYLE, GetWindowLongW, GetWindowRect, HWND_TOPMOST,
    PostMessageW, SW_RESTORE, SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE,
    SWP_NOZORDER, SetForegroundWindow, SetWindowLongW, SetWindowPos, ShowWindow, WM_CLOSE,
    WS_CAPTION, WS_EX_APPWINDOW, WS_EX_TOOLWINDOW, WS_POPUP, WS_SYSMENU, WS_THICKFRAME,
};
use windows::core::{HSTRING, PCWSTR};

use crate::error::{GeometryUnavailable, PlatformError};
use crate::model::{MonitorInfo, ProcessRole, Rect};
use crate::platform::{PeerWindow, PeerWindows, WidgetSurface};

fn find_window(title: &str) -> Option<HWND> {
    let title = HSTRING::from(title);
    // SAFETY: both strings outlive the call
    unsafe { FindWindowW(PCWSTR::null(), &title) }
        .ok()
        .filter(|hwnd| !hwnd.is_invalid())
}

fn to_rect(rc: RECT) -> Rect {
    Rect::new(rc.left, rc.top, rc.right, rc.bottom)
}

fn hwnd_of(window: PeerWindow) -> HWND {
    HWND(window.0 as *mut c_void)
}

/// The widget window, looked up by its title on every call.
pub struct Win32Surface {
    title: &'static str,
}

impl Win32Surface {
    pub fn new(role: ProcessRole) -> Self {
        Self {
            title: role.window_title(),
        }
    }

    fn hwnd(&self) -> Result<HWND, GeometryUnavailable> {
        find_window(self.title).ok_or(GeometryUnavailable)
    }
}

impl WidgetSurface for Win32Surface {
    fn window_rect(&self) -> Result<Rect, GeometryUnavailable> {
        let hwnd = self.hwnd()?;
        let mut rect = RECT::default();
        // SAFETY: hwnd was just returned by FindWindowW; rect is a valid out pointer
        unsafe { GetWindowRect(hwnd, &mut rect) }.map_err(|_| GeometryUnavailable)?;
        Ok(to_rect(rect))
    }

    fn monitor(&self) -> Result<MonitorInfo, GeometryUnavailable> {
        let hwnd = self.hwnd()?;
        let mut info = MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFO>() as u32,
            ..Default::default()
        };
        // SAFETY: info is sized and outlives the call
        let ok = unsafe {
            let monitor = MonitorFromWindow(hwnd, MONITOR_DEFAULTTONEAREST);
            GetMonitorInfoW(monitor, &mut info).as_bool()
        };
        if !ok {
            return Err(GeometryUnavailable);
        }
        Ok(MonitorInfo {
            bounds: to_rect(info.rcMonitor),
            work: to_rect(info.rcWork),
        })
    }

    fn set_bounds(&self, bounds: Rect) -> Result<(), GeometryUnavailable> {
        let hwnd = self.hwnd()?;
        // SAFETY: plain call on a live window handle
        unsafe {
            SetWindowPos(
                hwnd,
                HWND::default(),
                bounds.left,
                bounds.top,
                bounds.width(),
                bounds.height(),
                SWP_NOZORDER | SWP_NOACTIVATE,
            )
        }
        .map_err(|_| GeometryUnavailable)
    }

    fn primary_button_down(&self) -> bool {
        // SAFETY: no pointers involved
        unsafe { GetAsyncKeyState(VK_LBUTTON.0 as i32) < 0 }
    }
}

#[derive(Default)]
pub struct Win32Peers;

impl PeerWindows for Win32Peers {
    fn find(&self, role: ProcessRole) -> Option<PeerWindow> {
        find_window(role.window_title()).map(|hwnd| PeerWindow(hwnd.0 as isize))
    }

    fn activate(&self, window: PeerWindow) {
        let hwnd = hwnd_of(window);
        // SAFETY: stale handles make these calls fail harmlessly
        unsafe {
            let _ = ShowWindow(hwnd, SW_RESTORE);
            let _ = SetForegroundWindow(hwnd);
        }
    }

    fn request_close(&self, window: PeerWindow) {
        // SAFETY: posting to a stale handle fails harmlessly
        if let Err(e) = unsafe { PostMessageW(hwnd_of(window), WM_CLOSE, WPARAM(0), LPARAM(0)) } {
            debug!("WM_CLOSE not delivered: {}", e);
        }
    }

    fn apply_widget_chrome(&self, window: PeerWindow) -> Result<(), PlatformError> {
        let hwnd = hwnd_of(window);
        // SAFETY: style words are read and written on the same live handle
        unsafe {
            let style = GetWindowLongW(hwnd, GWL_STYLE) as u32;
            let style = (style & !(WS_CAPTION.0 | WS_THICKFRAME.0 | WS_SYSMENU.0)) | WS_POPUP.0;
            SetWindowLongW(hwnd, GWL_STYLE, style as i32);

            let ex_style = GetWindowLongW(hwnd, GWL_EXSTYLE) as u32;
            let ex_style = (ex_style & !WS_EX_APPWINDOW.0) | WS_EX_TOOLWINDOW.0;
            SetWindowLongW(hwnd, GWL_EXSTYLE, ex_style as i32);

            SetWindowPos(
                hwnd,
                HWND_TOPMOST,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_FRAMECHANGED,
            )
            .map_err(|_| {
                PlatformError::new("SetWindowPos", format!("{:?}", window), io::Error::last_os_error())
            })
        }
    }
}
