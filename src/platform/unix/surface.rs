use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::window::Window;

use crate::error::GeometryUnavailable;
use crate::model::{MonitorInfo, Rect};
use crate::platform::WidgetSurface;

/// Widget geometry read straight from the local winit window.
///
/// winit exposes no pointer state outside the event loop, so the loop keeps
/// `button_down` current from mouse input events.
pub struct WinitSurface {
    window: Arc<Window>,
    button_down: Arc<AtomicBool>,
}

impl WinitSurface {
    pub fn new(window: Arc<Window>, button_down: Arc<AtomicBool>) -> Self {
        Self {
            window,
            button_down,
        }
    }
}

impl WidgetSurface for WinitSurface {
    fn window_rect(&self) -> Result<Rect, GeometryUnavailable> {
        let position = self
            .window
            .outer_position()
            .map_err(|_| GeometryUnavailable)?;
        let size = self.window.outer_size();
        Ok(Rect::from_origin(
            position.x,
            position.y,
            size.width as i32,
            size.height as i32,
        ))
    }

    fn monitor(&self) -> Result<MonitorInfo, GeometryUnavailable> {
        let monitor = self.window.current_monitor().ok_or(GeometryUnavailable)?;
        let position = monitor.position();
        let size = monitor.size();
        let bounds = Rect::from_origin(
            position.x,
            position.y,
            size.width as i32,
            size.height as i32,
        );
        // No work-area query here; the full monitor stands in for it.
        Ok(MonitorInfo {
            bounds,
            work: bounds,
        })
    }

    fn set_bounds(&self, bounds: Rect) -> Result<(), GeometryUnavailable> {
        if bounds.width() <= 0 || bounds.height() <= 0 {
            return Err(GeometryUnavailable);
        }
        self.window
            .set_outer_position(PhysicalPosition::new(bounds.left, bounds.top));
        let _ = self.window.request_inner_size(PhysicalSize::new(
            bounds.width() as u32,
            bounds.height() as u32,
        ));
        Ok(())
    }

    fn primary_button_down(&self) -> bool {
        self.button_down.load(Ordering::SeqCst)
    }
}
