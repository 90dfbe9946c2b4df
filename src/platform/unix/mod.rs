//! Unix platform implementations: flock/FIFO named objects, pid-based peer
//! lookup, winit-backed widget geometry and auto-launch.

pub mod launch;
pub mod signals;
pub mod surface;
pub mod window;

pub use launch::AutoLaunchItem;
pub use signals::UnixSignals;
pub use surface::WinitSurface;
pub use window::PidPeers;
