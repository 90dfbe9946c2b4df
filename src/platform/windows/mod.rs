//! Windows platform implementations: kernel named objects, Win32 window
//! lookup and chrome, and registry-based launch-at-login.

pub mod launch;
pub mod signals;
pub mod window;

pub use launch::RegistryLoginItem;
pub use signals::Win32Signals;
pub use window::{Win32Peers, Win32Surface};
