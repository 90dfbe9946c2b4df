pub mod app;
pub use app::run;

pub mod config;
pub mod controller;
pub mod dock;
pub mod error;
pub mod events;
pub mod model;
pub mod storage;
pub mod supervisor;

// Cross-process signalling and single-instance guards
pub mod sync;

// Platform abstraction layer
pub mod platform;

// UI modules (cross-platform)
pub mod ui {
    pub mod icon;
    pub mod menu;
}
