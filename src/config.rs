use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const TODOS_FILE: &str = "todos.json";
pub const CONFIG_FILE: &str = "config.json";
pub const LAUNCH_LOG_FILE: &str = "startup.log";

const DATA_DIR_ENV: &str = "TODOBALL_DATA_DIR";
const APP_DIR_NAME: &str = "TodoBall";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_theme_color")]
    pub theme_color: String,
    #[serde(default = "default_floating_opacity")]
    pub floating_opacity: f64,
    #[serde(default)]
    pub custom_icon_path: String,
    #[serde(default = "default_edge_light_color")]
    pub edge_light_color: String,
    #[serde(default = "default_reminder_color")]
    pub reminder_color: String,
    #[serde(default)]
    pub start_on_boot: bool,
    #[serde(default)]
    pub notification_days: u32,
    #[serde(default)]
    pub floating_ball_mode: BallStyle,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BallStyle {
    #[default]
    Standard,
    Custom,
}

fn default_theme_color() -> String {
    "#2ecc71".to_string()
}

fn default_floating_opacity() -> f64 {
    1.0
}

fn default_edge_light_color() -> String {
    "#2ecc71".to_string()
}

fn default_reminder_color() -> String {
    "#e74c3c".to_string()
}

fn default_window_width() -> u32 {
    1080
}

fn default_window_height() -> u32 {
    720
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            theme_color: default_theme_color(),
            floating_opacity: default_floating_opacity(),
            custom_icon_path: String::new(),
            edge_light_color: default_edge_light_color(),
            reminder_color: default_reminder_color(),
            start_on_boot: false,
            notification_days: 0,
            floating_ball_mode: BallStyle::Standard,
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

impl AppConfig {
    /// Main window size, if the stored one is usable.
    pub fn main_window_size(&self) -> Option<(u32, u32)> {
        (self.window_width > 0 && self.window_height > 0)
            .then_some((self.window_width, self.window_height))
    }
}

/// Directory holding the todo file, the config file and the launch log.
///
/// Both processes must resolve the same directory, so this only depends on
/// the environment and the executable location.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = dirs::data_local_dir() {
        return dir.join(APP_DIR_NAME);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}
