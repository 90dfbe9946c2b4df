use std::fs;

use anyhow::{Result, anyhow};
use log::warn;
use png::Decoder;

use crate::config::{AppConfig, BallStyle};
use crate::model::TodoSummary;

pub const ICON_SIZE: u32 = 64;
const FALLBACK_COLOR: [u8; 3] = [0x2e, 0xcc, 0x71];

/// Decoded RGBA image, convertible to a window or tray icon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IconImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl IconImage {
    pub fn to_window_icon(&self) -> Result<winit::window::Icon> {
        winit::window::Icon::from_rgba(self.rgba.clone(), self.width, self.height)
            .map_err(|e| anyhow!("failed to create window icon: {e}"))
    }

    #[cfg(any(target_os = "windows", target_os = "macos"))]
    pub fn to_tray_icon(&self) -> Result<tray_icon::Icon> {
        tray_icon::Icon::from_rgba(self.rgba.clone(), self.width, self.height)
            .map_err(|e| anyhow!("failed to create icon: {e}"))
    }
}

/// Icon for the current state: the custom PNG when configured, otherwise a
/// disc in the theme colour, or the reminder colour when something is due.
pub fn icon_for(config: &AppConfig, summary: &TodoSummary) -> IconImage {
    if config.floating_ball_mode == BallStyle::Custom && !config.custom_icon_path.is_empty() {
        match fs::read(&config.custom_icon_path)
            .map_err(|e| anyhow!("failed to read {}: {e}", config.custom_icon_path))
            .and_then(|bytes| load_png_icon(&bytes))
        {
            Ok(icon) => return icon,
            Err(e) => warn!("Falling back to the standard icon: {}", e),
        }
    }

    let color = if summary.is_urgent() {
        &config.reminder_color
    } else {
        &config.theme_color
    };
    disc_icon(parse_hex_color(color).unwrap_or(FALLBACK_COLOR), ICON_SIZE)
}

/// Parses `#rrggbb` or `#rgb` (the `#` is optional).
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    match hex.len() {
        6 => {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
            Some([channel(0)?, channel(2)?, channel(4)?])
        }
        3 => {
            let channel = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|v| v * 17);
            Some([channel(0)?, channel(1)?, channel(2)?])
        }
        _ => None,
    }
}

/// Filled circle with a one-pixel soft edge on a transparent square.
pub fn disc_icon(color: [u8; 3], size: u32) -> IconImage {
    let mut rgba = Vec::with_capacity((size * size * 4) as usize);
    let center = size as f32 / 2.0;
    let radius = center - 1.0;
    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            let distance = (dx * dx + dy * dy).sqrt();
            let coverage = (radius - distance + 0.5).clamp(0.0, 1.0);
            rgba.extend_from_slice(&color);
            rgba.push((coverage * 255.0).round() as u8);
        }
    }
    IconImage {
        rgba,
        width: size,
        height: size,
    }
}

pub fn load_png_icon(png_data: &[u8]) -> Result<IconImage> {
    let decoder = Decoder::new(png_data);
    let mut reader = decoder
        .read_info()
        .map_err(|e| anyhow!("failed to read PNG header: {e}"))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| anyhow!("failed to decode PNG: {e}"))?;

    let width = info.width;
    let height = info.height;

    // Convert to RGBA if needed
    let rgba = match info.color_type {
        png::ColorType::Rgba => buf[..info.buffer_size()].to_vec(),
        png::ColorType::Rgb => {
            let mut rgba = Vec::with_capacity((width * height * 4) as usize);
            for chunk in buf[..info.buffer_size()].chunks(3) {
                rgba.extend_from_slice(chunk);
                rgba.push(255);
            }
            rgba
        }
        png::ColorType::GrayscaleAlpha => {
            let mut rgba = Vec::with_capacity((width * height * 4) as usize);
            for chunk in buf[..info.buffer_size()].chunks(2) {
                let gray = chunk[0];
                let alpha = chunk[1];
                rgba.extend_from_slice(&[gray, gray, gray, alpha]);
            }
            rgba
        }
        png::ColorType::Grayscale => {
            let mut rgba = Vec::with_capacity((width * height * 4) as usize);
            for &gray in &buf[..info.buffer_size()] {
                rgba.extend_from_slice(&[gray, gray, gray, 255]);
            }
            rgba
        }
        png::ColorType::Indexed => {
            return Err(anyhow!("indexed PNG not supported for the widget icon"));
        }
    };

    Ok(IconImage {
        rgba,
        width,
        height,
    })
}
