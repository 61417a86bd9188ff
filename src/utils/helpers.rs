//! Helpers for lookout.
//!
//! - Color parsing from names or hex codes
//! - Home and state directory lookup
//! - Displaying home directories as "~" in local addresses
//! - Clamping numeric settings with a warning

use crate::core::address::{PathAddress, Scheme};

use ratatui::style::Color;

use std::fmt::Display;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

/// Parses a string (color name or hex) into a ratatui::style::Color
///
/// Supports standard names (red, green, etc.) as well as hex values (#RRGGBB or #RGB)
pub fn parse_color(s: &str) -> Color {
    match s.to_lowercase().as_str() {
        "default" | "reset" => Color::Reset,
        "yellow" => Color::Yellow,
        "red" => Color::Red,
        "blue" => Color::Blue,
        "green" => Color::Green,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "white" => Color::White,
        "black" => Color::Black,
        "gray" => Color::Gray,
        "darkgray" => Color::DarkGray,
        _ => {
            let Some(hex) = s.strip_prefix('#') else {
                return Color::Reset;
            };
            let expanded = match hex.len() {
                6 => hex.to_string(),
                3 => hex.chars().flat_map(|c| [c, c]).collect(),
                _ => return Color::Reset,
            };
            match u32::from_str_radix(&expanded, 16) {
                Ok(rgb) => Color::Rgb(
                    ((rgb >> 16) & 0xFF) as u8,
                    ((rgb >> 8) & 0xFF) as u8,
                    (rgb & 0xFF) as u8,
                ),
                Err(_) => Color::Reset,
            }
        }
    }
}

#[inline]
pub fn get_home() -> Option<PathBuf> {
    dirs::home_dir()
}

/// Directory for log files: `$XDG_STATE_HOME/lookout`, falling back to the platform state
/// or data directory.
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME")
        && !xdg.trim().is_empty()
    {
        return Some(PathBuf::from(xdg).join("lookout"));
    }
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|d| d.join("lookout"))
}

/// Shortens the home directory prefix of a path to "~".
pub fn shorten_home_path<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    if let Some(home_dir) = get_home()
        && let Ok(stripped) = path.strip_prefix(&home_dir)
    {
        if stripped.as_os_str().is_empty() {
            return "~".to_string();
        }
        let mut short = stripped.display().to_string();
        if short.starts_with(MAIN_SEPARATOR) {
            short.remove(0);
        }
        return format!("~{}{}", MAIN_SEPARATOR, short);
    }
    path.display().to_string()
}

/// Address as shown in the header. Local paths get the "~" treatment.
pub fn display_address(addr: &PathAddress) -> String {
    if addr.scheme() == Scheme::Local
        && let Some(path) = addr.to_local_path()
    {
        return shorten_home_path(path);
    }
    addr.to_string()
}

/// Clamps a numeric setting to `min..=max`, warning when the configured value was out of range.
pub fn clamp_setting<T>(name: &str, value: T, min: T, max: T) -> T
where
    T: PartialOrd + Copy + Display,
{
    let clamped = if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    };
    if clamped != value {
        tracing::warn!(
            setting = name,
            value = %value,
            clamped = %clamped,
            "setting out of range ({min}..={max})"
        );
    }
    clamped
}
