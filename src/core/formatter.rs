//! Display formatting for entries, sizes, times and preview lines.
//!
//! Pure helpers used by the UI to turn engine values into fixed-width terminal text.

use crate::core::backend::DirectoryEntry;
use crate::core::error::ErrorKind;

use chrono::{DateTime, Local};
use humansize::{DECIMAL, format_size};
use unicode_width::UnicodeWidthChar;

use std::time::{Duration, SystemTime};

/// Formats a size in decimal units, or "-" for directories and unknown sizes.
pub fn format_file_size(size: Option<u64>, is_dir: bool) -> String {
    match size {
        Some(sz) if !is_dir => format_size(sz, DECIMAL),
        _ => "-".to_string(),
    }
}

/// Formats a modification time in local time, or "-" if unknown.
pub fn format_file_time(modified: Option<SystemTime>) -> String {
    modified
        .map(|mtime| {
            let dt: DateTime<Local> = DateTime::from(mtime);
            dt.format("%Y-%m-%d %H:%M:%S").to_string()
        })
        .unwrap_or_else(|| "-".to_string())
}

/// Short age like "4s", "3m" or "2h".
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h", secs / 3600)
    }
}

/// Name as shown in the tree. Directories get a trailing slash.
pub fn display_name(entry: &DirectoryEntry) -> String {
    if entry.is_dir() {
        format!("{}/", entry.name())
    } else {
        entry.name().to_string()
    }
}

/// One-line summary of an entry for the status bar.
pub fn entry_summary(entry: &DirectoryEntry) -> String {
    let mut parts = vec![
        format_file_size(entry.size(), entry.is_dir()),
        format_file_time(entry.modified()),
    ];
    if let Some(mode) = entry.metadata().get("mode") {
        parts.push(mode.clone());
    }
    if let Some(target) = entry.metadata().get("symlink") {
        parts.push(format!("-> {target}"));
    }
    parts.join("  ")
}

/// Message shown in the preview pane for a failed fetch.
pub fn error_banner(kind: ErrorKind, message: &str) -> String {
    format!("[{}: {}]", kind.label(), message)
}

/// Cleans a line to the exact pane width.
///
/// Control characters are dropped, tabs expand to the next multiple of 4, and the result
/// is cut or padded with spaces so its display width is exactly `pane_width`.
pub fn sanitize_to_exact_width(line: &str, pane_width: usize) -> String {
    let mut out = String::with_capacity(pane_width);
    let mut current_w = 0;

    for ch in line.chars() {
        if ch == '\t' {
            let space_count = 4 - (current_w % 4);
            if current_w + space_count > pane_width {
                break;
            }
            out.push_str(&" ".repeat(space_count));
            current_w += space_count;
            continue;
        }

        if ch.is_control() {
            continue;
        }

        let w = ch.width().unwrap_or(0);
        if current_w + w > pane_width {
            break;
        }

        out.push(ch);
        current_w += w;
    }

    if current_w < pane_width {
        out.push_str(&" ".repeat(pane_width - current_w));
    }

    out
}

/// Like [sanitize_to_exact_width] but without padding.
pub fn sanitize_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut col = 0;
    for ch in line.chars() {
        match ch {
            '\t' => {
                let n = 4 - (col % 4);
                out.push_str(&" ".repeat(n));
                col += n;
            }
            c if c.is_control() => {}
            c => {
                out.push(c);
                col += c.width().unwrap_or(0);
            }
        }
    }
    out
}
