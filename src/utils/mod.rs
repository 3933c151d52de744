use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use url::Url;

use crate::domain::AppError;

static PERCENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("percent regex is valid"));
static ANSI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("ANSI regex is valid"));

/// Check a user-supplied media URL before it goes anywhere near the network.
/// Returns the trimmed URL.
pub fn validate_url(input: &str, max_len: usize) -> Result<String, AppError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("please enter a URL".to_string()));
    }
    if trimmed.len() > max_len {
        return Err(AppError::Validation(format!(
            "URL is longer than {} characters",
            max_len
        )));
    }

    let parsed =
        Url::parse(trimmed).map_err(|e| AppError::Validation(format!("{}: {}", trimmed, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::Validation(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(AppError::Validation("URL has no host".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Parse a progress string such as `" 42.3%"` into a percentage.
///
/// The backend forwards the downloader's display string, which may still
/// carry terminal colour codes.
pub fn parse_percent(raw: &str) -> Option<f32> {
    let cleaned = ANSI_PATTERN.replace_all(raw, "");
    let caps = PERCENT_PATTERN.captures(&cleaned)?;
    let value: f32 = caps[1].parse().ok()?;
    Some(value.clamp(0.0, 100.0))
}

/// Human readable size, e.g. `1.5 MB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// `H:MM:SS` or `M:SS`
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// `20240131` -> `2024-01-31`; anything else is returned unchanged.
pub fn format_upload_date(raw: &str) -> String {
    if raw.len() == 8 && raw.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..])
    } else {
        raw.to_string()
    }
}

/// Shorten a backend ISO timestamp to minutes.
pub fn format_timestamp(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// The backend stores files as `<download id>_<title>.<ext>`; drop the id.
pub fn display_filename(stored: &str, download_id: &str) -> String {
    let prefix = format!("{}_", download_id);
    stored.strip_prefix(&prefix).unwrap_or(stored).to_string()
}
