//! Rendering shared by `list`, `info` and `metrics`.

use boxlease::BoxStatus;
use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use comfy_table::Color;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format selected with `--format`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Render `data`. `table` is only called for the table format.
    pub fn render<T, F>(self, data: &T, table: F) -> anyhow::Result<String>
    where
        T: Serialize,
        F: FnOnce(&T) -> String,
    {
        Ok(match self {
            Self::Table => table(data),
            Self::Json => serde_json::to_string_pretty(data)?,
            Self::Yaml => serde_yaml::to_string(data)?.trim_end().to_string(),
        })
    }
}

/// Status colour in box tables (only applied on a terminal).
pub fn status_color(status: BoxStatus) -> Color {
    match status {
        BoxStatus::Running => Color::Green,
        BoxStatus::Starting => Color::Yellow,
        BoxStatus::Stopped => Color::DarkGrey,
        BoxStatus::Failed => Color::Red,
    }
}

/// How long ago `then` was, e.g. `3 minutes ago`.
pub fn age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    let (n, unit) = match secs {
        0 => return "just now".to_string(),
        1..=59 => (secs, "second"),
        60..=3_599 => (secs / 60, "minute"),
        3_600..=86_399 => (secs / 3_600, "hour"),
        _ => (secs / 86_400, "day"),
    };
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

/// Absolute UTC timestamp, second precision.
pub fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Binary-prefixed size, e.g. `5.5 MiB`.
pub fn bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// A box's allotment as shown in tables, e.g. `2 CPU / 512.0 MiB`.
pub fn resources(cpus: u8, memory_mib: u32) -> String {
    format!("{} CPU / {}", cpus, bytes(u64::from(memory_mib) * 1024 * 1024))
}

/// `-` for values a box does not have (no pid while stopped, no name).
pub fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

/// Bordered table for `tabled` rows.
pub fn grid<T: Tabled>(rows: impl IntoIterator<Item = T>) -> String {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}
