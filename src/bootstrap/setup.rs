//! Setup/initialization module - handles application startup tasks
//!
//! Includes:
//! - Logger initialization
//! - Folder structure initialization

use anstyle::{AnsiColor, Style};
use anyhow::{Context, Result};
use env_logger::{Builder, Env, WriteStyle};
use log::info;
use log::kv::Key;
use std::io::Write;
use std::path::Path;

// ────────────────────────────────────────────────────────────────
// Folder Initialization
// ────────────────────────────────────────────────────────────────

/// Create the processed-image folder if it does not exist yet.
pub fn initialize_folder(processed_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(processed_dir).with_context(|| {
        format!(
            "Failed to create processed folder {}",
            processed_dir.display()
        )
    })?;
    info!("Processed images are stored in {}", processed_dir.display());
    Ok(())
}

// ────────────────────────────────────────────────────────────────
// Logger Initialization
// ────────────────────────────────────────────────────────────────

const DIM: Style = Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::BrightBlack)));
const CYAN: Style = Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Cyan)));

/// Reformat a `duration` kv such as `12.3456ms` into `12.35 ms`.
fn format_duration(raw: &str) -> String {
    if let Some(idx) = raw.find(|c: char| c.is_alphabetic()) {
        let (num, unit) = (&raw[..idx], &raw[idx..]);
        if let Ok(val) = num.parse::<f32>() {
            return format!("{:.2} {}", val, unit);
        }
    }
    raw.to_string()
}

/// Initialize the global logger. `RUST_LOG` overrides the default filters.
pub fn initialize_logger() {
    let result = Builder::from_env(Env::default().default_filter_or("info,rocket=warn"))
        .write_style(WriteStyle::Auto)
        .format(|buf, record| {
            let ts = buf.timestamp();
            let level_style = buf.default_level_style(record.level());

            let dur_raw = record
                .key_values()
                .get(Key::from("duration"))
                .map(|v| format_duration(&v.to_string()))
                .unwrap_or_default();

            // Right-align the duration field to width 10
            let dur = if dur_raw.is_empty() {
                " ".repeat(10)
            } else {
                format!("{CYAN}{:>10}{CYAN:#}", dur_raw)
            };

            writeln!(
                buf,
                "{DIM}{ts}{DIM:#} {level_style}{}{level_style:#} {DIM}{}{DIM:#}",
                record.level(),
                record.target()
            )?;

            let message = format!("{}", record.args());
            let subsequent_indent = " ".repeat(11);
            let mut lines = message.lines();

            if let Some(first_line) = lines.next() {
                writeln!(buf, "{} {}", dur, first_line)?;
            }
            for line in lines {
                writeln!(buf, "{}{}", subsequent_indent, line)?;
            }

            Ok(())
        })
        .try_init();

    if let Err(error) = result {
        eprintln!("Logger already initialized: {}", error);
    }
}
