//! Utility modules for the sweeper

pub mod command;
pub mod file_input;
pub mod target_parser;

use crate::sweep::SweepSummary;
use std::time::Duration;

/// Logging utilities
pub struct Logger;

impl Logger {
    /// Initialize logger with specified level. `RUST_LOG` still wins when set.
    pub fn init(level: log::LevelFilter) {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(level).format_timestamp_secs();
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        // A second init (e.g. from tests) is harmless
        let _ = builder.try_init();
    }

    /// Log sweep start
    pub fn log_sweep_start(targets: usize, mode: &str, identity: Option<&str>) {
        log::info!(
            "Starting sweep of {} targets ({} mode, identity: {})",
            targets,
            mode,
            identity.unwrap_or("current")
        );
    }

    /// Log sweep completion
    pub fn log_sweep_complete(summary: &SweepSummary) {
        log::info!(
            "Sweep {} finished in {:.2}s - {}/{} hosts with access, {} unreachable, {} probe failures{}",
            summary.run_id,
            summary.duration.as_secs_f64(),
            summary.access,
            summary.probed(),
            summary.unreachable,
            summary.failures,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
    }
}

/// Format a duration the way the terminal summary prints it
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 3600.0 {
        format!("{}h {:02}m", duration.as_secs() / 3600, (duration.as_secs() % 3600) / 60)
    } else if secs >= 60.0 {
        format!("{}m {:02}s", duration.as_secs() / 60, duration.as_secs() % 60)
    } else {
        format!("{:.2}s", secs)
    }
}
