//! Output formatting and management
//!
//! Outcomes are written as they arrive so long sweeps show progress; the
//! summary follows once the run is over.

use crate::error::SweepError;
use crate::probe::{ProbeOutcome, ProbeResult};
use crate::sweep::SweepSummary;
use crate::utils::format_duration;
use colored::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Output format options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum OutputFormat {
    Text,
    /// One JSON object per line
    Json,
    Csv,
    Greppable,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" | "jsonl" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "greppable" | "grep" => Ok(OutputFormat::Greppable),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub file: Option<String>,
    pub colored: bool,
    /// Also write hosts without access
    pub show_all: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            file: None,
            colored: true,
            show_all: false,
        }
    }
}

type BoxedWriter = Box<dyn Write + Send>;

enum Destination {
    Plain(BoxedWriter),
    Csv(csv::Writer<BoxedWriter>),
}

#[derive(Serialize)]
struct CsvRow<'a> {
    target: &'a str,
    status: &'static str,
    reason: &'a str,
    failed: bool,
    elapsed_ms: u64,
    completed_at: String,
}

/// Main output manager
pub struct OutputManager {
    config: OutputConfig,
    destination: Destination,
}

impl OutputManager {
    /// Open the configured destination (stdout or a file)
    pub fn new(mut config: OutputConfig) -> Result<Self, SweepError> {
        let writer: BoxedWriter = match &config.file {
            Some(path) => {
                config.colored = false;
                Box::new(BufWriter::new(File::create(path)?))
            }
            None => Box::new(io::stdout()),
        };
        Ok(Self::with_writer(config, writer))
    }

    pub fn with_writer(config: OutputConfig, writer: BoxedWriter) -> Self {
        let destination = match config.format {
            OutputFormat::Csv => Destination::Csv(csv::Writer::from_writer(writer)),
            _ => Destination::Plain(writer),
        };
        Self { config, destination }
    }

    fn wants(&self, outcome: &ProbeOutcome) -> bool {
        self.config.show_all || outcome.result.has_access()
    }

    /// Write one outcome, unless it is filtered out
    pub fn write_outcome(&mut self, outcome: &ProbeOutcome) -> Result<(), SweepError> {
        if !self.wants(outcome) {
            return Ok(());
        }

        let line = match self.config.format {
            OutputFormat::Text => Some(self.format_text(outcome)),
            OutputFormat::Json => Some(serde_json::to_string(outcome)?),
            OutputFormat::Greppable => Some(Self::format_greppable(outcome)),
            OutputFormat::Csv => None,
        };

        match (&mut self.destination, line) {
            (Destination::Plain(writer), Some(line)) => {
                writeln!(writer, "{}", line)?;
                writer.flush()?;
            }
            (Destination::Csv(writer), _) => {
                writer.serialize(CsvRow {
                    target: outcome.target.as_str(),
                    status: outcome.result.label(),
                    reason: outcome.reason().unwrap_or(""),
                    failed: outcome.failed,
                    elapsed_ms: outcome.elapsed.as_millis() as u64,
                    completed_at: outcome.completed_at.to_rfc3339(),
                })?;
                writer.flush()?;
            }
            (Destination::Plain(_), None) => {}
        }

        Ok(())
    }

    /// Write the end-of-run summary in the current format
    pub fn write_summary(&mut self, summary: &SweepSummary) -> Result<(), SweepError> {
        let text = match self.config.format {
            OutputFormat::Text => self.format_summary(summary),
            OutputFormat::Json => {
                serde_json::to_string(&serde_json::json!({ "summary": summary }))?
            }
            OutputFormat::Greppable => format!(
                "# hostsweep {} done: {} hosts, {} access, {} no-access, {} unreachable, {:.2}s",
                summary.run_id,
                summary.probed(),
                summary.access,
                summary.no_access,
                summary.unreachable,
                summary.duration.as_secs_f64()
            ),
            // A trailing summary would break the CSV table
            OutputFormat::Csv => return Ok(()),
        };

        if let Destination::Plain(writer) = &mut self.destination {
            writeln!(writer, "{}", text)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Flush everything to the destination
    pub fn finish(&mut self) -> Result<(), SweepError> {
        match &mut self.destination {
            Destination::Plain(writer) => writer.flush()?,
            Destination::Csv(writer) => writer.flush()?,
        }
        Ok(())
    }

    fn format_text(&self, outcome: &ProbeOutcome) -> String {
        let elapsed = outcome.elapsed.as_millis();
        match &outcome.result {
            ProbeResult::ReachableAccess => format!(
                "{} {} ({}ms)",
                self.colorize("[+]", Color::BrightGreen),
                self.colorize(outcome.target.as_str(), Color::BrightGreen),
                elapsed
            ),
            ProbeResult::ReachableNoAccess => format!(
                "{} {} reachable, no access ({}ms)",
                self.colorize("[-]", Color::Yellow),
                outcome.target,
                elapsed
            ),
            ProbeResult::Unreachable { reason } => format!(
                "{} {} unreachable{}",
                self.colorize("[!]", Color::BrightBlack),
                outcome.target,
                reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default()
            ),
        }
    }

    fn format_greppable(outcome: &ProbeOutcome) -> String {
        format!(
            "Host: {}\tStatus: {}\tElapsed: {}ms",
            outcome.target,
            outcome.result.label(),
            outcome.elapsed.as_millis()
        )
    }

    fn format_summary(&self, summary: &SweepSummary) -> String {
        let mut out = String::new();
        out.push('\n');
        out.push_str(&self.colorize("Sweep summary", Color::BrightCyan));
        out.push('\n');
        out.push_str(&format!("  Run id:      {}\n", summary.run_id));
        out.push_str(&format!("  Targets:     {}\n", summary.targets));
        out.push_str(&format!(
            "  Access:      {}\n",
            self.colorize(&summary.access.to_string(), Color::BrightGreen)
        ));
        out.push_str(&format!("  No access:   {}\n", summary.no_access));
        out.push_str(&format!("  Unreachable: {}\n", summary.unreachable));
        if summary.failures > 0 {
            out.push_str(&format!(
                "  Failures:    {}\n",
                self.colorize(&summary.failures.to_string(), Color::BrightRed)
            ));
        }
        out.push_str(&format!("  Duration:    {}", format_duration(summary.duration)));
        if summary.cancelled {
            out.push('\n');
            out.push_str(&self.colorize("  Sweep was cancelled before all hosts were probed", Color::Yellow));
        }
        out
    }

    /// Apply color formatting if enabled
    fn colorize(&self, text: &str, color: Color) -> String {
        if !self.config.colored {
            return text.to_string();
        }
        text.color(color).bold().to_string()
    }
}
