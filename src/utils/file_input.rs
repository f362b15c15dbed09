//! File input utilities for reading host lists
//!
//! Supported formats:
//! - Plain text, one host (or CIDR block) per line, `#` comments
//! - CSV with a `target` column
//! - JSON array of `{ "target": ... }` objects

use crate::target::Target;
use crate::utils::target_parser::TargetParser;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// File input handler for host list files
pub struct FileInputHandler {
    parser: TargetParser,
    max_targets: usize,
    deduplicate: bool,
}

/// Supported file formats for target input
#[derive(Debug, Clone, PartialEq)]
pub enum FileFormat {
    PlainText,
    Csv,
    Json,
}

/// Structured host record (CSV row or JSON object)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTarget {
    pub target: String,
    pub description: Option<String>,
}

/// File input statistics
#[derive(Debug, Clone)]
pub struct FileInputStats {
    pub total_entries: usize,
    pub valid_targets: usize,
    pub invalid_entries: usize,
    pub duplicates_removed: usize,
    pub file_format: FileFormat,
}

impl FileInputStats {
    fn new(file_format: FileFormat) -> Self {
        Self {
            total_entries: 0,
            valid_targets: 0,
            invalid_entries: 0,
            duplicates_removed: 0,
            file_format,
        }
    }
}

impl Default for FileInputHandler {
    fn default() -> Self {
        Self {
            parser: TargetParser::default(),
            max_targets: 100_000,
            deduplicate: true,
        }
    }
}

impl FileInputHandler {
    pub fn new(max_targets: usize, deduplicate: bool) -> Self {
        Self {
            parser: TargetParser::default(),
            max_targets,
            deduplicate,
        }
    }

    /// Read targets from a file with auto-format detection
    pub fn read_targets_from_file<P: AsRef<Path>>(
        &self,
        file_path: P,
    ) -> Result<(Vec<Target>, FileInputStats)> {
        let format = self.detect_file_format(&file_path)?;
        self.read_targets_with_format(file_path, format)
    }

    /// Read targets from a file with specified format
    pub fn read_targets_with_format<P: AsRef<Path>>(
        &self,
        file_path: P,
        format: FileFormat,
    ) -> Result<(Vec<Target>, FileInputStats)> {
        let file = File::open(&file_path)
            .with_context(|| format!("Failed to open file: {:?}", file_path.as_ref()))?;

        let mut stats = FileInputStats::new(format.clone());
        let entries = match format {
            FileFormat::PlainText => Self::plain_text_entries(file)?,
            FileFormat::Csv => Self::csv_entries(file, &mut stats),
            FileFormat::Json => Self::json_entries(file)?,
        };

        let targets = self.collect(entries, &mut stats);
        Ok((targets, stats))
    }

    /// Detect file format based on extension and content
    fn detect_file_format<P: AsRef<Path>>(&self, file_path: P) -> Result<FileFormat> {
        let path = file_path.as_ref();

        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            match extension.to_lowercase().as_str() {
                "txt" | "list" | "lst" => return Ok(FileFormat::PlainText),
                "csv" => return Ok(FileFormat::Csv),
                "json" => return Ok(FileFormat::Json),
                _ => {}
            }
        }

        let mut file = File::open(path)
            .with_context(|| format!("Failed to open file: {:?}", path))?;
        let mut buffer = [0; 1024];
        let bytes_read = file.read(&mut buffer)?;
        let content = String::from_utf8_lossy(&buffer[..bytes_read]);
        let head = content.trim_start();

        if head.starts_with('[') || head.starts_with('{') {
            Ok(FileFormat::Json)
        } else if head.lines().next().map(|l| l.trim().eq_ignore_ascii_case("target") || l.starts_with("target,")).unwrap_or(false) {
            Ok(FileFormat::Csv)
        } else {
            Ok(FileFormat::PlainText)
        }
    }

    fn plain_text_entries(file: File) -> Result<Vec<String>> {
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            entries.push(entry.to_string());
        }
        Ok(entries)
    }

    fn csv_entries(file: File, stats: &mut FileInputStats) -> Vec<String> {
        let mut reader = csv::Reader::from_reader(file);
        let mut entries = Vec::new();
        for record in reader.deserialize::<FileTarget>() {
            match record {
                Ok(row) => entries.push(row.target),
                Err(e) => {
                    stats.total_entries += 1;
                    stats.invalid_entries += 1;
                    log::warn!("Skipping malformed CSV row: {}", e);
                }
            }
        }
        entries
    }

    fn json_entries(mut file: File) -> Result<Vec<String>> {
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let rows: Vec<FileTarget> =
            serde_json::from_str(&content).context("Failed to parse JSON file")?;
        Ok(rows.into_iter().map(|row| row.target).collect())
    }

    fn collect(&self, entries: Vec<String>, stats: &mut FileInputStats) -> Vec<Target> {
        let mut targets = Vec::new();
        let mut seen = HashSet::new();

        for entry in entries {
            stats.total_entries += 1;

            let parsed = match self.parser.parse_target(&entry) {
                Ok(parsed) => parsed,
                Err(e) => {
                    stats.invalid_entries += 1;
                    log::warn!("Skipping invalid target {:?}: {}", entry, e);
                    continue;
                }
            };

            for target in parsed.targets {
                if targets.len() >= self.max_targets {
                    log::warn!("Target limit of {} reached, ignoring the rest", self.max_targets);
                    return targets;
                }
                if self.deduplicate && !seen.insert(target.as_str().to_ascii_lowercase()) {
                    stats.duplicates_removed += 1;
                    continue;
                }
                stats.valid_targets += 1;
                targets.push(target);
            }
        }

        targets
    }

    /// Validate file before processing
    pub fn validate_file<P: AsRef<Path>>(&self, file_path: P) -> Result<()> {
        let path = file_path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("File does not exist: {:?}", path));
        }

        if !path.is_file() {
            return Err(anyhow::anyhow!("Path is not a file: {:?}", path));
        }

        Ok(())
    }
}

/// Read a host list file with default settings
pub fn targets_from_file<P: AsRef<Path>>(file_path: P) -> Result<Vec<Target>> {
    let handler = FileInputHandler::default();

    handler.validate_file(&file_path)?;
    let (targets, stats) = handler.read_targets_from_file(&file_path)?;

    log::info!(
        "Loaded {} targets from {:?} ({:?}, {} invalid, {} duplicates removed)",
        stats.valid_targets,
        file_path.as_ref(),
        stats.file_format,
        stats.invalid_entries,
        stats.duplicates_removed
    );

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    #[test]
    fn test_plain_text_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "192.168.1.1").unwrap();
        writeln!(temp_file, "10.0.0.0/30").unwrap();
        writeln!(temp_file, "# Comment line").unwrap();
        writeln!(temp_file, "dc01.corp.local").unwrap();

        let handler = FileInputHandler::default();
        let (targets, stats) = handler
            .read_targets_with_format(temp_file.path(), FileFormat::PlainText)
            .unwrap();

        assert_eq!(stats.valid_targets, 6);
        assert_eq!(targets.first(), Some(&Target::from("192.168.1.1")));
        assert_eq!(targets.last(), Some(&Target::from("dc01.corp.local")));
    }

    #[test]
    fn test_json_file() {
        let mut temp_file = Builder::new().suffix(".json").tempfile().unwrap();
        let json_content = r#"[
            {"target": "ws01.corp.local", "description": "Finance workstation"},
            {"target": "ws02.corp.local"}
        ]"#;
        write!(temp_file, "{}", json_content).unwrap();

        let handler = FileInputHandler::default();
        let (targets, stats) = handler.read_targets_from_file(temp_file.path()).unwrap();

        assert_eq!(stats.file_format, FileFormat::Json);
        assert_eq!(targets, vec![Target::from("ws01.corp.local"), Target::from("ws02.corp.local")]);
    }

    #[test]
    fn test_csv_file() {
        let mut temp_file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(temp_file, "target,description").unwrap();
        writeln!(temp_file, "srv01,file server").unwrap();
        writeln!(temp_file, "srv02,").unwrap();

        let handler = FileInputHandler::default();
        let (targets, stats) = handler.read_targets_from_file(temp_file.path()).unwrap();

        assert_eq!(stats.file_format, FileFormat::Csv);
        assert_eq!(targets, vec![Target::from("srv01"), Target::from("srv02")]);
    }

    #[test]
    fn test_duplicate_removal() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "ws01").unwrap();
        writeln!(temp_file, "WS01").unwrap();
        writeln!(temp_file, "ws02").unwrap();

        let handler = FileInputHandler::new(1000, true);
        let (targets, stats) = handler
            .read_targets_with_format(temp_file.path(), FileFormat::PlainText)
            .unwrap();

        assert_eq!(stats.duplicates_removed, 1);
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_invalid_lines_are_skipped() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "good-host").unwrap();
        writeln!(temp_file, "bad..host").unwrap();

        let handler = FileInputHandler::default();
        let (targets, stats) = handler
            .read_targets_with_format(temp_file.path(), FileFormat::PlainText)
            .unwrap();

        assert_eq!(targets, vec![Target::from("good-host")]);
        assert_eq!(stats.invalid_entries, 1);
    }

    #[test]
    fn test_max_targets() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "10.0.0.0/24").unwrap();

        let handler = FileInputHandler::new(10, true);
        let (targets, _) = handler
            .read_targets_with_format(temp_file.path(), FileFormat::PlainText)
            .unwrap();
        assert_eq!(targets.len(), 10);
    }

    #[test]
    fn test_missing_file() {
        assert!(targets_from_file("/nonexistent/hosts.txt").is_err());
    }
}
