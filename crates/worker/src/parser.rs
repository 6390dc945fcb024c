//! Streaming CSV parser and row validator.
//!
//! Each line produces a [`LineOutcome`]: either a validated [`DataPoint`] or
//! the reason it was skipped. Row problems never surface as errors; only a
//! failing reader ends the scan early.

use crate::config::IngestConfig;
use chrono::{DateTime, Utc};
use ingest_core::{DataPoint, Result};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Split};

/// Plausibility rules applied to every row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationRules {
    pub min_temperature: f64,
    pub max_temperature: f64,
}

impl ValidationRules {
    pub fn new(min_temperature: f64, max_temperature: f64) -> Self {
        Self {
            min_temperature,
            max_temperature,
        }
    }

    /// Inclusive range check.
    pub fn accepts(&self, temperature: f64) -> bool {
        (self.min_temperature..=self.max_temperature).contains(&temperature)
    }
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for ValidationRules {
    fn from(config: &IngestConfig) -> Self {
        Self::new(config.min_temperature, config.max_temperature)
    }
}

/// Why a line did not produce a data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Empty or whitespace-only line
    Blank,
    /// Line is not valid UTF-8
    Encoding,
    /// Not exactly two comma-separated fields
    FieldCount,
    /// First field is not a timezone-aware ISO-8601 timestamp
    Timestamp,
    /// Second field is not a finite decimal number
    Temperature,
    /// Temperature outside the plausible range
    OutOfRange,
}

/// Result of parsing one line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Point(DataPoint),
    Skip(SkipReason),
}

/// Parses and validates a single line.
pub fn parse_line(line: &str, file_id: u64, rules: &ValidationRules) -> LineOutcome {
    if line.trim().is_empty() {
        return LineOutcome::Skip(SkipReason::Blank);
    }

    let mut fields = line.split(',');
    let (raw_ts, raw_temp) = match (fields.next(), fields.next(), fields.next()) {
        (Some(ts), Some(temp), None) => (ts.trim(), temp.trim()),
        _ => return LineOutcome::Skip(SkipReason::FieldCount),
    };

    let timestamp = match DateTime::parse_from_rfc3339(raw_ts) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(_) => return LineOutcome::Skip(SkipReason::Timestamp),
    };

    let temperature = match raw_temp.parse::<f64>() {
        Ok(t) if t.is_finite() => t,
        _ => return LineOutcome::Skip(SkipReason::Temperature),
    };

    if !rules.accepts(temperature) {
        return LineOutcome::Skip(SkipReason::OutOfRange);
    }

    LineOutcome::Point(DataPoint::new(file_id, timestamp, temperature))
}

/// Per-file parse counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines_read: u64,
    pub valid: u64,
    pub blank: u64,
    pub bad_encoding: u64,
    pub bad_field_count: u64,
    pub bad_timestamp: u64,
    pub bad_temperature: u64,
    pub out_of_range: u64,
}

impl ParseStats {
    pub fn record(&mut self, outcome: &LineOutcome) {
        self.lines_read += 1;
        match outcome {
            LineOutcome::Point(_) => self.valid += 1,
            LineOutcome::Skip(reason) => match reason {
                SkipReason::Blank => self.blank += 1,
                SkipReason::Encoding => self.bad_encoding += 1,
                SkipReason::FieldCount => self.bad_field_count += 1,
                SkipReason::Timestamp => self.bad_timestamp += 1,
                SkipReason::Temperature => self.bad_temperature += 1,
                SkipReason::OutOfRange => self.out_of_range += 1,
            },
        }
    }

    /// Non-blank lines that failed validation.
    pub fn invalid(&self) -> u64 {
        self.bad_encoding
            + self.bad_field_count
            + self.bad_timestamp
            + self.bad_temperature
            + self.out_of_range
    }
}

/// Lazily yields validated data points from a line-oriented reader.
pub struct LineParser<R> {
    lines: Split<R>,
    file_id: u64,
    rules: ValidationRules,
    stats: ParseStats,
}

impl LineParser<BufReader<File>> {
    /// Opens a file for streaming. The file can be re-read by opening again.
    pub async fn open(path: &Path, file_id: u64, rules: ValidationRules) -> Result<Self> {
        let file = File::open(path).await?;
        Ok(Self::new(BufReader::new(file), file_id, rules))
    }
}

impl<R: AsyncBufRead + Unpin> LineParser<R> {
    pub fn new(reader: R, file_id: u64, rules: ValidationRules) -> Self {
        Self {
            lines: reader.split(b'\n'),
            file_id,
            rules,
            stats: ParseStats::default(),
        }
    }

    /// Returns the next valid point, or `None` at end of input.
    ///
    /// Invalid rows are counted and skipped.
    pub async fn next_point(&mut self) -> Result<Option<DataPoint>> {
        while let Some(raw) = self.lines.next_segment().await? {
            let outcome = match std::str::from_utf8(&raw) {
                Ok(line) => parse_line(line.trim_end_matches('\r'), self.file_id, &self.rules),
                Err(_) => LineOutcome::Skip(SkipReason::Encoding),
            };
            self.stats.record(&outcome);

            if let LineOutcome::Point(point) = outcome {
                return Ok(Some(point));
            }
        }
        Ok(None)
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    pub fn into_stats(self) -> ParseStats {
        self.stats
    }
}
