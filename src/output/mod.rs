//! Output formatting module.
//!
//! Renders scan and diff reports as plain text, prints them to the
//! console, and exports stored records as plain text, JSON or CSV.

mod csv_format;
mod json_format;
mod plain;
mod report;

pub use csv_format::write_csv;
pub use json_format::write_json;
pub use plain::{
    print_error, print_info, print_success, print_warning, write_table, ConsoleReporter,
};
pub use report::{render_diff_html, render_diff_report, render_scan_report};

use crate::diff::DiffResult;
use crate::types::ScanRecord;
use std::fmt;
use std::io::{self, Write};

/// Receives the outcome of every pipeline run.
pub trait Reporter: Send + Sync {
    fn report(&self, fresh: &[ScanRecord], diff: &DiffResult) -> io::Result<()>;
}

/// Output format for stored records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable plain text
    #[default]
    Plain,
    /// JSON structured output
    Json,
    /// CSV format for data analysis
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Write `records` to `out` in the given format.
pub fn write_records<W: Write>(
    out: &mut W,
    records: &[ScanRecord],
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Plain => write_table(out, records),
        OutputFormat::Json => write_json(out, records),
        OutputFormat::Csv => write_csv(out, records),
    }
}
