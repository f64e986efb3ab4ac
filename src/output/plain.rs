//! Plain text output formatting.
//!
//! Produces human-readable output with colors and formatting.

use super::report::{render_diff_report, render_scan_report};
use super::Reporter;
use crate::diff::DiffResult;
use crate::types::ScanRecord;
use console::style;
use std::io::{self, Write};

const RULE: &str = "───────────────────────────────────────────────────────────────";

/// Prints each run's scan and diff reports to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only print the diff, and only when something changed.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Write the reports for one run to `out`.
    pub fn write_report<W: Write>(
        &self,
        out: &mut W,
        fresh: &[ScanRecord],
        diff: &DiffResult,
    ) -> io::Result<()> {
        if self.quiet && diff.is_empty() {
            return Ok(());
        }

        if !self.quiet {
            writeln!(out)?;
            for line in render_scan_report(fresh).lines() {
                if line.starts_with("SCAN REPORT") {
                    writeln!(out, "{}", style(line).cyan().bold())?;
                } else {
                    writeln!(out, "  {}", line)?;
                }
            }
        }

        writeln!(out)?;
        for line in render_diff_report(diff).lines() {
            let styled = match line.trim_start().chars().next() {
                Some('+') => style(line).green(),
                Some('~') => style(line).yellow(),
                Some('-') => style(line).red(),
                _ if line.starts_with("DIFF") => style(line).cyan().bold(),
                _ => style(line).bold(),
            };
            writeln!(out, "{}", styled)?;
        }

        Ok(())
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, fresh: &[ScanRecord], diff: &DiffResult) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_report(&mut out, fresh, diff)?;
        out.flush()
    }
}

/// Print stored records as a table.
pub fn write_table<W: Write>(out: &mut W, records: &[ScanRecord]) -> io::Result<()> {
    if records.is_empty() {
        writeln!(out, "  {}", style("No open ports recorded.").dim())?;
        return Ok(());
    }

    writeln!(out, "  {}", style(RULE).dim())?;
    writeln!(
        out,
        "  {:<18} {:>6}  {:<5}  {:<20}  {}",
        style("HOST").bold(),
        style("PORT").bold(),
        style("PROTO").bold(),
        style("LAST SEEN").bold(),
        style("BANNER").bold()
    )?;
    writeln!(out, "  {}", style(RULE).dim())?;

    for record in records {
        writeln!(
            out,
            "  {:<18} {:>6}  {:<5}  {:<20}  {}",
            record.host,
            style(record.port.as_u16()).green(),
            record.protocol,
            record.last_seen.format("%Y-%m-%d %H:%M:%S"),
            style(truncate_string(&record.banner, 35)).dim()
        )?;
    }

    writeln!(out, "  {}", style(RULE).dim())?;
    writeln!(out, "  {} open ports", style(records.len()).bold())?;
    Ok(())
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), msg);
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an info message.
pub fn print_info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Truncate to at most `max_len` characters, adding an ellipsis if cut.
fn truncate_string(s: &str, max_len: usize) -> String {
    // Banners often carry protocol line endings.
    let s = s.replace(['\r', '\n'], " ");
    if s.chars().count() <= max_len {
        s
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Port;
    use chrono::Utc;

    fn record(host: &str, port: u16, banner: &str) -> ScanRecord {
        ScanRecord::new(host, Port::new(port).unwrap(), "tcp", Utc::now()).with_banner(banner)
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("SSH-2.0\r\n", 20), "SSH-2.0  ");
    }

    #[test]
    fn test_report_includes_scan_and_diff() {
        let fresh = vec![record("10.0.0.1", 22, "")];
        let diff = DiffResult {
            new: fresh.clone(),
            ..DiffResult::default()
        };

        let mut buf = Vec::new();
        ConsoleReporter::new().write_report(&mut buf, &fresh, &diff).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Hosts: 1 | Open ports: 1"));
        assert!(text.contains("+ 10.0.0.1:22/tcp"));
    }

    #[test]
    fn test_quiet_reporter_skips_unchanged_runs() {
        let fresh = vec![record("10.0.0.1", 22, "")];
        let mut buf = Vec::new();
        ConsoleReporter::new()
            .quiet(true)
            .write_report(&mut buf, &fresh, &DiffResult::default())
            .unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_table_lists_records() {
        let mut buf = Vec::new();
        write_table(&mut buf, &[record("192.168.1.5", 8080, "jetty")]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("192.168.1.5"));
        assert!(text.contains("8080"));
        assert!(text.contains("jetty"));
        assert!(text.contains("open ports"));
    }
}
