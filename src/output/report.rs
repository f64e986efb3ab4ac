//! Scan and diff reports.
//!
//! These are shared by the console reporter and by notifiers, so they
//! contain no terminal styling. The diff also has an HTML rendering for
//! mail.

use crate::diff::DiffResult;
use crate::types::ScanRecord;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Summarize a scan: hosts in order, each with its sorted open ports.
pub fn render_scan_report(records: &[ScanRecord]) -> String {
    if records.is_empty() {
        return "Scan completed. No open ports found.\n".to_string();
    }

    let mut by_host: BTreeMap<&str, Vec<&ScanRecord>> = BTreeMap::new();
    for record in records {
        by_host.entry(record.host.as_str()).or_default().push(record);
    }

    let mut out = String::new();
    let _ = writeln!(out, "SCAN REPORT");
    let _ = writeln!(out, "Hosts: {} | Open ports: {}", by_host.len(), records.len());

    for (host, mut ports) in by_host {
        ports.sort_by(|a, b| (a.port, &a.protocol).cmp(&(b.port, &b.protocol)));
        let list: Vec<String> = ports
            .iter()
            .map(|r| format!("{}/{}", r.port, r.protocol))
            .collect();
        let _ = writeln!(out, "{:<18}  {}", host, list.join(", "));
    }

    out
}

/// Describe what changed since the previous scan.
pub fn render_diff_report(diff: &DiffResult) -> String {
    if diff.is_empty() {
        return "DIFF: no changes detected\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "DIFF REPORT");

    if !diff.new.is_empty() {
        let _ = writeln!(out, "\n[NEW] ({}):", diff.new.len());
        for r in &diff.new {
            if r.has_banner() {
                let _ = writeln!(out, "  + {}  [{}]", r.key(), r.banner);
            } else {
                let _ = writeln!(out, "  + {}", r.key());
            }
        }
    }

    if !diff.changed.is_empty() {
        let _ = writeln!(out, "\n[CHANGED] ({}):", diff.changed.len());
        for r in &diff.changed {
            let _ = writeln!(out, "  ~ {}  [{}]", r.key(), r.banner);
        }
    }

    if !diff.closed.is_empty() {
        let _ = writeln!(out, "\n[CLOSED] ({}):", diff.closed.len());
        for r in &diff.closed {
            let _ = writeln!(out, "  - {}", r.key());
        }
    }

    out
}

/// Describe what changed as an HTML fragment. Hosts and banners are
/// escaped.
pub fn render_diff_html(diff: &DiffResult) -> String {
    if diff.is_empty() {
        return "<h3>No changes detected</h3>\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "<h2>Scan Diff Report</h2>");

    if !diff.new.is_empty() {
        let _ = writeln!(out, "<h3>New ports ({})</h3>\n<ul>", diff.new.len());
        for r in &diff.new {
            let _ = writeln!(out, "<li>{} {}</li>", html_key(r), escape_html(&r.banner));
        }
        let _ = writeln!(out, "</ul>");
    }

    if !diff.changed.is_empty() {
        let _ = writeln!(out, "<h3>Changed ({})</h3>\n<ul>", diff.changed.len());
        for r in &diff.changed {
            let _ = writeln!(out, "<li>{} - {}</li>", html_key(r), escape_html(&r.banner));
        }
        let _ = writeln!(out, "</ul>");
    }

    if !diff.closed.is_empty() {
        let _ = writeln!(out, "<h3>Closed ({})</h3>\n<ul>", diff.closed.len());
        for r in &diff.closed {
            let _ = writeln!(out, "<li>{}</li>", html_key(r));
        }
        let _ = writeln!(out, "</ul>");
    }

    out
}

fn html_key(record: &ScanRecord) -> String {
    format!("<b>{}</b>", escape_html(&record.key().to_string()))
}

/// Escape HTML special characters
fn escape_html(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '&' => "&amp;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            _ => c.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Port;
    use chrono::Utc;

    fn record(host: &str, port: u16, proto: &str, banner: &str) -> ScanRecord {
        ScanRecord::new(host, Port::new(port).unwrap(), proto, Utc::now()).with_banner(banner)
    }

    #[test]
    fn test_empty_scan_report() {
        assert_eq!(render_scan_report(&[]), "Scan completed. No open ports found.\n");
    }

    #[test]
    fn test_scan_report_groups_and_sorts() {
        let report = render_scan_report(&[
            record("10.0.0.2", 443, "tcp", ""),
            record("10.0.0.1", 80, "tcp", ""),
            record("10.0.0.2", 22, "tcp", ""),
            record("10.0.0.1", 53, "udp", ""),
        ]);

        assert!(report.contains("Hosts: 2 | Open ports: 4"));
        let first = report.find("10.0.0.1").unwrap();
        let second = report.find("10.0.0.2").unwrap();
        assert!(first < second);
        assert!(report.contains("53/udp, 80/tcp"));
        assert!(report.contains("22/tcp, 443/tcp"));
    }

    #[test]
    fn test_diff_report_sections() {
        let diff = DiffResult {
            new: vec![record("10.0.0.1", 80, "tcp", ""), record("10.0.0.1", 25, "tcp", "ESMTP")],
            changed: vec![record("10.0.0.1", 22, "tcp", "OpenSSH")],
            closed: vec![record("10.0.0.2", 443, "tcp", "")],
        };
        let report = render_diff_report(&diff);

        assert!(report.contains("[NEW] (2):"));
        assert!(report.contains("  + 10.0.0.1:80/tcp\n"));
        assert!(report.contains("  + 10.0.0.1:25/tcp  [ESMTP]"));
        assert!(report.contains("[CHANGED] (1):\n  ~ 10.0.0.1:22/tcp  [OpenSSH]"));
        assert!(report.contains("[CLOSED] (1):\n  - 10.0.0.2:443/tcp"));
    }

    #[test]
    fn test_diff_report_without_changes() {
        assert_eq!(render_diff_report(&DiffResult::default()), "DIFF: no changes detected\n");
    }

    #[test]
    fn test_diff_html_sections() {
        let diff = DiffResult {
            new: vec![record("10.0.0.1", 80, "tcp", "nginx")],
            changed: vec![record("10.0.0.1", 22, "tcp", "OpenSSH")],
            closed: vec![record("10.0.0.2", 443, "tcp", "old")],
        };
        let html = render_diff_html(&diff);

        assert!(html.starts_with("<h2>Scan Diff Report</h2>"));
        assert!(html.contains("<h3>New ports (1)</h3>\n<ul>\n<li><b>10.0.0.1:80/tcp</b> nginx</li>"));
        assert!(html.contains("<h3>Changed (1)</h3>\n<ul>\n<li><b>10.0.0.1:22/tcp</b> - OpenSSH</li>"));
        assert!(html.contains("<h3>Closed (1)</h3>\n<ul>\n<li><b>10.0.0.2:443/tcp</b></li>"));
        assert!(!html.contains("old"));
    }

    #[test]
    fn test_diff_html_escapes_banners() {
        let diff = DiffResult {
            new: vec![record("10.0.0.1", 80, "tcp", "<script>alert('x')</script> & \"more\"")],
            ..DiffResult::default()
        };
        let html = render_diff_html(&diff);

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; &quot;more&quot;"));
    }

    #[test]
    fn test_diff_html_without_changes() {
        assert_eq!(render_diff_html(&DiffResult::default()), "<h3>No changes detected</h3>\n");
    }
}
