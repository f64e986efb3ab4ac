//! JSON output formatting.

use crate::types::ScanRecord;
use std::io::{self, Write};

/// Write records as a pretty-printed JSON array.
pub fn write_json<W: Write>(out: &mut W, records: &[ScanRecord]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, records)?;
    writeln!(out)
}
