//! CSV output formatting.

use crate::types::ScanRecord;
use std::io::{self, Write};

/// Write records as CSV with a header row.
pub fn write_csv<W: Write>(out: &mut W, records: &[ScanRecord]) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record(["host", "port", "protocol", "banner", "first_seen", "last_seen"])?;

    for record in records {
        wtr.write_record([
            record.host.as_str(),
            &record.port.to_string(),
            record.protocol.as_str(),
            record.banner.as_str(),
            &record.first_seen.to_rfc3339(),
            &record.last_seen.to_rfc3339(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
