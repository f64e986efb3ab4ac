//! Show subcommand implementation.

use crate::config::Settings;
use crate::error::StartupResult;
use crate::output::{self, OutputFormat};
use crate::storage::{RecordStore, ScanStore};
use crate::types::ScanRecord;
use clap::Parser;
use std::io::{self, Write};

/// Print the stored open ports.
#[derive(Parser, Debug)]
pub struct ShowCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,

    /// Only show records for this host
    #[arg(long, value_name = "IP")]
    pub host: Option<String>,
}

impl ShowCommand {
    pub async fn execute(&self, settings: &Settings, quiet: bool) -> StartupResult<()> {
        let path = settings.database_path()?;
        let store = ScanStore::open(&path).await?;
        let snapshot = store.load_all().await?;
        store.close().await;

        let records: Vec<ScanRecord> = snapshot
            .records()
            .filter(|r| self.host.as_deref().map_or(true, |h| r.host == h))
            .cloned()
            .collect();

        if !quiet && self.format == OutputFormat::Plain {
            output::print_info(&format!("Database: {}", path.display()));
        }

        let stdout = io::stdout();
        let mut out = stdout.lock();
        output::write_records(&mut out, &records, self.format)?;
        out.flush()?;
        Ok(())
    }
}
