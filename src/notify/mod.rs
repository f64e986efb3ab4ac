//! Change notifications.
//!
//! Notifiers receive the diff of a run that changed something. Their
//! failures are logged by the pipeline and never fail the run.

mod smtp;
mod telegram;

pub use smtp::SmtpNotifier;
pub use telegram::{split_message, TelegramNotifier, TELEGRAM_MAX_MESSAGE_LEN};

use crate::diff::DiffResult;
use crate::error::NotifyError;
use crate::types::ScanRecord;
use async_trait::async_trait;

/// Delivers a change report somewhere outside the process.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Deliver a report for `diff`. `fresh` is the full scan it came from.
    async fn notify(&self, diff: &DiffResult, fresh: &[ScanRecord]) -> Result<(), NotifyError>;
}
