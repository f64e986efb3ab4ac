//! Core type definitions using newtype patterns for type safety.
//!
//! These types prevent common logic errors by making invalid states unrepresentable
//! at compile time.

mod port;
mod record;
mod run_id;
mod target;

pub use port::{Port, PortError, PortRange, PortSpec, Transport};
pub use record::{RecordKey, ScanRecord, Snapshot};
pub use run_id::RunId;
pub use target::{TargetError, TargetSpec};
