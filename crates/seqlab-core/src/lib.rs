//! Cross-cutting types shared by every crate in the sequence controller.
//!
//! Keeps the error taxonomy (§7 of the spec) and the tabular `Record`/column
//! header model (§3) in one place so `seqlab-transport`, `seqlab-instruments`,
//! `seqlab-apparatus`, `seqlab-steps`, `seqlab-runtime`, and `seqlab-storage`
//! all speak the same vocabulary instead of each rolling their own.

pub mod error;
pub mod record;
pub mod shared;

pub use error::{SeqError, SeqResult};
pub use record::{ColumnHeader, Record};
pub use shared::{AbortFlag, NullStatus, RecordLog, RecordSink, StatusSink};
