//! Cross-task shared state primitives (spec §5): a one-shot abort flag and
//! the sink traits a step's `execute` writes records/status through. Kept
//! trait-object-based (rather than concrete channel types) so `seqlab-steps`
//! doesn't need to depend on `tokio` or on `seqlab-storage` just to call
//! `execute` — `seqlab-runtime` is the only crate that wires concrete
//! channel-backed implementations in.

use crate::error::SeqError;
use crate::record::Record;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A one-shot, cheaply-cloneable cooperative cancellation flag (spec §5
/// `abort_flag`/`kill_flag`). Checked at every loop iteration, before every
/// sleep, and on every record boundary (spec §5 Cancellation).
#[derive(Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Destination for records emitted by a step's `execute` (spec §6.1
/// `Write Line`). Implemented by `seqlab-storage`'s file-writer channel
/// adapter; a `Vec<Record>`-backed implementation is provided here for
/// tests that don't need a real file.
pub trait RecordSink: Send + Sync {
    fn emit(&self, record: Record) -> Result<(), SeqError>;
}

/// Destination for the up-to-4 observable status lines a step publishes
/// before each action (spec §3 Step `status`, §5 `status_lines[0..3]`).
pub trait StatusSink: Send + Sync {
    fn publish(&self, lines: Vec<String>);
}

/// An in-memory `RecordSink` for unit tests.
#[derive(Default)]
pub struct RecordLog(std::sync::Mutex<Vec<Record>>);

impl RecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.0.lock().unwrap().clone()
    }
}

impl RecordSink for RecordLog {
    fn emit(&self, record: Record) -> Result<(), SeqError> {
        self.0.lock().unwrap().push(record);
        Ok(())
    }
}

/// A no-op `StatusSink` for tests that don't care about published status.
#[derive(Default)]
pub struct NullStatus;

impl StatusSink for NullStatus {
    fn publish(&self, _lines: Vec<String>) {}
}
