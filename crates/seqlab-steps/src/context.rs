//! The execution context passed to `Step::execute` (spec §4.5: the executor
//! never calls into the UI and owns no state beyond what the shared
//! controller exposes through getters/setters).

use seqlab_core::{AbortFlag, RecordSink, SeqError, StatusSink};
use seqlab_instruments::Instrument;
use seqlab_transport::Transport;
use std::collections::HashMap;

/// Everything a step needs to execute: a name→instrument lookup (spec §3:
/// "Steps reference them by name, weak reference via name lookup, rebound
/// each run"), the transport they talk over, where to emit records and
/// status, and the shared abort flag.
pub struct ExecCtx<'a> {
    pub transport: &'a dyn Transport,
    pub instruments: &'a HashMap<String, Instrument>,
    pub records: &'a dyn RecordSink,
    pub status: &'a dyn StatusSink,
    pub abort: &'a AbortFlag,
}

impl<'a> ExecCtx<'a> {
    pub fn instrument(&self, name: &str) -> Result<&'a Instrument, SeqError> {
        self.instruments
            .get(name)
            .ok_or_else(|| SeqError::InstrumentMissing {
                name: name.to_string(),
            })
    }

    pub fn publish(&self, lines: Vec<String>) {
        self.status.publish(lines);
    }

    pub fn aborted(&self) -> bool {
        self.abort.is_set()
    }
}
