//! Shared controller state (spec §5): the `abort_flag`/`kill_flag` pair,
//! the `status_lines` broadcast slot, and the file-request channel every
//! run's executor, file writer, and observer all hold a handle to.
//!
//! Grounded on `daq-experiment/src/run_engine.rs`'s `RunEngine`, which
//! bundles its cancellation flags and a `broadcast` channel of documents
//! behind one cloneable handle type; `status_lines` here is `watch` rather
//! than `broadcast` since only the latest value is ever observed (spec §5:
//! "observer polls, does not replay history").

use seqlab_core::{AbortFlag, StatusSink};
use seqlab_storage::{FileChannel, FileRequest};
use tokio::sync::watch;

/// Up to four status lines published before an in-flight step's action
/// (spec §3 Step `status`).
pub const STATUS_LINES: usize = 4;

/// The state all three runtime participants share. Cheap to clone: every
/// field is itself a handle (`Arc`-backed or a channel endpoint).
#[derive(Clone)]
pub struct Controller {
    pub abort_flag: AbortFlag,
    pub kill_flag: AbortFlag,
    status_tx: watch::Sender<[String; STATUS_LINES]>,
    files: FileChannel,
}

impl Controller {
    /// Build a controller and spawn its file-writer task.
    pub fn new() -> (Self, tokio::task::JoinHandle<()>) {
        let (files, writer_handle) = FileChannel::spawn();
        let (status_tx, _rx) = watch::channel(Default::default());
        let controller = Controller {
            abort_flag: AbortFlag::new(),
            kill_flag: AbortFlag::new(),
            status_tx,
            files,
        };
        (controller, writer_handle)
    }

    /// A receiver an observer can poll (spec §4.5: "up to 2 Hz").
    pub fn status(&self) -> watch::Receiver<[String; STATUS_LINES]> {
        self.status_tx.subscribe()
    }

    pub fn files(&self) -> &FileChannel {
        &self.files
    }

    /// Request cooperative cancellation: the executor checks this at every
    /// loop iteration, before every sleep, and at every record boundary.
    pub fn abort(&self) {
        self.abort_flag.set();
    }

    /// Hard stop: set both flags and terminate the file writer so it
    /// closes its file and exits, even mid-run.
    pub fn kill(&self) {
        self.abort_flag.set();
        self.kill_flag.set();
        self.files.send(FileRequest::TerminateFileProcess);
    }
}

impl StatusSink for Controller {
    fn publish(&self, lines: Vec<String>) {
        let mut slots: [String; STATUS_LINES] = Default::default();
        for (slot, line) in slots.iter_mut().zip(lines.into_iter()) {
            *slot = line;
        }
        // A dropped receiver just means nobody's observing; not an error.
        let _ = self.status_tx.send(slots);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_pads_short_line_lists_with_empty_strings() {
        let (controller, _writer) = Controller::new();
        let mut rx = controller.status();
        controller.publish(vec!["Step 3".to_string()]);
        let lines = rx.borrow_and_update().clone();
        assert_eq!(lines[0], "Step 3");
        assert_eq!(lines[1], "");
    }

    #[tokio::test]
    async fn kill_sets_both_flags() {
        let (controller, writer) = Controller::new();
        controller.kill();
        assert!(controller.abort_flag.is_set());
        assert!(controller.kill_flag.is_set());
        writer.await.unwrap();
    }
}
