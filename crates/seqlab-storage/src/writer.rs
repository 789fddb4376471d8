//! The single file-writer task (spec §4.5, §5): one task owns the open file
//! handle exclusively, drains a FIFO of `FileRequest`s in order, and parks
//! its answers in shared last-writer-wins slots (`file_answer`,
//! `file_latest`) the executor and observer poll after `join`-ing the
//! queue.
//!
//! Grounded on the teacher workspace's "one task, one resource" actor shape
//! (`daq-storage/src/comedi_writer.rs`: a dedicated task exclusively owns a
//! hardware write queue) and `daq-experiment/run_engine.rs`'s `mpsc` +
//! `watch` channel wiring; the joinable-FIFO semantics themselves
//! (`FileChannel::join`) have no direct teacher analogue — `comedi_writer`
//! never needs callers to wait for drain — so they're built directly from
//! spec §5 using `tokio::sync::Notify` plus a pending-request counter.

use crate::datafile::read_all_from_path;
use crate::request::{FileAnswer, FileRequest, Series};
use seqlab_core::record::ColumnHeader;
use seqlab_core::Record;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, warn};

/// Handle held by the executor (or tests) to enqueue file requests and read
/// back the shared answer slots.
#[derive(Clone)]
pub struct FileChannel {
    sender: mpsc::UnboundedSender<FileRequest>,
    pending: Arc<AtomicI64>,
    drained: Arc<Notify>,
    file_answer: Arc<RwLock<FileAnswer>>,
    file_latest: Arc<RwLock<HashMap<String, String>>>,
}

impl FileChannel {
    /// Spawn the writer task and return a channel bound to it.
    pub fn spawn() -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicI64::new(0));
        let drained = Arc::new(Notify::new());
        let file_answer = Arc::new(RwLock::new(FileAnswer::None));
        let file_latest = Arc::new(RwLock::new(HashMap::new()));

        let channel = FileChannel {
            sender: tx,
            pending: pending.clone(),
            drained: drained.clone(),
            file_answer: file_answer.clone(),
            file_latest: file_latest.clone(),
        };
        let handle = tokio::spawn(run_writer(rx, pending, drained, file_answer, file_latest));
        (channel, handle)
    }

    /// Enqueue a request. Never blocks; the FIFO is unbounded, matching the
    /// spec's description of file requests as a queue the executor never
    /// waits on synchronously except via an explicit `join`.
    pub fn send(&self, request: FileRequest) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(request).is_err() {
            // Writer task already exited; undo the increment so a
            // subsequent join() doesn't hang forever.
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Block until every request enqueued so far has been processed.
    /// Callers needing a fresh `file_answer` after `send` should always
    /// `join` first — the slot is last-writer-wins and otherwise racy.
    ///
    /// `enable()` registers this waiter with `Notify` before the pending
    /// check below, so a drain that completes between the check and the
    /// `.await` still wakes us — the ordinary `notified().await` pattern
    /// would miss that `notify_waiters()` call.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending.load(Ordering::SeqCst) <= 0 {
                return;
            }
            notified.await;
        }
    }

    pub async fn file_answer(&self) -> FileAnswer {
        self.file_answer.read().await.clone()
    }

    pub async fn file_latest(&self) -> HashMap<String, String> {
        self.file_latest.read().await.clone()
    }
}

struct WriterState {
    file: Option<File>,
    path: Option<PathBuf>,
    headers: Vec<String>,
    unread: Vec<Record>,
}

impl WriterState {
    fn new() -> Self {
        WriterState {
            file: None,
            path: None,
            headers: Vec::new(),
            unread: Vec::new(),
        }
    }

    fn header_plan(&self) -> Vec<ColumnHeader> {
        self.headers
            .iter()
            .map(|h| ColumnHeader::from(h.as_str()))
            .collect()
    }
}

async fn run_writer(
    mut rx: mpsc::UnboundedReceiver<FileRequest>,
    pending: Arc<AtomicI64>,
    drained: Arc<Notify>,
    file_answer: Arc<RwLock<FileAnswer>>,
    file_latest: Arc<RwLock<HashMap<String, String>>>,
) {
    let mut state = WriterState::new();
    while let Some(request) = rx.recv().await {
        let terminate = matches!(request, FileRequest::TerminateFileProcess);
        handle_one(&mut state, request, &file_answer, &file_latest).await;
        pending.fetch_sub(1, Ordering::SeqCst);
        drained.notify_waiters();
        if terminate {
            break;
        }
    }
    debug!("file writer task exiting");
}

async fn handle_one(
    state: &mut WriterState,
    request: FileRequest,
    file_answer: &RwLock<FileAnswer>,
    file_latest: &RwLock<HashMap<String, String>>,
) {
    match request {
        FileRequest::NewFile { path, headers } => {
            match File::create(&path) {
                Ok(mut f) => {
                    if let Err(e) = writeln!(f, "{}", headers.join("\t")) {
                        warn!(?path, error = %e, "failed writing header line");
                    }
                    state.file = Some(f);
                    state.path = Some(path);
                    state.headers = headers;
                    state.unread.clear();
                }
                Err(e) => warn!(?path, error = %e, "failed to create data file"),
            }
        }
        FileRequest::OpenFile { path } => match std::fs::read_to_string(&path) {
            Ok(content) => {
                let header_line = content.lines().next().unwrap_or("");
                let headers: Vec<String> =
                    header_line.split('\t').map(str::to_string).collect();
                state.headers = headers.clone();
                state.path = Some(path.clone());
                state.file = OpenOptions::new().append(true).open(&path).ok();
                *file_answer.write().await = FileAnswer::Headers(headers);
            }
            Err(e) => warn!(?path, error = %e, "failed to open data file"),
        },
        FileRequest::WriteLine { record } => {
            let plan = state.header_plan();
            let row = record.row(&plan);
            if let Some(f) = state.file.as_mut() {
                if let Err(e) = writeln!(f, "{}", row.join("\t")) {
                    warn!(error = %e, "failed writing data line");
                } else {
                    let _ = f.flush();
                }
            }
            state.unread.push(record);
            let mut latest = file_latest.write().await;
            for (header, value) in state.headers.iter().zip(row.iter()) {
                latest.insert(header.clone(), value.clone());
            }
        }
        FileRequest::CloseFile => {
            state.file = None;
        }
        FileRequest::GetCurrentFile => {
            *file_answer.write().await = FileAnswer::CurrentFile {
                path: state.path.clone(),
                headers: state.headers.clone(),
            };
        }
        FileRequest::ReadUnread => {
            let records = std::mem::take(&mut state.unread);
            *file_answer.write().await = FileAnswer::Records(records);
        }
        FileRequest::ReadLatest => {
            let snapshot = file_latest.read().await.clone();
            *file_answer.write().await = FileAnswer::Latest(snapshot);
        }
        FileRequest::ReadAll { x_col, y_cols } => {
            let series = match &state.path {
                Some(path) => read_all_from_path(path, &x_col, &y_cols).unwrap_or_else(|e| {
                    warn!(?path, error = %e, "failed to scan data file for Read All");
                    Series::default()
                }),
                None => Series::default(),
            };
            *file_answer.write().await = FileAnswer::Table(series);
        }
        FileRequest::TerminateFileProcess => {
            state.file = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqlab_core::record::ColumnHeader;
    use tempfile::tempdir;

    #[tokio::test]
    async fn new_file_then_write_line_then_read_unread() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.tsv");
        let (channel, _handle) = FileChannel::spawn();

        channel.send(FileRequest::NewFile {
            path: path.clone(),
            headers: vec!["Timestamp".into(), "src--Voltage (V)".into()],
        });
        let mut record = Record::new();
        record.insert(ColumnHeader::continuous("src", "Voltage", "V"), "3.3");
        channel.send(FileRequest::WriteLine { record });
        channel.send(FileRequest::ReadUnread);
        channel.join().await;

        match channel.file_answer().await {
            FileAnswer::Records(records) => assert_eq!(records.len(), 1),
            other => panic!("expected Records, got {other:?}"),
        }
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("src--Voltage (V)"));
    }

    #[tokio::test]
    async fn read_latest_reflects_last_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.tsv");
        let (channel, _handle) = FileChannel::spawn();
        channel.send(FileRequest::NewFile {
            path,
            headers: vec!["Timestamp".into(), "dmm--Current (A)".into()],
        });
        let mut r1 = Record::new();
        r1.insert(ColumnHeader::continuous("dmm", "Current", "A"), "0.010");
        channel.send(FileRequest::WriteLine { record: r1 });
        let mut r2 = Record::new();
        r2.insert(ColumnHeader::continuous("dmm", "Current", "A"), "0.020");
        channel.send(FileRequest::WriteLine { record: r2 });
        channel.send(FileRequest::ReadLatest);
        channel.join().await;

        match channel.file_answer().await {
            FileAnswer::Latest(map) => {
                assert_eq!(map.get("dmm--Current (A)").map(String::as_str), Some("0.020"))
            }
            other => panic!("expected Latest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminate_closes_file_and_ends_task() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.tsv");
        let (channel, handle) = FileChannel::spawn();
        channel.send(FileRequest::NewFile {
            path,
            headers: vec!["Timestamp".into()],
        });
        channel.send(FileRequest::TerminateFileProcess);
        channel.join().await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn join_returns_immediately_with_nothing_enqueued() {
        let (channel, _handle) = FileChannel::spawn();
        channel.join().await;
    }
}
