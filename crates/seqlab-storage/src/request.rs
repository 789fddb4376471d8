//! The file-request mailbox protocol (spec §6.1): nine tagged request
//! types the executor and the (out-of-scope) UI enqueue against one file
//! writer task, plus the shapes of the `file_answer` / `file_latest` reply
//! slots those requests populate.
//!
//! `FileRequest` is a serde tagged enum even though it never leaves the
//! process (spec §3 [ADDED] ambient-stack note: serde everywhere over
//! hand-rolled enums), which makes the protocol trivially snapshot-testable
//! and matches the teacher workspace's preference for serde document types
//! over ad-hoc message structs (`daq-core::experiment::document::Document`).

use seqlab_core::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// One entry in the file-request FIFO (spec §6.1 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FileRequest {
    /// Open a new file, write the header line.
    #[serde(rename = "New File")]
    NewFile { path: PathBuf, headers: Vec<String> },
    /// Open an existing file, read its header line into `file_answer`.
    #[serde(rename = "Open File")]
    OpenFile { path: PathBuf },
    /// Append one row, flush.
    #[serde(rename = "Write Line")]
    WriteLine { record: Record },
    /// Close the current file.
    #[serde(rename = "Close File")]
    CloseFile,
    /// Report the open path and header line into `file_answer`.
    #[serde(rename = "Get Current File")]
    GetCurrentFile,
    /// Return and clear the buffer of records written since the last read.
    #[serde(rename = "Read Unread")]
    ReadUnread,
    /// Return the latest-value map into `file_answer`.
    #[serde(rename = "Read Latest")]
    ReadLatest,
    /// Scan the file, project `x_col` and `y_cols`, downsample to <=2000
    /// rows, and place the result into `file_answer`.
    #[serde(rename = "Read All")]
    ReadAll { x_col: String, y_cols: Vec<String> },
    /// Close the file and exit the writer task.
    #[serde(rename = "Terminate File Process")]
    TerminateFileProcess,
}

impl FileRequest {
    /// True for requests that populate `file_answer` and so should be
    /// awaited with `FileChannel::join` before the caller reads the slot.
    pub fn expects_answer(&self) -> bool {
        matches!(
            self,
            FileRequest::OpenFile { .. }
                | FileRequest::GetCurrentFile
                | FileRequest::ReadUnread
                | FileRequest::ReadLatest
                | FileRequest::ReadAll { .. }
        )
    }
}

/// A parallel x/y series produced by `Read All`, already downsampled (spec
/// §6.1: "downsample by pair-wise decimation until length <= 2000").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub x: Vec<f64>,
    /// One `Vec<f64>` per requested y column, in request order.
    pub ys: Vec<Vec<f64>>,
}

/// The shape of whatever landed in `file_answer` (spec §5: "most-recent
/// reply slot, last-writer-wins"). `None` until the first answer-producing
/// request completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum FileAnswer {
    #[default]
    None,
    /// `Open File`'s header line.
    Headers(Vec<String>),
    /// `Read Unread`'s buffered records.
    Records(Vec<Record>),
    /// `Read Latest`'s latest-value map.
    Latest(HashMap<String, String>),
    /// `Get Current File`'s `(path, headers)`.
    CurrentFile {
        path: Option<PathBuf>,
        headers: Vec<String>,
    },
    /// `Read All`'s downsampled series.
    Table(Series),
}
