//! File-request mailbox protocol and the tab-delimited data file format
//! (spec §6.1, §6.2): the storage half of the three-participant runtime,
//! isolated from `seqlab-runtime` so the writer task and its wire format can
//! be exercised without the executor or a real instrument bank.

pub mod datafile;
pub mod request;
pub mod writer;

pub use datafile::{parse_cell, read_all, read_all_from_path, MAX_SERIES_POINTS};
pub use request::{FileAnswer, FileRequest, Series};
pub use writer::FileChannel;
