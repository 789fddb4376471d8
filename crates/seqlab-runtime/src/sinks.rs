//! `RecordSink` adapter over the file-request channel (spec §6.1
//! `Write Line`), the bridge `seqlab-steps`' trait-object-based `ExecCtx`
//! needs without depending on `seqlab-storage` itself.

use seqlab_core::{Record, RecordSink, SeqError};
use seqlab_storage::{FileChannel, FileRequest};

pub struct FileRecordSink<'a> {
    files: &'a FileChannel,
}

impl<'a> FileRecordSink<'a> {
    pub fn new(files: &'a FileChannel) -> Self {
        FileRecordSink { files }
    }
}

impl<'a> RecordSink for FileRecordSink<'a> {
    fn emit(&self, record: Record) -> Result<(), SeqError> {
        self.files.send(FileRequest::WriteLine { record });
        Ok(())
    }
}
