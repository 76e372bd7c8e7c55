use crate::{Result, SpillSortError};
use std::io::Write;

use super::spill_format::encode_entry_into;

pub struct SpillWriter<W: Write> {
    sink: W,
    encode_buffer: Vec<u8>,
}

impl<W: Write> SpillWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            encode_buffer: Vec::new(),
        }
    }

    pub fn write_entry(&mut self, seq: u64, record: &[u8]) -> Result<()> {
        encode_entry_into(seq, record, &mut self.encode_buffer)?;
        self.sink
            .write_all(self.encode_buffer.as_slice())
            .map_err(|error| {
                SpillSortError::message(format!(
                    "failed writing encoded spill entry to sink: {error}"
                ))
            })
    }

    pub fn finish(mut self) -> Result<W> {
        self.sink.flush().map_err(|error| {
            SpillSortError::message(format!("failed flushing spill sink: {error}"))
        })?;
        Ok(self.sink)
    }
}
