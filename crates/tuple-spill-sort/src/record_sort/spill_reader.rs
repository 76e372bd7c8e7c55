use crate::{Result, SpillSortError};
use std::io::Read;

use super::spill_format::{
    SPILL_FRAME_HEADER_LEN, SpillFormatEntry, decode_frame_payload_len, decode_payload_into,
};

pub struct SpillReader<R: Read> {
    source: R,
    frame_header: [u8; SPILL_FRAME_HEADER_LEN],
    payload: Vec<u8>,
}

impl<R: Read> SpillReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            frame_header: [0_u8; SPILL_FRAME_HEADER_LEN],
            payload: Vec::new(),
        }
    }

    /// Reads the next frame into `entry`. Returns `false` at a clean end of stream.
    pub fn read_next_into(&mut self, entry: &mut SpillFormatEntry) -> Result<bool> {
        if !read_header_or_eof(&mut self.source, &mut self.frame_header)? {
            return Ok(false);
        }

        let payload_len = decode_frame_payload_len(self.frame_header.as_slice())?;
        self.payload.resize(payload_len, 0);
        self.source
            .read_exact(self.payload.as_mut_slice())
            .map_err(|error| {
                SpillSortError::message(format!(
                    "failed reading encoded spill bytes from source: {error}"
                ))
            })?;

        decode_payload_into(self.payload.as_slice(), entry)?;
        Ok(true)
    }
}

fn read_header_or_eof<R: Read>(source: &mut R, header: &mut [u8]) -> Result<bool> {
    let mut bytes_read = 0usize;
    while bytes_read < header.len() {
        let count = source.read(&mut header[bytes_read..]).map_err(|error| {
            SpillSortError::message(format!(
                "failed reading encoded spill bytes from source: {error}"
            ))
        })?;
        if count == 0 {
            if bytes_read == 0 {
                return Ok(false);
            }
            return Err(SpillSortError::message(
                "failed reading encoded spill bytes from source: truncated spill frame header",
            ));
        }
        bytes_read = bytes_read.saturating_add(count);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_sort::spill_format::encode_entry;
    use std::io;

    struct ErrorSource;

    impl Read for ErrorSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("reader failure"))
        }
    }

    #[test]
    fn reader_roundtrip_decodes_written_entry() {
        let entry = SpillFormatEntry {
            seq: 31,
            record: b"payload-2-99".to_vec(),
        };
        let encoded = encode_entry(&entry).expect("spill format should encode for reader test");

        let mut reader = SpillReader::new(io::Cursor::new(encoded));
        let mut observed = SpillFormatEntry::default();
        assert!(
            reader
                .read_next_into(&mut observed)
                .expect("reader should decode first entry")
        );
        assert_eq!(observed, entry);
        assert!(
            !reader
                .read_next_into(&mut observed)
                .expect("reader should report stream exhaustion")
        );
    }

    #[test]
    fn reader_rejects_corrupt_entry_bytes() {
        let mut reader = SpillReader::new(io::Cursor::new(vec![0xde, 0xad, 0xbe, 0xef]));
        let error = reader
            .read_next_into(&mut SpillFormatEntry::default())
            .expect_err("reader should fail on a truncated frame header");
        assert!(error.to_string().contains("truncated"));
    }

    #[test]
    fn reader_surfaces_source_io_errors() {
        let mut reader = SpillReader::new(ErrorSource);
        let error = reader
            .read_next_into(&mut SpillFormatEntry::default())
            .expect_err("reader should fail when source read fails");
        assert!(
            error
                .to_string()
                .contains("failed reading encoded spill bytes")
        );
    }
}
