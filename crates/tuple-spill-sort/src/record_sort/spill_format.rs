use crate::{Result, SpillSortError};

pub const SPILL_MAGIC: [u8; 4] = *b"TUPS";
pub const SPILL_VERSION: u16 = 1;
pub const SPILL_FRAME_HEADER_LEN: usize = 14;

const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = MAGIC_OFFSET + SPILL_MAGIC.len();
const PAYLOAD_LEN_OFFSET: usize = VERSION_OFFSET + std::mem::size_of::<u16>();
const FIXED_FIELDS_LEN: usize = std::mem::size_of::<u64>(); // seq

/// One framed record in a spill run: `magic | version | payload_len | seq | record`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SpillFormatEntry {
    pub seq: u64,
    pub record: Vec<u8>,
}

pub fn encode_entry_into(seq: u64, record: &[u8], encoded: &mut Vec<u8>) -> Result<()> {
    let payload_len = FIXED_FIELDS_LEN.saturating_add(record.len());
    let payload_len_u64 = u64::try_from(payload_len).map_err(|_| {
        SpillSortError::message(format!(
            "spill entry payload length {payload_len} exceeds u64::MAX when encoding"
        ))
    })?;

    encoded.clear();
    encoded.reserve(SPILL_FRAME_HEADER_LEN.saturating_add(payload_len));
    encoded.extend_from_slice(&SPILL_MAGIC);
    encoded.extend_from_slice(&SPILL_VERSION.to_be_bytes());
    encoded.extend_from_slice(&payload_len_u64.to_be_bytes());
    encoded.extend_from_slice(&seq.to_be_bytes());
    encoded.extend_from_slice(record);
    Ok(())
}

#[cfg(test)]
pub fn encode_entry(entry: &SpillFormatEntry) -> Result<Vec<u8>> {
    let mut encoded = Vec::new();
    encode_entry_into(entry.seq, entry.record.as_slice(), &mut encoded)?;
    Ok(encoded)
}

pub fn decode_frame_payload_len(frame_header: &[u8]) -> Result<usize> {
    if frame_header.len() != SPILL_FRAME_HEADER_LEN {
        return Err(SpillSortError::message(format!(
            "spill frame header length {} does not match expected {}",
            frame_header.len(),
            SPILL_FRAME_HEADER_LEN
        )));
    }

    let observed_magic = &frame_header[MAGIC_OFFSET..VERSION_OFFSET];
    if observed_magic != SPILL_MAGIC.as_slice() {
        return Err(SpillSortError::message(format!(
            "spill frame magic mismatch: expected {:?}, observed {:?}",
            SPILL_MAGIC, observed_magic
        )));
    }

    let mut version_bytes = [0_u8; std::mem::size_of::<u16>()];
    version_bytes.copy_from_slice(&frame_header[VERSION_OFFSET..PAYLOAD_LEN_OFFSET]);
    let version = u16::from_be_bytes(version_bytes);
    if version != SPILL_VERSION {
        return Err(SpillSortError::message(format!(
            "spill frame version mismatch: expected {SPILL_VERSION}, observed {version}"
        )));
    }

    let mut len_bytes = [0_u8; std::mem::size_of::<u64>()];
    len_bytes.copy_from_slice(&frame_header[PAYLOAD_LEN_OFFSET..SPILL_FRAME_HEADER_LEN]);
    let payload_len = u64::from_be_bytes(len_bytes);
    let payload_len = usize::try_from(payload_len).map_err(|_| {
        SpillSortError::message(format!(
            "spill frame payload length {payload_len} exceeds platform usize::MAX"
        ))
    })?;
    if payload_len < FIXED_FIELDS_LEN {
        return Err(SpillSortError::message(format!(
            "spill frame payload too short: {payload_len} bytes, need at least {FIXED_FIELDS_LEN}"
        )));
    }
    Ok(payload_len)
}

/// Decodes a frame payload into `entry`, reusing its record allocation.
pub fn decode_payload_into(payload: &[u8], entry: &mut SpillFormatEntry) -> Result<()> {
    if payload.len() < FIXED_FIELDS_LEN {
        return Err(SpillSortError::message(format!(
            "spill frame truncated while decoding: need {} bytes, have {}",
            FIXED_FIELDS_LEN,
            payload.len()
        )));
    }
    let (seq_bytes, record) = payload.split_at(FIXED_FIELDS_LEN);
    let mut seq = [0_u8; std::mem::size_of::<u64>()];
    seq.copy_from_slice(seq_bytes);
    entry.seq = u64::from_be_bytes(seq);
    entry.record.clear();
    entry.record.extend_from_slice(record);
    Ok(())
}

#[cfg(test)]
pub fn decode_entry(encoded: &[u8]) -> Result<SpillFormatEntry> {
    if encoded.len() < SPILL_FRAME_HEADER_LEN {
        return Err(SpillSortError::message(format!(
            "spill frame truncated before header: got {} bytes, need at least {}",
            encoded.len(),
            SPILL_FRAME_HEADER_LEN
        )));
    }
    let (frame_header, payload) = encoded.split_at(SPILL_FRAME_HEADER_LEN);
    let payload_len = decode_frame_payload_len(frame_header)?;
    if payload.len() != payload_len {
        return Err(SpillSortError::message(format!(
            "spill frame length mismatch: header declares {} bytes, observed {}",
            payload_len,
            payload.len()
        )));
    }
    let mut entry = SpillFormatEntry::default();
    decode_payload_into(payload, &mut entry)?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> SpillFormatEntry {
        SpillFormatEntry {
            seq: 19,
            record: b"\x00\x03abc\x7f".to_vec(),
        }
    }

    #[test]
    fn encode_decode_roundtrip_preserves_record_and_sequence() {
        let input = sample_entry();
        let encoded = encode_entry(&input).expect("spill format should encode sample entry");
        let decoded =
            decode_entry(encoded.as_slice()).expect("spill format should decode encoded entry");
        assert_eq!(decoded, input);
    }

    #[test]
    fn empty_record_is_a_valid_frame() {
        let input = SpillFormatEntry {
            seq: 0,
            record: Vec::new(),
        };
        let encoded = encode_entry(&input).expect("empty record should encode");
        assert_eq!(encoded.len(), SPILL_FRAME_HEADER_LEN + FIXED_FIELDS_LEN);
        let decoded = decode_entry(encoded.as_slice()).expect("empty record should decode");
        assert_eq!(decoded, input);
    }

    #[test]
    fn decode_rejects_corrupt_magic_prefix() {
        let mut encoded = encode_entry(&sample_entry()).expect("sample entry should encode");
        encoded[..4].copy_from_slice(b"BADS");
        let error = decode_entry(encoded.as_slice())
            .expect_err("decoding should fail for non-TUPS spill magic");
        assert!(error.to_string().contains("magic mismatch"));
    }

    #[test]
    fn decode_rejects_truncated_frame() {
        let mut truncated = Vec::new();
        truncated.extend_from_slice(&SPILL_MAGIC);
        truncated.extend_from_slice(&SPILL_VERSION.to_be_bytes());
        truncated.push(0);

        let error = decode_entry(truncated.as_slice())
            .expect_err("decoding should fail for truncated spill frame");
        assert!(error.to_string().contains("truncated"));
    }
}
