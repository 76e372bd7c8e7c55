use super::comparator::{RecordComparator, compare_with_sequence};
use crate::{Result, SpillSortError};
use std::cmp::Ordering;

/// Fixed per-record bookkeeping charged against the memory cap on top of the payload.
pub const PENDING_RECORD_OVERHEAD: usize = 32;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingRecord {
    pub seq: u64,
    pub record: Vec<u8>,
}

impl PendingRecord {
    pub fn approx_bytes(&self) -> usize {
        PENDING_RECORD_OVERHEAD.saturating_add(self.record.len())
    }
}

/// Sorts buffered records in place. The first comparator failure is returned after the
/// sort finishes; the order of `pending` is unspecified in that case.
pub fn sort_pending_records<C>(pending: &mut [PendingRecord], comparator: &C) -> Result<()>
where
    C: RecordComparator + ?Sized,
{
    let mut failure: Option<SpillSortError> = None;
    pending.sort_by(|left, right| {
        match compare_with_sequence(
            comparator,
            (left.record.as_slice(), left.seq),
            (right.record.as_slice(), right.seq),
        ) {
            Ok(ordering) => ordering,
            Err(error) => {
                failure.get_or_insert(error);
                left.seq.cmp(&right.seq)
            }
        }
    });
    match failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Drains buffered records in sorted order into `emit`, leaving the buffer empty.
pub fn drain_pending_into_sink<C, F>(
    pending: &mut Vec<PendingRecord>,
    pending_bytes: &mut usize,
    comparator: &C,
    mut emit: F,
) -> Result<()>
where
    C: RecordComparator + ?Sized,
    F: FnMut(&PendingRecord) -> Result<()>,
{
    if pending.is_empty() {
        return Ok(());
    }
    sort_pending_records(pending.as_mut_slice(), comparator)?;
    for record in pending.iter() {
        emit(record)?;
    }
    pending.clear();
    *pending_bytes = 0;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexicographic(left: &[u8], right: &[u8]) -> Result<Ordering> {
        Ok(left.cmp(right))
    }

    fn always_fails(_: &[u8], _: &[u8]) -> Result<Ordering> {
        Err(SpillSortError::compare("corrupt record"))
    }

    fn pending(seq: u64, record: &[u8]) -> PendingRecord {
        PendingRecord {
            seq,
            record: record.to_vec(),
        }
    }

    #[test]
    fn pending_sort_is_stable_for_equal_records() {
        let mut records = vec![pending(0, b"b"), pending(1, b"a"), pending(2, b"b")];
        sort_pending_records(&mut records, &lexicographic).expect("pending sort should succeed");
        let sequences = records.iter().map(|record| record.seq).collect::<Vec<_>>();
        assert_eq!(sequences, vec![1, 0, 2]);
    }

    #[test]
    fn pending_sort_surfaces_comparator_failure() {
        let mut records = vec![pending(0, b"x"), pending(1, b"y")];
        let error = sort_pending_records(&mut records, &always_fails)
            .expect_err("comparator failure should propagate");
        assert!(error.to_string().contains("corrupt record"));
    }

    #[test]
    fn drain_resets_pending_bytes() {
        let mut records = vec![pending(0, b"z"), pending(1, b"c")];
        let mut pending_bytes = records.iter().map(PendingRecord::approx_bytes).sum::<usize>();
        let mut observed = Vec::new();
        drain_pending_into_sink(
            &mut records,
            &mut pending_bytes,
            &lexicographic,
            |record| {
                observed.push(record.record.clone());
                Ok(())
            },
        )
        .expect("drain should succeed");
        assert_eq!(observed, vec![b"c".to_vec(), b"z".to_vec()]);
        assert!(records.is_empty());
        assert_eq!(pending_bytes, 0);
    }
}
