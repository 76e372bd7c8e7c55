use crate::Result;
use std::cmp::Ordering;

/// Orders two serialized records without decoding them into owned values.
///
/// Implementations may fail on corrupt input; the sorter surfaces the first
/// such failure once the current sort or merge step completes.
pub trait RecordComparator {
    fn compare_records(&self, left: &[u8], right: &[u8]) -> Result<Ordering>;
}

impl<F> RecordComparator for F
where
    F: Fn(&[u8], &[u8]) -> Result<Ordering>,
{
    fn compare_records(&self, left: &[u8], right: &[u8]) -> Result<Ordering> {
        self(left, right)
    }
}

/// Compares two records and breaks ties by insertion sequence so the sort is stable
/// across in-memory runs and spill files.
pub(crate) fn compare_with_sequence<C>(
    comparator: &C,
    left: (&[u8], u64),
    right: (&[u8], u64),
) -> Result<Ordering>
where
    C: RecordComparator + ?Sized,
{
    let ordering = comparator.compare_records(left.0, right.0)?;
    Ok(ordering.then_with(|| left.1.cmp(&right.1)))
}
