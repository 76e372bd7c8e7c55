pub mod error;
pub mod record_sort;

pub use error::{Result, SpillSortError};
pub use record_sort::{RecordComparator, RecordSorter, SortConfig, SortedRecords};
