mod comparator;
mod config;
mod pending;
mod sorter;
mod spill;
mod spill_format;
mod spill_reader;
mod spill_writer;

pub use comparator::RecordComparator;
pub use config::SortConfig;
pub use sorter::{RecordSorter, SortedRecords};
