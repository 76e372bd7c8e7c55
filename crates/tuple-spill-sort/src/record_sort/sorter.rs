use super::{
    comparator::RecordComparator,
    config::SortConfig,
    pending::{PendingRecord, drain_pending_into_sink, sort_pending_records},
    spill::{
        SpillMerge, SpillRun, create_spill_writer, finish_spill_writer,
        merge_spill_runs_into_writer, remove_run_file,
    },
    spill_format::SpillFormatEntry,
};
use crate::{Result, SpillSortError};
use std::path::PathBuf;

const LOG_PREFIX: &str = "tuple-spill-sort";

#[cfg(feature = "logging")]
macro_rules! sorter_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! sorter_debug {
    ($($arg:tt)*) => {{
        if false {
            let _ = format_args!($($arg)*);
        }
    }};
}

#[cfg(feature = "logging")]
macro_rules! sorter_warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! sorter_warn {
    ($($arg:tt)*) => {{
        if false {
            let _ = format_args!($($arg)*);
        }
    }};
}

/// Buffers serialized records in memory and spills sorted runs to disk once the
/// configured memory cap is exceeded. Records comparing equal keep insertion order.
#[derive(Debug)]
pub struct RecordSorter<C> {
    config: SortConfig,
    comparator: C,
    temp_dir: tempfile::TempDir,
    pending: Vec<PendingRecord>,
    pending_bytes: usize,
    spill_runs: Vec<SpillRun>,
    next_run_id: u64,
    next_seq: u64,
}

impl<C: RecordComparator> RecordSorter<C> {
    pub fn new(config: SortConfig, comparator: C) -> Result<Self> {
        let config = SortConfig::new(
            config.max_mem,
            config.tmp_dir.clone(),
            config.max_open_files,
            config.merge_fan_in,
        )?;

        let temp_dir = match config.tmp_dir.as_ref() {
            Some(root) => tempfile::Builder::new()
                .prefix("tuple-sort-")
                .tempdir_in(root)
                .map_err(|error| {
                    SpillSortError::message(format!(
                        "Failed to create sort temp directory under {}: {}",
                        root.display(),
                        error
                    ))
                })?,
            None => tempfile::Builder::new()
                .prefix("tuple-sort-")
                .tempdir()
                .map_err(|error| {
                    SpillSortError::message(format!(
                        "Failed to create sort temp directory: {error}"
                    ))
                })?,
        };

        sorter_debug!(
            "{LOG_PREFIX}: initialized sorter max_mem={} max_open_files={} merge_fan_in={} temp_dir={}",
            config.max_mem,
            config.max_open_files,
            config.merge_fan_in,
            temp_dir.path().display()
        );

        Ok(Self {
            config,
            comparator,
            temp_dir,
            pending: Vec::new(),
            pending_bytes: 0,
            spill_runs: Vec::new(),
            next_run_id: 0,
            next_seq: 0,
        })
    }

    pub fn push_record(&mut self, record: &[u8]) -> Result<()> {
        let pending = PendingRecord {
            seq: self.next_seq,
            record: record.to_vec(),
        };
        self.next_seq = self.next_seq.saturating_add(1);
        self.pending_bytes = self.pending_bytes.saturating_add(pending.approx_bytes());
        self.pending.push(pending);

        if self.pending_bytes > self.config.max_mem {
            sorter_debug!(
                "{LOG_PREFIX}: memory cap exceeded (pending_bytes={}/{}), spilling {} records",
                self.pending_bytes,
                self.config.max_mem,
                self.pending.len()
            );
            self.spill_pending()?;
        }
        Ok(())
    }

    pub fn record_count(&self) -> u64 {
        self.next_seq
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub fn spill_run_count(&self) -> usize {
        self.spill_runs.len()
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn spill_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let run_id = self.next_run_id;
        self.next_run_id = self.next_run_id.saturating_add(1);
        let path = self.run_path(run_id);
        let mut writer = create_spill_writer(path.as_path())?;
        drain_pending_into_sink(
            &mut self.pending,
            &mut self.pending_bytes,
            &self.comparator,
            |record| writer.write_entry(record.seq, record.record.as_slice()),
        )?;
        finish_spill_writer(writer, path.as_path())?;

        sorter_debug!(
            "{LOG_PREFIX}: created spill run id={} path={}",
            run_id,
            path.display()
        );
        self.spill_runs.push(SpillRun { path, run_id });
        Ok(())
    }

    /// Consumes the sorter and returns the records in sorted order.
    pub fn finish(mut self) -> Result<SortedRecords<C>> {
        if self.spill_runs.is_empty() {
            sorter_debug!(
                "{LOG_PREFIX}: no spill runs; sorting {} buffered records in memory",
                self.pending.len()
            );
            sort_pending_records(self.pending.as_mut_slice(), &self.comparator)?;
            let records = std::mem::take(&mut self.pending);
            return Ok(SortedRecords {
                comparator: self.comparator,
                source: SortedSource::Memory(records.into_iter()),
                temp_dir: self.temp_dir,
            });
        }

        self.spill_pending()?;
        self.compact_spill_runs()?;
        sorter_debug!(
            "{LOG_PREFIX}: merging {} spill runs into final output",
            self.spill_runs.len()
        );
        let merge = SpillMerge::open(self.spill_runs.as_slice())?;
        Ok(SortedRecords {
            comparator: self.comparator,
            source: SortedSource::Spilled {
                merge,
                entry: SpillFormatEntry::default(),
            },
            temp_dir: self.temp_dir,
        })
    }

    fn run_path(&self, run_id: u64) -> PathBuf {
        self.temp_dir.path().join(format!("run_{run_id:012}.spill"))
    }

    fn compact_spill_runs(&mut self) -> Result<()> {
        let fan_in = self.config.merge_fan_in;
        while self.spill_runs.len() > fan_in {
            let chunk = self.spill_runs.drain(0..fan_in).collect::<Vec<_>>();
            let merged = self.merge_runs_to_new_spill(chunk)?;
            self.spill_runs.push(merged);
        }
        Ok(())
    }

    fn merge_runs_to_new_spill(&mut self, runs: Vec<SpillRun>) -> Result<SpillRun> {
        let run_id = self.next_run_id;
        self.next_run_id = self.next_run_id.saturating_add(1);
        let path = self.run_path(run_id);
        sorter_debug!(
            "{LOG_PREFIX}: k-way merging runs {:?} into spill run id={}",
            runs.iter().map(|run| run.run_id).collect::<Vec<_>>(),
            run_id
        );

        let mut writer = create_spill_writer(path.as_path())?;
        merge_spill_runs_into_writer(runs.as_slice(), &self.comparator, &mut writer)?;
        finish_spill_writer(writer, path.as_path())?;

        for run in runs {
            if let Err(error) = remove_run_file(run.path.as_path()) {
                sorter_warn!("{LOG_PREFIX}: {error}");
                return Err(error);
            }
        }
        Ok(SpillRun { path, run_id })
    }
}

enum SortedSource {
    Memory(std::vec::IntoIter<PendingRecord>),
    Spilled {
        merge: SpillMerge,
        entry: SpillFormatEntry,
    },
}

/// Sorted output of a [`RecordSorter`]. Spill files live until this value is dropped
/// or closed.
pub struct SortedRecords<C> {
    comparator: C,
    source: SortedSource,
    temp_dir: tempfile::TempDir,
}

impl<C: RecordComparator> SortedRecords<C> {
    /// Replaces `out` with the next record. Returns `false` when the output is exhausted.
    pub fn read_next(&mut self, out: &mut Vec<u8>) -> Result<bool> {
        match &mut self.source {
            SortedSource::Memory(records) => match records.next() {
                Some(mut record) => {
                    std::mem::swap(out, &mut record.record);
                    Ok(true)
                }
                None => Ok(false),
            },
            SortedSource::Spilled { merge, entry } => {
                if !merge.next_into(&self.comparator, entry)? {
                    return Ok(false);
                }
                std::mem::swap(out, &mut entry.record);
                Ok(true)
            }
        }
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self.source, SortedSource::Spilled { .. })
    }

    /// Removes the spill directory, surfacing cleanup failures instead of ignoring them on drop.
    pub fn close(self) -> Result<()> {
        let path = self.temp_dir.path().to_path_buf();
        self.temp_dir.close().map_err(|error| {
            SpillSortError::message(format!(
                "Failed to remove sort temp directory {}: {}",
                path.display(),
                error
            ))
        })
    }
}
