use super::{
    comparator::{RecordComparator, compare_with_sequence},
    spill_format::SpillFormatEntry,
    spill_reader::SpillReader,
    spill_writer::SpillWriter,
};
use crate::{Result, SpillSortError};
use std::{
    cmp::Ordering,
    fs,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

#[derive(Clone, Debug)]
pub struct SpillRun {
    pub path: PathBuf,
    pub run_id: u64,
}

struct RunReadState {
    run_id: u64,
    reader: SpillReader<BufReader<fs::File>>,
    current: SpillFormatEntry,
}

impl RunReadState {
    fn from_run(run: &SpillRun) -> Result<Option<Self>> {
        let spill_file = fs::File::open(&run.path).map_err(|error| {
            SpillSortError::message(format!(
                "Failed to open spill run {}: {}",
                run.path.display(),
                error
            ))
        })?;
        let mut state = Self {
            run_id: run.run_id,
            reader: SpillReader::new(BufReader::new(spill_file)),
            current: SpillFormatEntry::default(),
        };
        if state.advance()? {
            Ok(Some(state))
        } else {
            Ok(None)
        }
    }

    fn advance(&mut self) -> Result<bool> {
        self.reader
            .read_next_into(&mut self.current)
            .map_err(|error| {
                SpillSortError::message(format!(
                    "Failed to read spill run record run_id={}: {}",
                    self.run_id, error
                ))
            })
    }
}

/// Pull-style k-way merge over spill runs. Each step scans the run heads, which keeps
/// comparator failures on the normal error path; fan-in is bounded by `SortConfig`.
pub struct SpillMerge {
    states: Vec<RunReadState>,
}

impl SpillMerge {
    pub fn open(runs: &[SpillRun]) -> Result<Self> {
        let mut states = Vec::with_capacity(runs.len());
        for run in runs {
            if let Some(state) = RunReadState::from_run(run)? {
                states.push(state);
            }
        }
        Ok(Self { states })
    }

    /// Moves the smallest pending entry into `out`. Returns `false` once every run is drained.
    pub fn next_into<C>(&mut self, comparator: &C, out: &mut SpillFormatEntry) -> Result<bool>
    where
        C: RecordComparator + ?Sized,
    {
        let Some(index) = self.select_min(comparator)? else {
            return Ok(false);
        };
        let state = &mut self.states[index];
        std::mem::swap(&mut state.current, out);
        if !state.advance()? {
            self.states.swap_remove(index);
        }
        Ok(true)
    }

    fn select_min<C>(&self, comparator: &C) -> Result<Option<usize>>
    where
        C: RecordComparator + ?Sized,
    {
        let mut best: Option<usize> = None;
        for (index, state) in self.states.iter().enumerate() {
            let Some(best_index) = best else {
                best = Some(index);
                continue;
            };
            let incumbent = &self.states[best_index].current;
            let ordering = compare_with_sequence(
                comparator,
                (state.current.record.as_slice(), state.current.seq),
                (incumbent.record.as_slice(), incumbent.seq),
            )?;
            if ordering == Ordering::Less {
                best = Some(index);
            }
        }
        Ok(best)
    }
}

pub fn merge_spill_runs_into_writer<C>(
    runs: &[SpillRun],
    comparator: &C,
    writer: &mut SpillWriter<BufWriter<fs::File>>,
) -> Result<u64>
where
    C: RecordComparator + ?Sized,
{
    let mut merge = SpillMerge::open(runs)?;
    let mut entry = SpillFormatEntry::default();
    let mut written = 0u64;
    while merge.next_into(comparator, &mut entry)? {
        writer.write_entry(entry.seq, entry.record.as_slice())?;
        written = written.saturating_add(1);
    }
    Ok(written)
}

pub fn remove_run_file(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|error| {
        SpillSortError::message(format!(
            "Failed to remove spill run {}: {}",
            path.display(),
            error
        ))
    })
}

pub fn create_spill_writer(path: &Path) -> Result<SpillWriter<BufWriter<fs::File>>> {
    let spill_file = fs::File::create(path).map_err(|error| {
        SpillSortError::message(format!(
            "Failed to create spill run {}: {}",
            path.display(),
            error
        ))
    })?;
    Ok(SpillWriter::new(BufWriter::new(spill_file)))
}

pub fn finish_spill_writer(writer: SpillWriter<BufWriter<fs::File>>, path: &Path) -> Result<()> {
    writer.finish().map_err(|error| {
        SpillSortError::message(format!(
            "Failed to finalize spill run {}: {}",
            path.display(),
            error
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_run_file_error_includes_cleanup_path_context() {
        let temp_dir =
            tempfile::TempDir::new().expect("temporary directory for cleanup test should exist");
        let missing_path = temp_dir.path().join("missing.spill");
        let error = remove_run_file(missing_path.as_path())
            .expect_err("removing a missing spill path should fail");
        let message = error.to_string();
        assert!(
            message.contains("Failed to remove spill run"),
            "cleanup error should include contextual prefix: {message}"
        );
        assert!(
            message.contains(missing_path.to_string_lossy().as_ref()),
            "cleanup error should include failing path: {message}"
        );
    }

    #[test]
    fn merge_interleaves_runs_by_record_then_sequence() {
        let temp_dir = tempfile::TempDir::new().expect("temporary directory should exist");
        let runs = [
            (0u64, vec![(0u64, b"a".to_vec()), (2, b"c".to_vec())]),
            (1u64, vec![(1u64, b"a".to_vec()), (3, b"b".to_vec())]),
        ]
        .into_iter()
        .map(|(run_id, entries)| {
            let path = temp_dir.path().join(format!("run_{run_id}.spill"));
            let mut writer = create_spill_writer(&path).expect("spill writer should open");
            for (seq, record) in entries {
                writer
                    .write_entry(seq, record.as_slice())
                    .expect("spill entry should be written");
            }
            finish_spill_writer(writer, &path).expect("spill writer should finish");
            SpillRun { path, run_id }
        })
        .collect::<Vec<_>>();

        let comparator = |left: &[u8], right: &[u8]| -> Result<Ordering> { Ok(left.cmp(right)) };
        let mut merge = SpillMerge::open(&runs).expect("merge should open runs");
        let mut entry = SpillFormatEntry::default();
        let mut observed = Vec::new();
        while merge
            .next_into(&comparator, &mut entry)
            .expect("merge should advance")
        {
            observed.push((entry.seq, entry.record.clone()));
        }
        assert_eq!(
            observed,
            vec![
                (0, b"a".to_vec()),
                (1, b"a".to_vec()),
                (3, b"b".to_vec()),
                (2, b"c".to_vec()),
            ]
        );
    }
}
