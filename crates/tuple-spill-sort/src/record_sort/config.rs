use crate::{Result, SpillSortError};
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct SortConfig {
    pub max_mem: usize,
    pub tmp_dir: Option<PathBuf>,
    pub max_open_files: usize,
    pub merge_fan_in: usize,
}

impl SortConfig {
    pub fn new(
        max_mem: usize,
        tmp_dir: Option<PathBuf>,
        max_open_files: usize,
        merge_fan_in: usize,
    ) -> Result<Self> {
        if max_mem == 0 {
            return Err(SpillSortError::message("sort-max-mem must be >= 1"));
        }
        if max_open_files == 0 {
            return Err(SpillSortError::message("sort-max-open-files must be >= 1"));
        }
        if merge_fan_in < 2 {
            return Err(SpillSortError::message(format!(
                "sort-merge-fan-in must be >= 2, got {merge_fan_in}"
            )));
        }
        if merge_fan_in > max_open_files {
            return Err(SpillSortError::message(format!(
                "sort-merge-fan-in ({merge_fan_in}) must be <= sort-max-open-files ({max_open_files})"
            )));
        }

        Ok(Self {
            max_mem,
            tmp_dir,
            max_open_files,
            merge_fan_in,
        })
    }
}
