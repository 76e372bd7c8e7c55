/// Pseudo-field designating the position of the source id in a sort order.
pub const SOURCE_ORDER_FIELD: &str = "#source";
/// Prefix of names reserved for synthetic fields.
pub const RESERVED_FIELD_PREFIX: char = '#';

pub const DEFAULT_NUM_PARTITIONS: usize = 4;
pub const DEFAULT_NUM_THREADS: usize = 1;
pub const DEFAULT_SORT_MAX_MEM: usize = 64 * 1024 * 1024;
pub const DEFAULT_SORT_MAX_OPEN_FILES: usize = 64;
pub const DEFAULT_SORT_MERGE_FAN_IN: usize = 16;
pub const DEFAULT_OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Marker written for unset fields in TSV output and read back as null.
pub const TSV_NULL: &str = "\\N";
