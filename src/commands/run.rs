//! In-process job harness: maps source tuples into per-partition spill
//! sorters, then runs one grouping driver per partition on a rayon pool.
//! Output tuples travel in batches over a bounded channel to a single
//! writer thread.

use crate::{
    cli::RunArgs,
    constants::DEFAULT_OUTPUT_CHANNEL_CAPACITY,
    core::{
        comparator::SortComparator,
        config::TupleMrConfig,
        grouping::{Collector, GroupHandler, GroupingDriver, GroupingStats},
        partitioner::Partitioner,
        serialization_info::SerializationInfo,
        tuple::Tuple,
    },
    io::{
        intermediate::IntermediateCodec,
        registry::Registry,
        tsv::{write_tuple, TsvReader},
    },
    utils::util::{format_number_with_commas, Result},
};
use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    sync::Arc,
    thread,
};
use tuple_spill_sort::{RecordSorter, SortConfig, SortedRecords};

mod count;
mod shutdown;

pub use count::GroupCounter;

use shutdown::finalize_run;


/// Output tuples of one partition, in emission order.
#[derive(Debug)]
pub struct OutputBatch {
    pub partition: usize,
    pub tuples: Vec<Tuple>,
}

/// Buffers output tuples and forwards them as batches.
struct ChannelCollector<'a> {
    partition: usize,
    batch: Vec<Tuple>,
    capacity: usize,
    sender: &'a Sender<OutputBatch>,
}

impl<'a> ChannelCollector<'a> {
    fn new(partition: usize, capacity: usize, sender: &'a Sender<OutputBatch>) -> Self {
        Self {
            partition,
            batch: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            sender,
        }
    }

    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let tuples = std::mem::replace(&mut self.batch, Vec::with_capacity(self.capacity));
        self.sender
            .send(OutputBatch {
                partition: self.partition,
                tuples,
            })
            .map_err(|_| crate::tuple_error!("Output receiver closed while reducing partition {}", self.partition))
    }
}

impl Collector for ChannelCollector<'_> {
    fn collect(&mut self, tuple: &Tuple) -> Result<()> {
        self.batch.push(tuple.clone());
        if self.batch.len() >= self.capacity {
            self.flush()?;
        }
        Ok(())
    }
}

/// Map side: serializes tuples and routes them to the sorter of their partition.
pub struct MapPhase {
    codec: IntermediateCodec,
    partitioner: Partitioner,
    sorters: Vec<RecordSorter<SortComparator>>,
    buf: Vec<u8>,
    records: u64,
}

impl MapPhase {
    pub fn push(&mut self, tuple: &Tuple) -> Result<()> {
        let id = self.codec.info().source_id(tuple.schema().name())?;
        self.push_source(id, tuple)
    }

    pub fn push_source(&mut self, id: usize, tuple: &Tuple) -> Result<()> {
        let partition = self
            .partitioner
            .partition_source(id, tuple, self.sorters.len())?;
        self.buf.clear();
        self.codec.serialize_source(id, tuple, &mut self.buf)?;
        self.sorters[partition].push_record(&self.buf)?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn finish(self) -> Result<Vec<SortedRecords<SortComparator>>> {
        log::debug!(
            "Map phase finished with {} records",
            format_number_with_commas(self.records)
        );
        let mut partitions = Vec::with_capacity(self.sorters.len());
        for (partition, sorter) in self.sorters.into_iter().enumerate() {
            if sorter.spill_run_count() > 0 {
                log::debug!(
                    "Partition {partition}: {} records in {} spill runs",
                    sorter.record_count(),
                    sorter.spill_run_count()
                );
            }
            partitions.push(sorter.finish()?);
        }
        Ok(partitions)
    }
}

/// Runs a configured job entirely in this process.
pub struct LocalJob {
    info: Arc<SerializationInfo>,
    num_partitions: usize,
    sort_config: SortConfig,
    batch_size: usize,
    pool: ThreadPool,
}

impl LocalJob {
    pub fn new(
        info: Arc<SerializationInfo>,
        num_partitions: usize,
        num_threads: usize,
        sort_config: SortConfig,
    ) -> Result<Self> {
        if num_partitions == 0 {
            return Err(crate::tuple_error!("Number of partitions must be >= 1"));
        }
        log::debug!("Initializing reduce thread pool with {num_threads} threads...");
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("tuplemr-reduce-{i}"))
            .build()
            .map_err(|e| crate::tuple_error!("Failed to initialize reduce thread pool: {e}"))?;
        Ok(Self {
            info,
            num_partitions,
            sort_config,
            batch_size: DEFAULT_OUTPUT_CHANNEL_CAPACITY,
            pool,
        })
    }

    /// Sets how many output tuples a partition buffers before sending them.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn info(&self) -> &Arc<SerializationInfo> {
        &self.info
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    pub fn map_phase(&self) -> Result<MapPhase> {
        let sorters = (0..self.num_partitions)
            .map(|_| {
                RecordSorter::new(
                    self.sort_config.clone(),
                    SortComparator::new(self.info.clone()),
                )
            })
            .collect::<tuple_spill_sort::Result<Vec<_>>>()?;
        Ok(MapPhase {
            codec: IntermediateCodec::new(self.info.clone()),
            partitioner: Partitioner::new(self.info.clone()),
            sorters,
            buf: Vec::new(),
            records: 0,
        })
    }

    /// Groups every partition with a fresh handler from `make_handler`.
    /// Batches of one partition arrive in order; partitions interleave.
    pub fn reduce<F, H>(
        &self,
        partitions: Vec<SortedRecords<SortComparator>>,
        make_handler: F,
        sender: Sender<OutputBatch>,
    ) -> Result<GroupingStats>
    where
        F: Fn() -> H + Sync,
        H: GroupHandler,
    {
        let sender = &sender;
        let make_handler = &make_handler;
        self.pool.install(|| {
            partitions
                .into_par_iter()
                .enumerate()
                .map(|(partition, mut sorted)| -> Result<GroupingStats> {
                    let mut driver = GroupingDriver::new(self.info.clone());
                    let mut handler = make_handler();
                    let mut out = ChannelCollector::new(partition, self.batch_size, sender);
                    let stats = driver.run(&mut sorted, &mut handler, &mut out)?;
                    out.flush()?;
                    sorted.close()?;
                    log::debug!(
                        "Partition {partition}: {} groups, {} records",
                        format_number_with_commas(stats.groups),
                        format_number_with_commas(stats.records)
                    );
                    Ok(stats)
                })
                .try_reduce(GroupingStats::default, |a, b| {
                    Ok(GroupingStats {
                        groups: a.groups + b.groups,
                        records: a.records + b.records,
                    })
                })
        })
    }
}

fn open_output(output: Option<&str>) -> Result<Box<dyn Write + Send>> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| crate::tuple_error!("Failed to create output file {path}: {e}"))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

fn write_batches(receiver: Receiver<OutputBatch>, mut writer: Box<dyn Write + Send>) -> Result<u64> {
    log::debug!("Writer thread started.");
    let mut line = String::new();
    let mut written = 0u64;
    for batch in receiver {
        log::trace!(
            "Writer: {} tuples from partition {}",
            batch.tuples.len(),
            batch.partition
        );
        for tuple in &batch.tuples {
            line.clear();
            write_tuple(tuple, &mut line)?;
            line.push('\n');
            writer.write_all(line.as_bytes())?;
            written += 1;
        }
    }
    writer.flush()?;
    log::debug!("Writer thread finished.");
    Ok(written)
}

pub fn run(args: RunArgs) -> Result<()> {
    let config = TupleMrConfig::from_path(&args.config)?;
    let info = config.build(Arc::new(Registry::new()))?;
    let sort_config = SortConfig::new(
        args.sort_max_mem,
        args.tmp_dir.clone(),
        args.sort_max_open_files,
        args.sort_merge_fan_in,
    )?;
    let job = LocalJob::new(info.clone(), args.num_partitions, args.num_threads, sort_config)?;

    let mut map = job.map_phase()?;
    for input in &args.inputs {
        let id = info.source_id(&input.schema)?;
        let mut tuple = Tuple::new(info.source(id)?.schema().clone());
        let mut reader = TsvReader::from_path(&input.path)?;
        let before = map.records();
        while reader.read_tuple(&mut tuple)? {
            map.push_source(id, &tuple)?;
        }
        log::info!(
            "Read {} '{}' records from {}",
            format_number_with_commas(map.records() - before),
            input.schema,
            input.path.display()
        );
    }
    let partitions = map.finish()?;

    let output_schema = GroupCounter::output_schema(&info)?;
    let writer = open_output(args.output.as_deref())?;
    let (sender, receiver) = bounded(DEFAULT_OUTPUT_CHANNEL_CAPACITY);
    let writer_thread = thread::spawn(move || write_batches(receiver, writer));

    let reduce_result = job.reduce(
        partitions,
        || GroupCounter::new(output_schema.clone()),
        sender,
    );
    let (stats, written) = finalize_run(reduce_result, writer_thread)?;
    log::info!(
        "Grouped {} records into {} groups, wrote {} lines",
        format_number_with_commas(stats.records),
        format_number_with_commas(stats.groups),
        format_number_with_commas(written)
    );
    Ok(())
}
