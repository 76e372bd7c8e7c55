//! Reduce-side driver: walks one sorted partition, detects group boundaries
//! with the group comparator and hands every group to a [`GroupHandler`],
//! interleaving rollup open/close events when rollup is configured.

use crate::{
    core::{
        comparator::GroupComparator,
        rollup::Rollup,
        serialization_info::SerializationInfo,
        tuple::{GroupView, Tuple},
    },
    io::intermediate::{IntermediateCodec, IntermediateRecord},
    utils::util::Result,
};
use std::{cmp::Ordering, sync::Arc};
use tuple_spill_sort::SortedRecords;

/// Pull-style stream of intermediate records in sort order.
pub trait RecordSource {
    /// Replaces `out` with the next record; `false` once exhausted.
    fn read_next(&mut self, out: &mut Vec<u8>) -> Result<bool>;
}

impl<C: tuple_spill_sort::RecordComparator> RecordSource for SortedRecords<C> {
    fn read_next(&mut self, out: &mut Vec<u8>) -> Result<bool> {
        Ok(SortedRecords::read_next(self, out)?)
    }
}

impl RecordSource for std::vec::IntoIter<Vec<u8>> {
    fn read_next(&mut self, out: &mut Vec<u8>) -> Result<bool> {
        match self.next() {
            Some(record) => {
                *out = record;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Sink for output tuples.
pub trait Collector {
    fn collect(&mut self, tuple: &Tuple) -> Result<()>;
}

impl Collector for Vec<Tuple> {
    fn collect(&mut self, tuple: &Tuple) -> Result<()> {
        self.push(tuple.clone());
        Ok(())
    }
}

/// Callbacks of the grouping driver. `depth` indexes the group schema and
/// `field` is the group field at that depth.
pub trait GroupHandler {
    fn on_open_group(
        &mut self,
        _depth: usize,
        _field: &str,
        _key: &GroupView<'_>,
        _out: &mut dyn Collector,
    ) -> Result<()> {
        Ok(())
    }

    fn on_group(
        &mut self,
        key: &GroupView<'_>,
        tuples: &mut GroupTuples<'_>,
        out: &mut dyn Collector,
    ) -> Result<()>;

    fn on_close_group(
        &mut self,
        _depth: usize,
        _field: &str,
        _key: &GroupView<'_>,
        _out: &mut dyn Collector,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stream {
    Key,
    Records,
    Ended { has_next: bool },
}

/// The tuples of one group, in sort order, starting with the key record.
///
/// Records are decoded one at a time into a reused slot: a returned tuple is
/// only valid until the next call.
pub struct GroupTuples<'a> {
    key: &'a IntermediateRecord,
    cursor: &'a mut IntermediateRecord,
    next_key: &'a mut IntermediateRecord,
    source: &'a mut dyn RecordSource,
    codec: &'a IntermediateCodec,
    group: &'a GroupComparator,
    state: Stream,
    records: u64,
}

impl GroupTuples<'_> {
    pub fn next_tuple(&mut self) -> Result<Option<&Tuple>> {
        match self.state {
            Stream::Key => {
                self.state = Stream::Records;
                self.records += 1;
                Ok(Some(self.key.tuple()))
            }
            Stream::Records => {
                if !self.advance()? {
                    return Ok(None);
                }
                self.codec.decode(self.cursor)?;
                Ok(Some(self.cursor.tuple()))
            }
            Stream::Ended { .. } => Ok(None),
        }
    }

    /// Reads the next record; a record of another group becomes the next key.
    fn advance(&mut self) -> Result<bool> {
        if !self.source.read_next(self.cursor.bytes_mut())? {
            self.state = Stream::Ended { has_next: false };
            return Ok(false);
        }
        if self.group.compare(self.key.bytes(), self.cursor.bytes())? == Ordering::Equal {
            self.records += 1;
            return Ok(true);
        }
        std::mem::swap(&mut *self.cursor, &mut *self.next_key);
        self.state = Stream::Ended { has_next: true };
        Ok(false)
    }

    /// Skips what the handler left unread; returns whether another group follows.
    fn drain(mut self) -> Result<(bool, u64)> {
        loop {
            match self.state {
                Stream::Key => {
                    self.state = Stream::Records;
                    self.records += 1;
                }
                Stream::Records => {
                    self.advance()?;
                }
                Stream::Ended { has_next } => return Ok((has_next, self.records)),
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupingStats {
    pub groups: u64,
    pub records: u64,
}

fn key_view<'a>(info: &'a SerializationInfo, record: &'a IntermediateRecord) -> Result<GroupView<'a>> {
    let source = info.source(record.source())?;
    Ok(GroupView::new(
        info.group_schema(),
        record.tuple(),
        source.group_translation(),
    ))
}

/// Runs groups of one partition. Keeps two key records (previous and
/// current) plus a streaming cursor, all reused across groups.
pub struct GroupingDriver {
    info: Arc<SerializationInfo>,
    codec: IntermediateCodec,
    group: GroupComparator,
    rollup: Option<Rollup>,
    keys: [IntermediateRecord; 2],
    cursor: IntermediateRecord,
}

impl GroupingDriver {
    pub fn new(info: Arc<SerializationInfo>) -> Self {
        let codec = IntermediateCodec::new(info.clone());
        let keys = [codec.new_record(), codec.new_record()];
        let cursor = codec.new_record();
        Self {
            group: GroupComparator::new(info.clone()),
            rollup: info.rollup().map(Rollup::new),
            info,
            codec,
            keys,
            cursor,
        }
    }

    pub fn run(
        &mut self,
        source: &mut dyn RecordSource,
        handler: &mut dyn GroupHandler,
        out: &mut dyn Collector,
    ) -> Result<GroupingStats> {
        let mut stats = GroupingStats::default();
        let mut current = 0;
        if !source.read_next(self.keys[current].bytes_mut())? {
            return Ok(stats);
        }
        self.codec.decode(&mut self.keys[current])?;

        let info = self.info.clone();
        let group_schema = info.group_schema();
        if let Some(rollup) = self.rollup {
            let key = key_view(&info, &self.keys[current])?;
            for depth in rollup.begin() {
                handler.on_open_group(depth, group_schema.field(depth).name(), &key, out)?;
            }
        }

        loop {
            let (has_next, records) = {
                let [first, second] = &mut self.keys;
                let (key, next_key) = if current == 0 {
                    (&*first, second)
                } else {
                    (&*second, first)
                };
                let view = key_view(&info, key)?;
                let mut tuples = GroupTuples {
                    key,
                    cursor: &mut self.cursor,
                    next_key,
                    source: &mut *source,
                    codec: &self.codec,
                    group: &self.group,
                    state: Stream::Key,
                    records: 0,
                };
                handler.on_group(&view, &mut tuples, out)?;
                tuples.drain()?
            };
            stats.groups += 1;
            stats.records += records;

            let previous = current;
            current = 1 - current;
            if !has_next {
                if let Some(rollup) = self.rollup {
                    let key = key_view(&info, &self.keys[previous])?;
                    for depth in rollup.finish() {
                        handler.on_close_group(depth, group_schema.field(depth).name(), &key, out)?;
                    }
                }
                break;
            }

            self.codec.decode(&mut self.keys[current])?;
            if let Some(rollup) = self.rollup {
                let old = key_view(&info, &self.keys[previous])?;
                let new = key_view(&info, &self.keys[current])?;
                if let Some(transition) = rollup.transition(&old, &new) {
                    for depth in transition.close {
                        handler.on_close_group(depth, group_schema.field(depth).name(), &old, out)?;
                    }
                    for depth in transition.open {
                        handler.on_open_group(depth, group_schema.field(depth).name(), &new, out)?;
                    }
                }
            }
        }
        log::trace!("Grouped {} records into {} groups", stats.records, stats.groups);
        Ok(stats)
    }
}
