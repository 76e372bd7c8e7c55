use crate::{
    core::{
        grouping::{Collector, GroupHandler, GroupTuples},
        schema::{Field, FieldType, Schema},
        serialization_info::SerializationInfo,
        tuple::{GroupView, Tuple, TupleRead},
    },
    utils::util::Result,
};
use std::sync::Arc;

/// Counts records per group and, with rollup, per closed rollup level.
///
/// Output tuples carry the group fields (deeper levels null on rollup lines)
/// followed by the count. A level at the deepest group field would repeat the
/// group line and is not emitted.
pub struct GroupCounter {
    counts: Vec<u64>,
    out: Tuple,
}

impl GroupCounter {
    pub fn output_schema(info: &SerializationInfo) -> Result<Arc<Schema>> {
        let mut fields: Vec<Field> = info
            .group_schema()
            .fields()
            .iter()
            .map(|f| f.clone().nullable())
            .collect();
        fields.push(Field::new("count", FieldType::Long));
        Ok(Arc::new(Schema::new("counts", fields)?))
    }

    pub fn new(output_schema: Arc<Schema>) -> Self {
        Self {
            counts: vec![0; output_schema.len() - 1],
            out: Tuple::new(output_schema),
        }
    }

    fn emit(
        &mut self,
        key: &GroupView<'_>,
        depth: usize,
        count: u64,
        out: &mut dyn Collector,
    ) -> Result<()> {
        self.out.clear();
        for i in 0..=depth {
            if let Some(value) = key.get(i) {
                self.out.set(i, value.clone())?;
            }
        }
        let count = i64::try_from(count).map_err(|_| crate::tuple_error!("Group count {count} overflows"))?;
        self.out.set(self.counts.len(), count)?;
        out.collect(&self.out)
    }
}

impl GroupHandler for GroupCounter {
    fn on_open_group(
        &mut self,
        depth: usize,
        _field: &str,
        _key: &GroupView<'_>,
        _out: &mut dyn Collector,
    ) -> Result<()> {
        self.counts[depth] = 0;
        Ok(())
    }

    fn on_group(
        &mut self,
        key: &GroupView<'_>,
        tuples: &mut GroupTuples<'_>,
        out: &mut dyn Collector,
    ) -> Result<()> {
        let mut n = 0;
        while tuples.next_tuple()?.is_some() {
            n += 1;
        }
        for count in &mut self.counts {
            *count += n;
        }
        self.emit(key, self.counts.len() - 1, n, out)
    }

    fn on_close_group(
        &mut self,
        depth: usize,
        field: &str,
        key: &GroupView<'_>,
        out: &mut dyn Collector,
    ) -> Result<()> {
        if depth + 1 == self.counts.len() {
            return Ok(());
        }
        log::trace!("Closing rollup level {depth} ({field}) with {} records", self.counts[depth]);
        self.emit(key, depth, self.counts[depth], out)
    }
}
