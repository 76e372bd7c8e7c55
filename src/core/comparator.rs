//! Byte-level comparison of encoded records.
//!
//! Comparators walk two encoded records field by field with independent
//! cursors and return on the first difference, so records are never decoded
//! into tuples. They hold no mutable state and can be shared across threads.

use crate::{
    core::{
        criteria::{Criteria, SortOrder},
        serialization_info::SerializationInfo,
    },
    error::TupleError,
    io::{
        codec::{is_null, FieldCodec, RecordCodec},
        registry::{RawComparator, Registry},
        varint::{read_vlong, take, take_array},
    },
    utils::util::Result,
};
use std::{cmp::Ordering, fmt, sync::Arc};
use tuple_spill_sort::SpillSortError;

#[cfg(test)]
use crate::core::{tuple::Tuple, value::Value};

struct CompareStep {
    position: usize,
    order: SortOrder,
    custom: Option<Arc<dyn RawComparator>>,
}

/// Compares two records of one schema under a sort criteria.
///
/// When the criteria positions increase in schema order the records are
/// compared in a single streaming pass; otherwise the field offsets of both
/// records are located first.
pub struct RecordComparator {
    codec: Arc<RecordCodec>,
    steps: Vec<CompareStep>,
    streaming: bool,
}

impl RecordComparator {
    pub fn new(codec: Arc<RecordCodec>, criteria: &Criteria, registry: &Registry) -> Result<Self> {
        let schema = codec.schema();
        let mut steps = Vec::with_capacity(criteria.len());
        for element in criteria.elements() {
            let position = schema
                .index_of(&element.field)
                .ok_or_else(|| TupleError::missing_field(schema.name(), &element.field))?;
            let custom = element
                .comparator
                .as_deref()
                .map(|name| registry.resolve_comparator(name))
                .transpose()?;
            steps.push(CompareStep {
                position,
                order: element.order,
                custom,
            });
        }
        let streaming = steps.windows(2).all(|w| w[0].position < w[1].position);
        Ok(Self {
            codec,
            steps,
            streaming,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn codec(&self) -> &Arc<RecordCodec> {
        &self.codec
    }

    /// Compares two buffers holding exactly one record each.
    pub fn compare(&self, left: &[u8], right: &[u8]) -> Result<Ordering> {
        let (mut l, mut r) = (0, 0);
        self.compare_at(left, &mut l, right, &mut r, self.steps.len(), false)
    }

    /// Compares the first `limit` criteria of the records starting at the two
    /// cursors. With `to_end`, a tie leaves both cursors past their records.
    pub(crate) fn compare_at(
        &self,
        left: &[u8],
        lpos: &mut usize,
        right: &[u8],
        rpos: &mut usize,
        limit: usize,
        to_end: bool,
    ) -> Result<Ordering> {
        if self.streaming {
            self.compare_streaming(left, lpos, right, rpos, limit, to_end)
        } else {
            self.compare_located(left, lpos, right, rpos, limit)
        }
    }

    fn compare_streaming(
        &self,
        left: &[u8],
        lpos: &mut usize,
        right: &[u8],
        rpos: &mut usize,
        limit: usize,
        to_end: bool,
    ) -> Result<Ordering> {
        let schema = self.codec.schema();
        let bitmap_len = schema.null_bitmap_len();
        let lnulls = take(left, lpos, bitmap_len)?;
        let rnulls = take(right, rpos, bitmap_len)?;

        let mut field = 0;
        for step in &self.steps[..limit] {
            while field < step.position {
                self.skip_both(field, (left, lnulls, &mut *lpos), (right, rnulls, &mut *rpos))?;
                field += 1;
            }
            let slot = schema.null_slot(field);
            let ordering = match (is_null(lnulls, slot), is_null(rnulls, slot)) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => compare_field(
                    self.codec.field_codec(field),
                    left,
                    lpos,
                    right,
                    rpos,
                    step.custom.as_deref(),
                )?,
            };
            field += 1;
            if ordering != Ordering::Equal {
                return Ok(step.order.apply(ordering));
            }
        }
        if to_end {
            while field < schema.len() {
                self.skip_both(field, (left, lnulls, &mut *lpos), (right, rnulls, &mut *rpos))?;
                field += 1;
            }
        }
        Ok(Ordering::Equal)
    }

    fn skip_both(
        &self,
        field: usize,
        (left, lnulls, lpos): (&[u8], &[u8], &mut usize),
        (right, rnulls, rpos): (&[u8], &[u8], &mut usize),
    ) -> Result<()> {
        let slot = self.codec.schema().null_slot(field);
        let codec = self.codec.field_codec(field);
        if !is_null(lnulls, slot) {
            codec.skip(left, lpos)?;
        }
        if !is_null(rnulls, slot) {
            codec.skip(right, rpos)?;
        }
        Ok(())
    }

    /// Start offset of every field, `None` for nulls. Leaves `pos` past the record.
    fn locate(&self, buf: &[u8], pos: &mut usize) -> Result<Vec<Option<usize>>> {
        let schema = self.codec.schema();
        let nulls = take(buf, pos, schema.null_bitmap_len())?;
        let mut offsets = Vec::with_capacity(schema.len());
        for field in 0..schema.len() {
            if is_null(nulls, schema.null_slot(field)) {
                offsets.push(None);
            } else {
                offsets.push(Some(*pos));
                self.codec.field_codec(field).skip(buf, pos)?;
            }
        }
        Ok(offsets)
    }

    fn compare_located(
        &self,
        left: &[u8],
        lpos: &mut usize,
        right: &[u8],
        rpos: &mut usize,
        limit: usize,
    ) -> Result<Ordering> {
        let loffsets = self.locate(left, lpos)?;
        let roffsets = self.locate(right, rpos)?;
        for step in &self.steps[..limit] {
            let ordering = match (loffsets[step.position], roffsets[step.position]) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(mut l), Some(mut r)) => compare_field(
                    self.codec.field_codec(step.position),
                    left,
                    &mut l,
                    right,
                    &mut r,
                    step.custom.as_deref(),
                )?,
            };
            if ordering != Ordering::Equal {
                return Ok(step.order.apply(ordering));
            }
        }
        Ok(Ordering::Equal)
    }

    /// Same order as [`RecordComparator::compare`], on materialized tuples.
    #[cfg(test)]
    pub(crate) fn compare_tuples(&self, left: &Tuple, right: &Tuple) -> Result<Ordering> {
        for step in &self.steps {
            let ordering = match (left.get(step.position), right.get(step.position)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(l), Some(r)) => match &step.custom {
                    Some(custom) => custom.compare(l, r)?,
                    None => compare_values(self.codec.field_codec(step.position), l, r)?,
                },
            };
            if ordering != Ordering::Equal {
                return Ok(step.order.apply(ordering));
            }
        }
        Ok(Ordering::Equal)
    }
}

impl fmt::Debug for RecordComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordComparator")
            .field("schema", &self.codec.schema().to_string())
            .field(
                "positions",
                &self.steps.iter().map(|s| s.position).collect::<Vec<_>>(),
            )
            .field("streaming", &self.streaming)
            .finish()
    }
}

/// Compares one non-null field of both records, advancing both cursors
/// unless the comparison is decided early.
fn compare_field(
    codec: &FieldCodec,
    left: &[u8],
    lpos: &mut usize,
    right: &[u8],
    rpos: &mut usize,
    custom: Option<&dyn RawComparator>,
) -> Result<Ordering> {
    if let Some(custom) = custom {
        let l = codec.span(left, lpos)?;
        let r = codec.span(right, rpos)?;
        return custom.compare_raw(l, r);
    }
    let ordering = match codec {
        FieldCodec::Int => {
            i32::from_be_bytes(take_array(left, lpos)?).cmp(&i32::from_be_bytes(take_array(right, rpos)?))
        }
        FieldCodec::Long => {
            i64::from_be_bytes(take_array(left, lpos)?).cmp(&i64::from_be_bytes(take_array(right, rpos)?))
        }
        FieldCodec::Float => f32::from_be_bytes(take_array(left, lpos)?)
            .total_cmp(&f32::from_be_bytes(take_array(right, rpos)?)),
        FieldCodec::Double => f64::from_be_bytes(take_array(left, lpos)?)
            .total_cmp(&f64::from_be_bytes(take_array(right, rpos)?)),
        FieldCodec::Boolean => take_array::<1>(left, lpos)?.cmp(&take_array::<1>(right, rpos)?),
        FieldCodec::VInt | FieldCodec::VLong | FieldCodec::Enum(_) => {
            read_vlong(left, lpos)?.cmp(&read_vlong(right, rpos)?)
        }
        FieldCodec::String | FieldCodec::Bytes | FieldCodec::Object { .. } => {
            codec.span(left, lpos)?.cmp(codec.span(right, rpos)?)
        }
        FieldCodec::Tuple(nested) => compare_nested(nested, left, lpos, right, rpos)?,
    };
    Ok(ordering)
}

/// Nested tuples order ascending by all of their fields, nulls first.
fn compare_nested(
    codec: &RecordCodec,
    left: &[u8],
    lpos: &mut usize,
    right: &[u8],
    rpos: &mut usize,
) -> Result<Ordering> {
    let schema = codec.schema();
    let lnulls = take(left, lpos, schema.null_bitmap_len())?;
    let rnulls = take(right, rpos, schema.null_bitmap_len())?;
    for field in 0..schema.len() {
        let slot = schema.null_slot(field);
        let ordering = match (is_null(lnulls, slot), is_null(rnulls, slot)) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => compare_field(codec.field_codec(field), left, lpos, right, rpos, None)?,
        };
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
    }
    Ok(Ordering::Equal)
}

#[cfg(test)]
fn compare_values(codec: &FieldCodec, left: &Value, right: &Value) -> Result<Ordering> {
    let ordering = match (codec, left, right) {
        (_, Value::Int(l), Value::Int(r)) => l.cmp(r),
        (_, Value::Long(l), Value::Long(r)) => l.cmp(r),
        (_, Value::Float(l), Value::Float(r)) => l.total_cmp(r),
        (_, Value::Double(l), Value::Double(r)) => l.total_cmp(r),
        (_, Value::Boolean(l), Value::Boolean(r)) => l.cmp(r),
        (_, Value::String(l), Value::String(r)) => l.as_bytes().cmp(r.as_bytes()),
        (_, Value::Bytes(l), Value::Bytes(r)) => l.cmp(r),
        (_, Value::Enum(l), Value::Enum(r)) => l.cmp(r),
        (FieldCodec::Object { serializer, .. }, Value::Object(l), Value::Object(r)) => {
            let (mut lb, mut rb) = (Vec::new(), Vec::new());
            serializer.serialize(l.as_ref(), &mut lb)?;
            serializer.serialize(r.as_ref(), &mut rb)?;
            lb.cmp(&rb)
        }
        (FieldCodec::Tuple(nested), Value::Tuple(l), Value::Tuple(r)) => {
            for field in 0..nested.schema().len() {
                let ordering = match (l.get(field), r.get(field)) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (Some(lv), Some(rv)) => compare_values(nested.field_codec(field), lv, rv)?,
                };
                if ordering != Ordering::Equal {
                    return Ok(ordering);
                }
            }
            Ordering::Equal
        }
        _ => {
            return Err(crate::tuple_error!(
                "Cannot compare {} with {}",
                left.type_name(),
                right.type_name()
            ))
        }
    };
    Ok(ordering)
}

fn read_source_id(buf: &[u8], pos: &mut usize) -> Result<i64> {
    read_vlong(buf, pos)
}

/// Total order of intermediate records: common fields, then source id, then
/// the specific fields of that source.
#[derive(Clone)]
pub struct SortComparator {
    info: Arc<SerializationInfo>,
}

impl SortComparator {
    pub fn new(info: Arc<SerializationInfo>) -> Self {
        Self { info }
    }

    pub fn compare(&self, left: &[u8], right: &[u8]) -> Result<Ordering> {
        let (mut l, mut r) = (0, 0);
        let common = self.info.common_sort();
        let ordering = common.compare_at(left, &mut l, right, &mut r, common.len(), true)?;
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }

        let source = if self.info.is_multi_source() {
            let lid = read_source_id(left, &mut l)?;
            let rid = read_source_id(right, &mut r)?;
            if lid != rid {
                let order = self.info.source_order().unwrap_or(SortOrder::Asc);
                return Ok(order.apply(lid.cmp(&rid)));
            }
            usize::try_from(lid).map_err(|_| TupleError::UnknownSourceId {
                id: lid,
                sources: self.info.num_sources(),
            })?
        } else {
            0
        };
        let specific = self.info.source(source)?.specific_sort();
        specific.compare_at(left, &mut l, right, &mut r, specific.len(), false)
    }
}

impl tuple_spill_sort::RecordComparator for SortComparator {
    fn compare_records(&self, left: &[u8], right: &[u8]) -> tuple_spill_sort::Result<Ordering> {
        self.compare(left, right)
            .map_err(|e| SpillSortError::compare(e.to_string()))
    }
}

/// Sort order truncated to the group-by prefix of the common fields.
#[derive(Clone)]
pub struct GroupComparator {
    info: Arc<SerializationInfo>,
}

impl GroupComparator {
    pub fn new(info: Arc<SerializationInfo>) -> Self {
        Self { info }
    }

    pub fn compare(&self, left: &[u8], right: &[u8]) -> Result<Ordering> {
        let (mut l, mut r) = (0, 0);
        let k = self.info.group_schema().len();
        self.info
            .common_sort()
            .compare_at(left, &mut l, right, &mut r, k, false)
    }
}
