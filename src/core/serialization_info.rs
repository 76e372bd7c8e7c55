//! Reconciles the source schemas of a job into the shared layout used by the
//! intermediate codec, the comparators and the partitioner.
//!
//! Every intermediate record is `common record` + `source id` (only with more
//! than one source) + `specific record`. The common schema holds the sort
//! fields shared by all sources, in criteria order; its first K fields are the
//! group-by fields. The specific schema of a source holds its own sort fields
//! followed by the rest of its fields in declaration order.

use crate::{
    constants::{RESERVED_FIELD_PREFIX, SOURCE_ORDER_FIELD},
    core::{
        comparator::RecordComparator,
        config::{Aliases, TupleMrConfig},
        criteria::{Criteria, SortElement, SortOrder},
        schema::{Field, Schema},
    },
    error::TupleError,
    io::{codec::RecordCodec, registry::Registry},
    utils::util::Result,
};
use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RollupDepths {
    pub min_depth: usize,
    pub max_depth: usize,
}

/// Per-source tables. Translation tables map a position in a derived schema
/// to the field index in the source's native schema.
pub struct SourceInfo {
    id: usize,
    schema: Arc<Schema>,
    specific_schema: Arc<Schema>,
    specific_criteria: Criteria,
    common_translation: Vec<usize>,
    specific_translation: Vec<usize>,
    group_translation: Vec<usize>,
    partition_translation: Vec<usize>,
    specific_codec: Arc<RecordCodec>,
    specific_sort: RecordComparator,
}

impl SourceInfo {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn specific_schema(&self) -> &Arc<Schema> {
        &self.specific_schema
    }

    pub fn specific_criteria(&self) -> &Criteria {
        &self.specific_criteria
    }

    pub fn common_translation(&self) -> &[usize] {
        &self.common_translation
    }

    pub fn specific_translation(&self) -> &[usize] {
        &self.specific_translation
    }

    pub fn group_translation(&self) -> &[usize] {
        &self.group_translation
    }

    pub fn partition_translation(&self) -> &[usize] {
        &self.partition_translation
    }

    pub fn specific_codec(&self) -> &Arc<RecordCodec> {
        &self.specific_codec
    }

    pub fn specific_sort(&self) -> &RecordComparator {
        &self.specific_sort
    }
}

/// Immutable tables derived once per job and shared by every codec,
/// comparator and partitioner instance.
pub struct SerializationInfo {
    registry: Arc<Registry>,
    sources: Vec<SourceInfo>,
    source_ids: HashMap<String, usize>,
    group_schema: Arc<Schema>,
    common_schema: Arc<Schema>,
    common_criteria: Criteria,
    source_order: Option<SortOrder>,
    partition_schema: Arc<Schema>,
    rollup: Option<RollupDepths>,
    common_codec: Arc<RecordCodec>,
    partition_codec: Arc<RecordCodec>,
    common_sort: RecordComparator,
}

/// A source schema seen through its aliases.
struct SourceView<'a> {
    schema: &'a Schema,
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl<'a> SourceView<'a> {
    fn new(schema: &'a Schema, aliases: Option<&Aliases>) -> Result<Self> {
        let mut names: Vec<String> = schema.fields().iter().map(|f| f.name().to_string()).collect();
        for (alias, native) in aliases.into_iter().flatten() {
            let invalid = |reason: String| TupleError::InvalidAlias {
                schema: schema.name().to_string(),
                alias: alias.clone(),
                reason,
            };
            if alias.starts_with(RESERVED_FIELD_PREFIX) {
                return Err(invalid("alias names cannot be reserved names".to_string()));
            }
            let idx = schema
                .index_of(native)
                .ok_or_else(|| invalid(format!("field '{native}' does not exist")))?;
            if alias != native && schema.contains(alias) {
                return Err(invalid(format!("collides with existing field '{alias}'")));
            }
            if names[idx] != *native {
                return Err(invalid(format!(
                    "field '{native}' is already aliased as '{}'",
                    names[idx]
                )));
            }
            names[idx] = alias.clone();
        }
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Ok(Self {
            schema,
            names,
            index,
        })
    }

    fn field(&self, name: &str) -> Option<(usize, &'a Field)> {
        self.index.get(name).map(|i| (*i, self.schema.field(*i)))
    }

    fn require(&self, name: &str) -> Result<(usize, &'a Field)> {
        self.field(name)
            .ok_or_else(|| TupleError::missing_field(self.schema.name(), name))
    }
}

/// Returns the field named `name` in every source, checking type and
/// nullability agree. The returned field carries the shared name.
fn require_consistent(views: &[SourceView<'_>], name: &str) -> Result<Field> {
    let (_, first) = views[0].require(name)?;
    for view in &views[1..] {
        let (_, other) = view.require(name)?;
        if !first.same_shape(other) {
            return Err(TupleError::InconsistentFieldType {
                field: name.to_string(),
                left: first.shape(),
                right: other.shape(),
            });
        }
    }
    Ok(first.renamed(name))
}

fn check_unique(fields: &[String], what: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.as_str()) {
            return Err(TupleError::config(format!("{what} field '{field}' is repeated")));
        }
    }
    Ok(())
}

impl SerializationInfo {
    pub fn compose(config: &TupleMrConfig, registry: Arc<Registry>) -> Result<Self> {
        if config.schemas.is_empty() {
            return Err(TupleError::NoSources);
        }
        let mut source_ids = HashMap::with_capacity(config.schemas.len());
        for (id, schema) in config.schemas.iter().enumerate() {
            if source_ids.insert(schema.name().to_string(), id).is_some() {
                return Err(TupleError::DuplicateSchema {
                    schema: schema.name().to_string(),
                });
            }
        }
        for name in config.aliases.keys().chain(config.specific_order_by.keys()) {
            if !source_ids.contains_key(name) {
                return Err(TupleError::UnknownSchema {
                    schema: name.clone(),
                });
            }
        }
        let views = config
            .schemas
            .iter()
            .map(|s| SourceView::new(s, config.aliases.get(s.name())))
            .collect::<Result<Vec<_>>>()?;
        let multi_source = views.len() > 1;

        if config.group_by.is_empty() {
            return Err(TupleError::config("group-by fields must not be empty"));
        }
        check_unique(&config.group_by, "Group-by")?;
        for field in &config.group_by {
            require_consistent(&views, field)?;
        }

        if let Some(rollup_from) = &config.rollup_from {
            if config.order_by.is_none() {
                return Err(TupleError::RollupWithoutOrder);
            }
            if !config.group_by.contains(rollup_from) {
                return Err(TupleError::RollupFieldNotGrouped {
                    field: rollup_from.clone(),
                });
            }
            if config.partition_fields.is_some() {
                return Err(TupleError::PartitionWithRollup);
            }
        }

        let order = match &config.order_by {
            Some(order) => order.clone(),
            None => Criteria::ascending(&config.group_by)?,
        };
        let mut elements = order.elements().to_vec();
        match order.source_position() {
            None if multi_source => elements.push(SortElement::asc(SOURCE_ORDER_FIELD)),
            Some(position) if !multi_source => {
                elements.remove(position);
            }
            _ => {}
        }
        let (head, source_order, tail) = match elements.iter().position(SortElement::is_source_order) {
            Some(p) => (
                elements[..p].to_vec(),
                Some(elements[p].order),
                elements[p + 1..].to_vec(),
            ),
            None => (elements, None, Vec::new()),
        };

        let common_fields = head
            .iter()
            .map(|e| require_consistent(&views, &e.field))
            .collect::<Result<Vec<_>>>()?;
        for element in &tail {
            require_consistent(&views, &element.field)?;
        }

        let k = config.group_by.len();
        let group_set: HashSet<&str> = config.group_by.iter().map(String::as_str).collect();
        let is_prefix = k <= head.len() && head[..k].iter().all(|e| group_set.contains(e.field.as_str()));
        if !is_prefix {
            return Err(TupleError::GroupByNotPrefix {
                group_by: config.group_by.join(", "),
                order: order.to_string(),
            });
        }

        let common_set: HashSet<&str> = head.iter().map(|e| e.field.as_str()).collect();
        let common_criteria = Criteria::new(head.clone())?;
        let common_schema = Arc::new(Schema::build("common".to_string(), common_fields.clone())?);
        let group_schema = Arc::new(Schema::build("group".to_string(), common_fields[..k].to_vec())?);

        let partition_names: Vec<String> = match (&config.rollup_from, &config.partition_fields) {
            (Some(rollup_from), _) => {
                let end = head
                    .iter()
                    .position(|e| e.field == *rollup_from)
                    .unwrap_or(k - 1);
                head[..=end].iter().map(|e| e.field.clone()).collect()
            }
            (None, Some(custom)) => {
                if custom.is_empty() {
                    return Err(TupleError::config("custom partition fields must not be empty"));
                }
                check_unique(custom, "Partition")?;
                custom.clone()
            }
            (None, None) => head[..k].iter().map(|e| e.field.clone()).collect(),
        };
        let partition_fields = partition_names
            .iter()
            .map(|name| require_consistent(&views, name))
            .collect::<Result<Vec<_>>>()?;
        let partition_schema = Arc::new(Schema::build("partition".to_string(), partition_fields)?);

        let rollup = config.rollup_from.as_ref().map(|_| RollupDepths {
            min_depth: partition_names.len() - 1,
            max_depth: k - 1,
        });

        let common_codec = Arc::new(RecordCodec::new(common_schema.clone(), &registry)?);
        let partition_codec = Arc::new(RecordCodec::new(partition_schema.clone(), &registry)?);
        let common_sort = RecordComparator::new(common_codec.clone(), &common_criteria, &registry)?;

        let mut sources = Vec::with_capacity(views.len());
        for (id, view) in views.iter().enumerate() {
            let name = view.schema.name();
            let declared = config.specific_order_by.get(name);
            let mut specific_elements = tail.clone();
            for element in declared.map(Criteria::elements).unwrap_or_default() {
                if element.is_source_order() {
                    return Err(TupleError::config(format!(
                        "'{}' cannot appear in the specific order of schema '{name}'",
                        element.field
                    )));
                }
                if common_set.contains(element.field.as_str()) {
                    return Err(TupleError::SpecificOrderOnCommonField {
                        schema: name.to_string(),
                        field: element.field.clone(),
                    });
                }
                view.require(&element.field)?;
                specific_elements.push(element.clone());
            }
            let specific_criteria = Criteria::new(specific_elements)?;

            let mut specific_fields = Vec::with_capacity(view.names.len());
            let mut specific_translation = Vec::with_capacity(view.names.len());
            for element in specific_criteria.elements() {
                let (idx, field) = view.require(&element.field)?;
                specific_fields.push(field.renamed(&element.field));
                specific_translation.push(idx);
            }
            for (idx, field_name) in view.names.iter().enumerate() {
                if common_set.contains(field_name.as_str()) || specific_criteria.contains(field_name) {
                    continue;
                }
                specific_fields.push(view.schema.field(idx).renamed(field_name));
                specific_translation.push(idx);
            }
            let specific_schema =
                Arc::new(Schema::build(format!("{name}.specific"), specific_fields)?);
            let specific_codec = Arc::new(RecordCodec::new(specific_schema.clone(), &registry)?);
            let specific_sort =
                RecordComparator::new(specific_codec.clone(), &specific_criteria, &registry)?;

            let common_translation = head
                .iter()
                .map(|e| view.require(&e.field).map(|(idx, _)| idx))
                .collect::<Result<Vec<_>>>()?;
            let group_translation = common_translation[..k].to_vec();
            let partition_translation = partition_names
                .iter()
                .map(|f| view.require(f).map(|(idx, _)| idx))
                .collect::<Result<Vec<_>>>()?;

            log::debug!(
                "Source {id} '{name}': specific schema {{{}}}, specific order [{}]",
                specific_schema.fields_text(),
                specific_criteria
            );
            sources.push(SourceInfo {
                id,
                schema: Arc::new(view.schema.clone()),
                specific_schema,
                specific_criteria,
                common_translation,
                specific_translation,
                group_translation,
                partition_translation,
                specific_codec,
                specific_sort,
            });
        }

        log::debug!(
            "Composed {} source(s): group {{{}}}, common {{{}}}, partition {{{}}}",
            sources.len(),
            group_schema.fields_text(),
            common_schema.fields_text(),
            partition_schema.fields_text()
        );

        Ok(Self {
            registry,
            sources,
            source_ids,
            group_schema,
            common_schema,
            common_criteria,
            source_order,
            partition_schema,
            rollup,
            common_codec,
            partition_codec,
            common_sort,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn is_multi_source(&self) -> bool {
        self.sources.len() > 1
    }

    pub fn sources(&self) -> &[SourceInfo] {
        &self.sources
    }

    pub fn source(&self, id: usize) -> Result<&SourceInfo> {
        self.sources.get(id).ok_or(TupleError::UnknownSourceId {
            id: id as i64,
            sources: self.sources.len(),
        })
    }

    pub fn source_id(&self, schema: &str) -> Result<usize> {
        self.source_ids
            .get(schema)
            .copied()
            .ok_or_else(|| TupleError::UnknownSchema {
                schema: schema.to_string(),
            })
    }

    pub fn group_schema(&self) -> &Arc<Schema> {
        &self.group_schema
    }

    pub fn common_schema(&self) -> &Arc<Schema> {
        &self.common_schema
    }

    pub fn common_criteria(&self) -> &Criteria {
        &self.common_criteria
    }

    /// Direction of the source id comparison; `None` with a single source.
    pub fn source_order(&self) -> Option<SortOrder> {
        self.source_order
    }

    pub fn partition_schema(&self) -> &Arc<Schema> {
        &self.partition_schema
    }

    pub fn rollup(&self) -> Option<RollupDepths> {
        self.rollup
    }

    pub fn common_codec(&self) -> &Arc<RecordCodec> {
        &self.common_codec
    }

    pub fn partition_codec(&self) -> &Arc<RecordCodec> {
        &self.partition_codec
    }

    pub fn common_sort(&self) -> &RecordComparator {
        &self.common_sort
    }
}

impl fmt::Display for SerializationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "group schema:     {{{}}}", self.group_schema.fields_text())?;
        writeln!(f, "common schema:    {{{}}}", self.common_schema.fields_text())?;
        writeln!(f, "common order:     [{}]", self.common_criteria)?;
        if let Some(order) = self.source_order {
            writeln!(f, "source order:     {order}")?;
        }
        writeln!(f, "partition fields: {{{}}}", self.partition_schema.fields_text())?;
        if let Some(depths) = self.rollup {
            writeln!(
                f,
                "rollup depths:    {}..={}",
                depths.min_depth, depths.max_depth
            )?;
        }
        for source in &self.sources {
            writeln!(f, "source {} '{}':", source.id, source.name())?;
            writeln!(
                f,
                "  specific schema:      {{{}}}",
                source.specific_schema.fields_text()
            )?;
            writeln!(f, "  specific order:       [{}]", source.specific_criteria)?;
            writeln!(f, "  common translation:   {:?}", source.common_translation)?;
            writeln!(f, "  specific translation: {:?}", source.specific_translation)?;
            writeln!(f, "  partition translation: {:?}", source.partition_translation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
