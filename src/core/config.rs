use crate::{
    core::{criteria::Criteria, schema::Schema, serialization_info::SerializationInfo},
    error::TupleError,
    io::registry::Registry,
    utils::util::Result,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path, sync::Arc};

/// Shared field name -> native field name, per schema.
pub type Aliases = BTreeMap<String, String>;

/// Description of a multi-source sort/group job. Persisted as JSON with
/// schemas and criteria in their text forms.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TupleMrConfig {
    pub schemas: Vec<Schema>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, Aliases>,
    pub group_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Criteria>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub specific_order_by: BTreeMap<String, Criteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollup_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_fields: Option<Vec<String>>,
}

impl TupleMrConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_schema(&mut self, schema: Schema) -> Result<&mut Self> {
        if self.schemas.iter().any(|s| s.name() == schema.name()) {
            return Err(TupleError::DuplicateSchema {
                schema: schema.name().to_string(),
            });
        }
        self.schemas.push(schema);
        Ok(self)
    }

    pub fn set_field_aliases(&mut self, schema: &str, aliases: &[(&str, &str)]) -> &mut Self {
        self.aliases.insert(
            schema.to_string(),
            aliases
                .iter()
                .map(|(alias, native)| ((*alias).to_string(), (*native).to_string()))
                .collect(),
        );
        self
    }

    pub fn set_group_by<S: AsRef<str>>(&mut self, fields: &[S]) -> &mut Self {
        self.group_by = fields.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    pub fn set_order_by(&mut self, criteria: Criteria) -> &mut Self {
        self.order_by = Some(criteria);
        self
    }

    pub fn set_specific_order_by(&mut self, schema: &str, criteria: Criteria) -> &mut Self {
        self.specific_order_by.insert(schema.to_string(), criteria);
        self
    }

    pub fn set_rollup_from(&mut self, field: &str) -> &mut Self {
        self.rollup_from = Some(field.to_string());
        self
    }

    pub fn set_partition_fields<S: AsRef<str>>(&mut self, fields: &[S]) -> &mut Self {
        self.partition_fields = Some(fields.iter().map(|f| f.as_ref().to_string()).collect());
        self
    }

    /// Validates the configuration and derives the shared serialization tables.
    pub fn build(&self, registry: Arc<Registry>) -> Result<Arc<SerializationInfo>> {
        SerializationInfo::compose(self, registry).map(Arc::new)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            crate::tuple_error!("Failed to read job configuration {}: {e}", path.display())
        })?;
        Self::from_json(&text)
    }
}
