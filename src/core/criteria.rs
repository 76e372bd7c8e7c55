use crate::{constants::SOURCE_ORDER_FIELD, error::TupleError, utils::util::Result};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::HashSet, fmt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    #[inline]
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortElement {
    pub field: String,
    pub order: SortOrder,
    /// Name of a registered raw comparator.
    pub comparator: Option<String>,
}

impl SortElement {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
            comparator: None,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortOrder::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortOrder::Desc)
    }

    pub fn using(mut self, comparator: impl Into<String>) -> Self {
        self.comparator = Some(comparator.into());
        self
    }

    pub fn is_source_order(&self) -> bool {
        self.field == SOURCE_ORDER_FIELD
    }
}

impl fmt::Display for SortElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.order)?;
        if let Some(comparator) = &self.comparator {
            write!(f, " using {comparator}")?;
        }
        Ok(())
    }
}

/// Ordered sort elements, no field repeated.
///
/// Text form: `field [asc|desc] [using <comparator>]`, comma separated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Criteria {
    elements: Vec<SortElement>,
}

impl Criteria {
    pub fn new(elements: Vec<SortElement>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(elements.len());
        for element in &elements {
            if !seen.insert(element.field.as_str()) {
                return Err(TupleError::RepeatedCriteriaField {
                    field: element.field.clone(),
                });
            }
        }
        Ok(Self { elements })
    }

    /// All fields ascending, in the given order.
    pub fn ascending<S: AsRef<str>>(fields: &[S]) -> Result<Self> {
        Self::new(
            fields
                .iter()
                .map(|f| SortElement::asc(f.as_ref()))
                .collect(),
        )
    }

    pub fn parse(text: &str) -> Result<Self> {
        let syntax = |reason: String| TupleError::CriteriaSyntax {
            text: text.to_string(),
            reason,
        };
        let mut elements = Vec::new();
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        for part in text.split(',') {
            let tokens: Vec<&str> = part.split_whitespace().collect();
            let element = match tokens.as_slice() {
                [field] => SortElement::asc(*field),
                [field, order] => SortElement::new(*field, parse_order(order).map_err(syntax)?),
                [field, "using", comparator] => SortElement::asc(*field).using(*comparator),
                [field, order, "using", comparator] => {
                    SortElement::new(*field, parse_order(order).map_err(syntax)?)
                        .using(*comparator)
                }
                [] => return Err(syntax("empty element".to_string())),
                _ => return Err(syntax(format!("cannot parse element '{}'", part.trim()))),
            };
            elements.push(element);
        }
        Self::new(elements)
    }

    pub fn elements(&self) -> &[SortElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn position_of(&self, field: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.field == field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.position_of(field).is_some()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().map(|e| e.field.as_str())
    }

    pub fn source_position(&self) -> Option<usize> {
        self.position_of(SOURCE_ORDER_FIELD)
    }
}

fn parse_order(token: &str) -> std::result::Result<SortOrder, String> {
    match token.to_ascii_lowercase().as_str() {
        "asc" => Ok(SortOrder::Asc),
        "desc" => Ok(SortOrder::Desc),
        other => Err(format!("unknown sort order '{other}'")),
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Criteria {
    type Error = TupleError;

    fn try_from(text: String) -> Result<Self> {
        Criteria::parse(&text)
    }
}

impl From<Criteria> for String {
    fn from(criteria: Criteria) -> Self {
        criteria.to_string()
    }
}
