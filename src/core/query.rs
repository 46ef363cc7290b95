//! Query descriptions: raw caller input, normalized filters, sort and pagination

use crate::core::error::InvalidQueryError;
use crate::core::field::{FieldType, FieldValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Raw query parameters as received from the caller
///
/// Field names follow the JSON:API query conventions. Every parameter is
/// optional; nothing is validated until the normalizer runs.
///
/// # Example
/// ```text
/// GET /books?page[number]=2&page[size]=10
/// GET /books?filter={"status":"active","pages":{"$gte":100}}&sort=-created_at,title
/// GET /books?include=author,author.publisher
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawQuery {
    /// Page number (starts at 1); string or number
    #[serde(rename = "page[number]", default)]
    pub page_number: Option<Value>,

    /// Items per page; string or number
    #[serde(rename = "page[size]", default)]
    pub page_size: Option<Value>,

    /// Filters as a JSON object, or a string containing one
    ///
    /// # Format
    /// - Equality: `{"field": "value"}`
    /// - Operators: `{"field": {"$gt": 10, "$lte": 20}}`
    ///   (`$eq`, `$ne`, `$in`, `$gt`, `$lt`, `$gte`, `$lte`, `$contains`/`$like`)
    #[serde(default)]
    pub filter: Option<Value>,

    /// Comma-separated sort keys, `-` prefix for descending
    #[serde(default)]
    pub sort: Option<String>,

    /// Comma-separated relationship paths to include
    #[serde(default)]
    pub include: Option<String>,
}

impl RawQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, number: u64, size: u64) -> Self {
        self.page_number = Some(Value::from(number));
        self.page_size = Some(Value::from(size));
        self
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort(mut self, sort: &str) -> Self {
        self.sort = Some(sort.to_string());
        self
    }

    pub fn include(mut self, include: &str) -> Self {
        self.include = Some(include.to_string());
        self
    }
}

/// A single filter operator with its operand
///
/// Conditions on the same field are combined with AND.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum FilterOp {
    Eq(FieldValue),
    Ne(FieldValue),
    In(Vec<FieldValue>),
    Gt(FieldValue),
    Lt(FieldValue),
    Gte(FieldValue),
    Lte(FieldValue),
    Contains(String),
}

impl FilterOp {
    /// Parse an operator key and its JSON operand
    pub fn from_operator(operator: &str, operand: &Value) -> Result<Self, InvalidQueryError> {
        let scalar = || {
            FieldValue::from_json(operand).ok_or_else(|| InvalidQueryError::InvalidOperand {
                operator: operator.to_string(),
                message: "expected a scalar value".to_string(),
            })
        };

        match operator {
            "$eq" => Ok(FilterOp::Eq(scalar()?)),
            "$ne" => Ok(FilterOp::Ne(scalar()?)),
            "$gt" => Ok(FilterOp::Gt(scalar()?)),
            "$lt" => Ok(FilterOp::Lt(scalar()?)),
            "$gte" => Ok(FilterOp::Gte(scalar()?)),
            "$lte" => Ok(FilterOp::Lte(scalar()?)),
            "$in" => {
                let items = operand
                    .as_array()
                    .ok_or_else(|| InvalidQueryError::InvalidOperand {
                        operator: operator.to_string(),
                        message: "expected an array".to_string(),
                    })?;
                let values = items
                    .iter()
                    .map(|v| {
                        FieldValue::from_json(v).ok_or_else(|| InvalidQueryError::InvalidOperand {
                            operator: operator.to_string(),
                            message: "array items must be scalar".to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FilterOp::In(values))
            }
            "$contains" | "$like" => match operand {
                Value::String(s) => Ok(FilterOp::Contains(s.clone())),
                _ => Err(InvalidQueryError::InvalidOperand {
                    operator: operator.to_string(),
                    message: "expected a string".to_string(),
                }),
            },
            other => Err(InvalidQueryError::UnknownOperator {
                operator: other.to_string(),
            }),
        }
    }

    /// Coerce the operands to a declared column type. `Contains` is textual
    /// and left as is.
    pub fn coerce_to(self, ty: FieldType) -> Result<FilterOp, InvalidQueryError> {
        let operator = format!("${}", self.name());
        let convert = |value: FieldValue| {
            value
                .coerce_to(ty)
                .ok_or_else(|| InvalidQueryError::InvalidOperand {
                    operator: operator.clone(),
                    message: format!("'{}' is not a valid {} value", value.as_key(), ty.name()),
                })
        };

        Ok(match self {
            FilterOp::Eq(value) => FilterOp::Eq(convert(value)?),
            FilterOp::Ne(value) => FilterOp::Ne(convert(value)?),
            FilterOp::Gt(value) => FilterOp::Gt(convert(value)?),
            FilterOp::Lt(value) => FilterOp::Lt(convert(value)?),
            FilterOp::Gte(value) => FilterOp::Gte(convert(value)?),
            FilterOp::Lte(value) => FilterOp::Lte(convert(value)?),
            FilterOp::In(values) => {
                FilterOp::In(values.into_iter().map(&convert).collect::<Result<_, _>>()?)
            }
            FilterOp::Contains(needle) => FilterOp::Contains(needle),
        })
    }

    /// Operator name for logs and audit records
    pub fn name(&self) -> &'static str {
        match self {
            FilterOp::Eq(_) => "eq",
            FilterOp::Ne(_) => "ne",
            FilterOp::In(_) => "in",
            FilterOp::Gt(_) => "gt",
            FilterOp::Lt(_) => "lt",
            FilterOp::Gte(_) => "gte",
            FilterOp::Lte(_) => "lte",
            FilterOp::Contains(_) => "contains",
        }
    }

    /// Evaluate the condition against a column value
    ///
    /// Follows SQL semantics: a NULL column only matches `Eq(Null)`.
    pub fn matches(&self, value: &FieldValue) -> bool {
        match self {
            FilterOp::Eq(FieldValue::Null) => value.is_null(),
            FilterOp::Ne(FieldValue::Null) => !value.is_null(),
            FilterOp::Eq(expected) => value.loosely_equals(expected),
            FilterOp::Ne(expected) => !value.is_null() && !value.loosely_equals(expected),
            FilterOp::In(set) => set.iter().any(|candidate| value.loosely_equals(candidate)),
            FilterOp::Gt(bound) => value.compare(bound) == Some(Ordering::Greater),
            FilterOp::Lt(bound) => value.compare(bound) == Some(Ordering::Less),
            FilterOp::Gte(bound) => matches!(
                value.compare(bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lte(bound) => {
                matches!(value.compare(bound), Some(Ordering::Less | Ordering::Equal))
            }
            FilterOp::Contains(needle) => value.contains_text(needle),
        }
    }
}

/// Field → conditions, combined with AND both within and across fields
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterMap(IndexMap<String, Vec<FilterOp>>);

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition on a field. Existing conditions are kept.
    pub fn and(&mut self, field: &str, op: FilterOp) {
        let conditions = self.0.entry(field.to_string()).or_default();
        if !conditions.contains(&op) {
            conditions.push(op);
        }
    }

    /// Builder-style variant of [`FilterMap::and`]
    pub fn with(mut self, field: &str, op: FilterOp) -> Self {
        self.and(field, op);
        self
    }

    pub fn conditions(&self, field: &str) -> &[FilterOp] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<FilterOp>)> {
        self.0.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Total number of conditions
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A sort key: field plus direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Desc,
        }
    }

    /// Parse `field` or `-field`
    pub fn parse(expr: &str) -> Self {
        match expr.strip_prefix('-') {
            Some(field) => Self::desc(field),
            None => Self::asc(expr.strip_prefix('+').unwrap_or(expr)),
        }
    }
}

/// Pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    /// Page number, starting at 1
    pub number: u64,
    /// Items per page, always > 0
    pub size: u64,
}

impl Page {
    pub fn new(number: u64, size: u64) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.number - 1).saturating_mul(self.size)
    }

    pub fn limit(&self) -> u64 {
        self.size
    }
}

/// A validated, normalized query against one entity type
///
/// Each pipeline stage derives a new value; nothing mutates a description
/// it was handed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDescription {
    pub filter: FilterMap,
    pub sort: Vec<SortKey>,
    pub page: Page,
    /// Dotted relationship paths (e.g. `author.publisher`)
    pub include: Vec<String>,
}

impl QueryDescription {
    pub fn new(page: Page) -> Self {
        Self {
            filter: FilterMap::new(),
            sort: Vec::new(),
            page,
            include: Vec::new(),
        }
    }
}

/// Pagination metadata of a resource document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page_number: u64,
    pub page_size: u64,
    /// Count of matching items, independent of the window
    pub total_items: u64,
}

impl PageMeta {
    pub fn new(page: Page, total_items: u64) -> Self {
        Self {
            page_number: page.number,
            page_size: page.size,
            total_items,
        }
    }

    /// Total number of pages
    pub fn total_pages(&self) -> u64 {
        if self.total_items == 0 {
            0
        } else {
            self.total_items.div_ceil(self.page_size.max(1))
        }
    }
}
