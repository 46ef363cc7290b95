//! Query normalization against an entity schema
//!
//! Structural problems (non-numeric page, unknown operator, malformed sort
//! expression) are reported as [`InvalidQueryError`]. References to fields or
//! relationships the schema does not know are dropped with a warning and
//! never reported, so the error surface does not reveal schema shape.
//!
//! Operands on fields with a declared [`FieldType`](crate::core::field::FieldType)
//! are coerced to it, so every store compares them the same way.

use crate::config::PaginationConfig;
use crate::core::error::InvalidQueryError;
use crate::core::field::FieldValue;
use crate::core::query::{FilterMap, FilterOp, Page, QueryDescription, RawQuery, SortKey};
use crate::core::schema::{EntitySchema, SchemaRegistry};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

fn field_name_regex() -> &'static Regex {
    static FIELD_REGEX: OnceLock<Regex> = OnceLock::new();
    FIELD_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("field name regex is valid")
    })
}

fn sort_expr_regex() -> &'static Regex {
    static SORT_REGEX: OnceLock<Regex> = OnceLock::new();
    SORT_REGEX.get_or_init(|| {
        Regex::new(r"^[-+]?[A-Za-z_][A-Za-z0-9_]*$").expect("sort expression regex is valid")
    })
}

fn include_path_regex() -> &'static Regex {
    static INCLUDE_REGEX: OnceLock<Regex> = OnceLock::new();
    INCLUDE_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
            .expect("include path regex is valid")
    })
}

/// Validates raw caller input and produces a [`QueryDescription`]
#[derive(Clone, Default)]
pub struct QueryNormalizer {
    pagination: PaginationConfig,
    registry: Option<Arc<SchemaRegistry>>,
}

impl QueryNormalizer {
    pub fn new(pagination: PaginationConfig) -> Self {
        Self {
            pagination,
            registry: None,
        }
    }

    /// Registry used to validate nested include paths (`author.publisher`).
    /// Without it only the first segment of a path can be checked and
    /// deeper paths are dropped.
    pub fn with_registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn normalize(
        &self,
        raw: &RawQuery,
        schema: &dyn EntitySchema,
    ) -> Result<QueryDescription, InvalidQueryError> {
        let page = self.parse_page(raw)?;
        let filter = self.parse_filter(raw.filter.as_ref(), schema)?;
        let sort = self.parse_sort(raw.sort.as_deref(), schema)?;
        let include = self.parse_include(raw.include.as_deref(), schema)?;

        Ok(QueryDescription {
            filter,
            sort,
            page,
            include,
        })
    }

    fn parse_page(&self, raw: &RawQuery) -> Result<Page, InvalidQueryError> {
        let number = parse_positive(raw.page_number.as_ref(), "page[number]")?.unwrap_or(1);
        let size = parse_positive(raw.page_size.as_ref(), "page[size]")?
            .unwrap_or(self.pagination.default_size)
            .min(self.pagination.max_size);

        Ok(Page::new(number, size))
    }

    fn parse_filter(
        &self,
        raw: Option<&Value>,
        schema: &dyn EntitySchema,
    ) -> Result<FilterMap, InvalidQueryError> {
        let parsed;
        let object = match raw {
            None | Some(Value::Null) => return Ok(FilterMap::new()),
            Some(Value::String(s)) if s.trim().is_empty() => return Ok(FilterMap::new()),
            Some(Value::String(s)) => {
                parsed = serde_json::from_str::<Value>(s).map_err(|e| {
                    InvalidQueryError::InvalidFilter {
                        message: format!("not valid JSON ({})", e),
                    }
                })?;
                parsed.as_object()
            }
            Some(other) => other.as_object(),
        }
        .ok_or_else(|| InvalidQueryError::InvalidFilter {
            message: "expected a JSON object".to_string(),
        })?;

        let mut filter = FilterMap::new();
        for (field, value) in object {
            if !field_name_regex().is_match(field) {
                return Err(InvalidQueryError::InvalidSyntax {
                    parameter: "filter".to_string(),
                    value: field.clone(),
                });
            }

            // Operands are validated before the field lookup so malformed
            // input fails the same way whether or not the field exists.
            let conditions = parse_conditions(value)?;

            if !schema.field_exists(field) {
                tracing::warn!(
                    entity = schema.entity_type(),
                    field = %field,
                    "schema mismatch: dropping filter on unknown field"
                );
                continue;
            }

            let field_type = schema.field_type(field);
            for op in conditions {
                let op = match field_type {
                    Some(ty) => op.coerce_to(ty)?,
                    None => op,
                };
                filter.and(field, op);
            }
        }

        Ok(filter)
    }

    fn parse_sort(
        &self,
        raw: Option<&str>,
        schema: &dyn EntitySchema,
    ) -> Result<Vec<SortKey>, InvalidQueryError> {
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        let mut sort = Vec::new();
        for expr in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if !sort_expr_regex().is_match(expr) {
                return Err(InvalidQueryError::InvalidSyntax {
                    parameter: "sort".to_string(),
                    value: expr.to_string(),
                });
            }

            let key = SortKey::parse(expr);
            if !seen.insert(key.field.clone()) {
                return Err(InvalidQueryError::InvalidSyntax {
                    parameter: "sort".to_string(),
                    value: raw.to_string(),
                });
            }

            if !schema.field_exists(&key.field) {
                tracing::warn!(
                    entity = schema.entity_type(),
                    field = %key.field,
                    "schema mismatch: dropping sort on unknown field"
                );
                continue;
            }
            sort.push(key);
        }

        Ok(sort)
    }

    fn parse_include(
        &self,
        raw: Option<&str>,
        schema: &dyn EntitySchema,
    ) -> Result<Vec<String>, InvalidQueryError> {
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };

        let mut include: Vec<String> = Vec::new();
        for path in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if !include_path_regex().is_match(path) {
                return Err(InvalidQueryError::InvalidSyntax {
                    parameter: "include".to_string(),
                    value: path.to_string(),
                });
            }

            if !self.include_path_exists(path, schema) {
                tracing::warn!(
                    entity = schema.entity_type(),
                    include = %path,
                    "schema mismatch: dropping unknown include path"
                );
                continue;
            }

            if !include.iter().any(|p| p == path) {
                include.push(path.to_string());
            }
        }

        Ok(include)
    }

    fn include_path_exists(&self, path: &str, schema: &dyn EntitySchema) -> bool {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return false;
        };
        let Some(mut rel) = schema.relationship(first).cloned() else {
            return false;
        };

        for segment in segments {
            let Some(registry) = &self.registry else {
                return false;
            };
            let Some(target) = registry.get(&rel.target) else {
                return false;
            };
            match target.relationship(segment) {
                Some(next) => rel = next.clone(),
                None => return false,
            }
        }

        true
    }
}

/// Parse one filter entry's value into its conditions
fn parse_conditions(value: &Value) -> Result<Vec<FilterOp>, InvalidQueryError> {
    match value {
        Value::Object(ops) => ops
            .iter()
            .map(|(operator, operand)| FilterOp::from_operator(operator, operand))
            .collect(),
        Value::Array(_) => Ok(vec![FilterOp::from_operator("$in", value)?]),
        scalar => {
            let literal = FieldValue::from_json(scalar).unwrap_or(FieldValue::Null);
            Ok(vec![FilterOp::Eq(literal)])
        }
    }
}

fn parse_positive(value: Option<&Value>, parameter: &str) -> Result<Option<u64>, InvalidQueryError> {
    let invalid = |v: &Value| InvalidQueryError::InvalidPage {
        parameter: parameter.to_string(),
        value: match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    };

    let Some(value) = value else {
        return Ok(None);
    };

    let parsed = match value {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| invalid(value))?,
        Value::Number(n) => n.as_u64().ok_or_else(|| invalid(value))?,
        other => return Err(invalid(other)),
    };

    if parsed == 0 {
        return Err(invalid(value));
    }
    Ok(Some(parsed))
}
