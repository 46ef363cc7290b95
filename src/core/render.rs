//! Resource document rendering
//!
//! Turns executor rows into `{ data, included, meta }`. Pure: everything it
//! needs has already been loaded by the executor.

use crate::core::executor::{Related, Row};
use crate::core::query::{PageMeta, QueryDescription};
use crate::core::schema::{EntitySchema, SchemaRegistry};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// `(type, id)` pair identifying a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Linkage {
    One(Option<ResourceIdentifier>),
    Many(Vec<ResourceIdentifier>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipData {
    pub data: Linkage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    pub attributes: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, RelationshipData>,
}

impl Resource {
    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier {
            resource_type: self.resource_type.clone(),
            id: self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrimaryData {
    One(Box<Resource>),
    Many(Vec<Resource>),
}

/// The response envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceDocument {
    pub data: PrimaryData,
    pub included: Vec<Resource>,
    pub meta: PageMeta,
}

impl ResourceDocument {
    /// Primary resources, whether one or many
    pub fn resources(&self) -> &[Resource] {
        match &self.data {
            PrimaryData::One(resource) => std::slice::from_ref(resource.as_ref()),
            PrimaryData::Many(resources) => resources,
        }
    }
}

#[derive(Clone)]
pub struct ResourceRenderer {
    registry: Arc<SchemaRegistry>,
}

impl ResourceRenderer {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// Render a page of rows
    pub fn render_many(
        &self,
        rows: &[Row],
        total: u64,
        query: &QueryDescription,
        schema: &dyn EntitySchema,
    ) -> ResourceDocument {
        let mut included = IndexMap::new();
        let data: Vec<Resource> = rows
            .iter()
            .map(|row| self.resource(row, schema, &mut included))
            .collect();

        ResourceDocument {
            included: Self::finish_included(included, &data),
            data: PrimaryData::Many(data),
            meta: PageMeta::new(query.page, total),
        }
    }

    /// Render a single row as primary data
    pub fn render_one(
        &self,
        row: &Row,
        query: &QueryDescription,
        schema: &dyn EntitySchema,
    ) -> ResourceDocument {
        let mut included = IndexMap::new();
        let resource = self.resource(row, schema, &mut included);
        let included = Self::finish_included(included, std::slice::from_ref(&resource));

        ResourceDocument {
            data: PrimaryData::One(Box::new(resource)),
            included,
            meta: PageMeta::new(query.page, 1),
        }
    }

    fn finish_included(
        included: IndexMap<ResourceIdentifier, Resource>,
        primary: &[Resource],
    ) -> Vec<Resource> {
        included
            .into_iter()
            .filter(|(key, _)| !primary.iter().any(|p| p.identifier() == *key))
            .map(|(_, resource)| resource)
            .collect()
    }

    fn resource(
        &self,
        row: &Row,
        schema: &dyn EntitySchema,
        included: &mut IndexMap<ResourceIdentifier, Resource>,
    ) -> Resource {
        let pk = schema.primary_key_field();
        let attributes = row
            .fields
            .iter()
            .filter(|(name, _)| name.as_str() != pk)
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();

        let mut relationships = IndexMap::new();
        for (name, related) in &row.relations {
            let Some(target) = schema
                .relationship(name)
                .and_then(|rel| self.registry.get(&rel.target))
            else {
                continue;
            };

            let mut link = |row: &Row| {
                let resource = self.resource(row, target.as_ref(), included);
                let identifier = resource.identifier();
                included.entry(identifier.clone()).or_insert(resource);
                identifier
            };

            let data = match related {
                Related::One(row) => Linkage::One(row.as_deref().map(&mut link)),
                Related::Many(rows) => Linkage::Many(rows.iter().map(&mut link).collect()),
            };
            relationships.insert(name.clone(), RelationshipData { data });
        }

        Resource {
            resource_type: schema.entity_type().to_string(),
            id: row.get(pk).as_key(),
            attributes,
            relationships,
        }
    }
}
