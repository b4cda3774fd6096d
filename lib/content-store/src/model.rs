//! Domain types handed to and returned from the engine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::StorageDatetime;

/// One property definition of a content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyType {
    pub id: i64,
    pub alias: String,
    /// Values of this property feed the tag index.
    pub is_tag: bool,
}

impl PropertyType {
    pub fn new(id: i64, alias: impl Into<String>) -> Self {
        Self {
            id,
            alias: alias.into(),
            is_tag: false,
        }
    }

    pub fn tag(id: i64, alias: impl Into<String>) -> Self {
        Self {
            id,
            alias: alias.into(),
            is_tag: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub alias: String,
}

/// Content type as supplied by the schema registry.
///
/// `property_types` is the flattened composition: inherited and composed
/// property types are already included, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    pub id: i64,
    pub alias: String,
    pub property_types: Vec<PropertyType>,
    pub default_template: Option<Template>,
}

impl ContentType {
    pub fn composition_property_types(&self) -> &[PropertyType] {
        &self.property_types
    }

    pub fn has_tag_property(&self) -> bool {
        self.property_types.iter().any(|p| p.is_tag)
    }
}

/// A property value attached to a document version.
///
/// `id` is the stored row id, `0` until the row is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: i64,
    pub property_type_id: i64,
    pub alias: String,
    pub value: serde_json::Value,
}

impl Property {
    pub fn new(property_type: &PropertyType, value: serde_json::Value) -> Self {
        Self {
            id: 0,
            property_type_id: property_type.id,
            alias: property_type.alias.clone(),
            value,
        }
    }
}

/// What the caller wants a persist call to do with the publish lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishIntent {
    Save,
    Publish,
    Unpublish,
}

/// Publish lifecycle state derived from an intent and the persisted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishedState {
    /// Draft edit, no publish-flag change.
    Saving,
    /// Transition to published.
    Publishing,
    /// Transition away from published.
    Unpublishing,
    /// Steady state, already live.
    Published,
    /// Steady state, never or no longer live.
    Unpublished,
}

impl PublishedState {
    /// Explicit transitions this call.
    pub fn is_transition(self) -> bool {
        matches!(self, PublishedState::Publishing | PublishedState::Unpublishing)
    }
}

/// A document: tree position, target version, content type, template and
/// property values.
#[derive(Debug, Clone)]
pub struct Document {
    /// Node id, `0` until created.
    pub id: i64,
    pub key: Uuid,
    pub parent_id: i64,
    pub name: String,
    pub path: String,
    pub level: i32,
    pub sort_order: i32,
    pub trashed: bool,
    pub creator_id: i64,
    pub writer_id: i64,
    pub create_date: StorageDatetime,
    pub update_date: StorageDatetime,
    pub version_id: Uuid,
    pub version_date: StorageDatetime,
    pub content_type: Arc<ContentType>,
    pub template: Option<Template>,
    /// Published flag of the version row this document was read from or written to.
    pub published: bool,
    /// Version currently live for this node, if any.
    pub published_version: Option<Uuid>,
    pub properties: Vec<Property>,
    /// State derived by the last persist, or from the stored flags on read.
    pub published_state: PublishedState,
    /// Set when parent grants were copied onto this node at creation.
    pub permissions_changed: bool,
}

impl Document {
    pub fn new(name: impl Into<String>, parent_id: i64, content_type: Arc<ContentType>) -> Self {
        let now = StorageDatetime::now();
        Self {
            id: 0,
            key: Uuid::new_v4(),
            parent_id,
            name: name.into(),
            path: String::new(),
            level: 0,
            sort_order: 0,
            trashed: false,
            creator_id: 0,
            writer_id: 0,
            create_date: now.clone(),
            update_date: now.clone(),
            version_id: Uuid::new_v4(),
            version_date: now,
            content_type,
            template: None,
            published: false,
            published_version: None,
            properties: Vec::new(),
            published_state: PublishedState::Unpublished,
            permissions_changed: false,
        }
    }

    pub fn content_type_id(&self) -> i64 {
        self.content_type.id
    }

    pub fn has_identity(&self) -> bool {
        self.id != 0
    }

    pub fn has_published_version(&self) -> bool {
        self.published_version.is_some()
    }

    pub fn value(&self, alias: &str) -> Option<&serde_json::Value> {
        self.properties
            .iter()
            .find(|p| p.alias == alias)
            .map(|p| &p.value)
    }

    /// Set a property value by alias. Returns false when the content type has
    /// no property with that alias.
    pub fn set_value(&mut self, alias: &str, value: impl Into<serde_json::Value>) -> bool {
        let value = value.into();
        if let Some(property) = self.properties.iter_mut().find(|p| p.alias == alias) {
            property.value = value;
            return true;
        }
        match self
            .content_type
            .property_types
            .iter()
            .find(|p| p.alias == alias)
        {
            Some(property_type) => {
                self.properties.push(Property::new(property_type, value));
                true
            }
            None => false,
        }
    }

    /// Property values of tagged property types.
    pub fn tagged_properties(&self) -> impl Iterator<Item = &Property> {
        let content_type = &self.content_type;
        self.properties.iter().filter(move |p| {
            content_type
                .property_types
                .iter()
                .any(|t| t.id == p.property_type_id && t.is_tag)
        })
    }
}

/// One (node, user, permission) grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub node_id: i64,
    pub user_id: i64,
    pub permission: char,
}

/// Minimal tuple used to batch-load property sets.
#[derive(Debug, Clone)]
pub struct DocumentDefinition {
    pub node_id: i64,
    pub version_id: Uuid,
    pub version_date: StorageDatetime,
    pub create_date: StorageDatetime,
    pub content_type: Arc<ContentType>,
}

/// One page of a paged query.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_records: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> Arc<ContentType> {
        Arc::new(ContentType {
            id: 10,
            alias: "article".into(),
            property_types: vec![PropertyType::new(1, "title"), PropertyType::tag(2, "tags")],
            default_template: None,
        })
    }

    #[test]
    fn set_value_adds_known_properties_only() {
        let mut doc = Document::new("Home", -1, article());
        assert!(doc.set_value("title", "Hello"));
        assert!(doc.set_value("title", "Hello again"));
        assert!(!doc.set_value("missing", 1));

        assert_eq!(doc.properties.len(), 1);
        assert_eq!(doc.value("title"), Some(&serde_json::json!("Hello again")));
    }

    #[test]
    fn tagged_properties_follow_the_content_type() {
        let mut doc = Document::new("Home", -1, article());
        doc.set_value("title", "x");
        doc.set_value("tags", serde_json::json!(["a", "b"]));

        let tagged: Vec<_> = doc.tagged_properties().map(|p| p.alias.as_str()).collect();
        assert_eq!(tagged, vec!["tags"]);
        assert!(doc.content_type.has_tag_property());
    }
}
