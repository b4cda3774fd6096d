//! Property rows for a document version.

use std::collections::HashMap;

use uuid::Uuid;

use crate::model::{Document, DocumentDefinition, Property, PropertyType};
use crate::rows::PropertyDataRow;
use crate::{ContentError, ContentRepository, Query, TransactionExecutor};

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

/// Strip characters that cannot appear in an XML 1.0 document.
pub fn sanitize_text(text: &str) -> String {
    text.chars().filter(|c| is_xml_char(*c)).collect()
}

fn sanitize_value(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            if !s.chars().all(is_xml_char) {
                *s = sanitize_text(s);
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(sanitize_value),
        serde_json::Value::Object(map) => map.values_mut().for_each(sanitize_value),
        _ => {}
    }
}

/// Clean the name and string property values in place.
pub(crate) fn sanitize_document(document: &mut Document) {
    if !document.name.chars().all(is_xml_char) {
        document.name = sanitize_text(&document.name);
    }
    for property in &mut document.properties {
        sanitize_value(&mut property.value);
    }
}

/// One property per property type of the composition, in composition order.
/// Types the document has no value for get a null value.
pub(crate) fn align_properties(document: &mut Document) {
    let mut existing: HashMap<i64, Property> = document
        .properties
        .drain(..)
        .map(|p| (p.property_type_id, p))
        .collect();

    document.properties = document
        .content_type
        .composition_property_types()
        .iter()
        .map(|property_type| {
            existing
                .remove(&property_type.id)
                .unwrap_or_else(|| Property::new(property_type, serde_json::Value::Null))
        })
        .collect();
}

fn property_row(document: &Document, property: &Property) -> PropertyDataRow {
    PropertyDataRow {
        id: property.id,
        node_id: document.id,
        version_id: document.version_id,
        property_type_id: property.property_type_id,
        value: property.value.clone(),
    }
}

fn to_property(property_type: &PropertyType, row: Option<&PropertyDataRow>) -> Property {
    let mut property = Property::new(property_type, serde_json::Value::Null);
    if let Some(row) = row {
        property.id = row.id;
        property.value = row.value.clone();
    }
    property
}

impl ContentRepository {
    /// Write one row per property of the document's version.
    ///
    /// With `new_version` every row is inserted fresh; otherwise rows already
    /// carrying an id are updated in place and the rest inserted.
    pub(crate) async fn persist_properties<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        document: &mut Document,
        new_version: bool,
    ) -> Result<(), ContentError> {
        align_properties(document);

        for index in 0..document.properties.len() {
            let mut row = property_row(document, &document.properties[index]);
            if new_version || row.id <= 0 {
                row.id = 0;
                let id = tx.insert_returning_id(&row).await?;
                document.properties[index].id = id;
            } else {
                tx.update(&row).await?;
            }
        }

        tracing::trace!(
            node_id = document.id,
            version_id = %document.version_id,
            count = document.properties.len(),
            "persisted properties"
        );
        Ok(())
    }

    /// Property collections for many versions in one query, keyed by version id.
    pub(crate) async fn load_property_collections<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        definitions: &[DocumentDefinition],
    ) -> Result<HashMap<Uuid, Vec<Property>>, ContentError> {
        if definitions.is_empty() {
            return Ok(HashMap::new());
        }

        let version_ids: Vec<Uuid> = definitions.iter().map(|d| d.version_id).collect();
        let rows = tx
            .fetch(Query::<PropertyDataRow>::new().r#in("version_id", version_ids))
            .await?;

        let mut by_version: HashMap<Uuid, HashMap<i64, PropertyDataRow>> = HashMap::new();
        for row in rows {
            by_version
                .entry(row.version_id)
                .or_default()
                .insert(row.property_type_id, row);
        }

        let mut collections = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            let stored = by_version.get(&definition.version_id);
            let properties = definition
                .content_type
                .composition_property_types()
                .iter()
                .map(|property_type| {
                    to_property(property_type, stored.and_then(|rows| rows.get(&property_type.id)))
                })
                .collect();
            collections.insert(definition.version_id, properties);
        }
        Ok(collections)
    }
}
