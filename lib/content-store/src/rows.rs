//! Stored row types, one per table.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Storable, StorageDatetime};

/// Tree position of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Storable)]
#[storable(table = "content_node")]
#[serde(rename_all = "camelCase")]
pub struct NodeRow {
    #[identity]
    pub id: i64,
    pub unique_id: Uuid,
    pub parent_id: i64,
    pub level: i32,
    pub path: String,
    pub sort_order: i32,
    pub trashed: bool,
    pub user_id: i64,
    pub text: String,
    pub node_object_type: Uuid,
    pub create_date: StorageDatetime,
}

/// Node to content-type association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Storable)]
#[storable(table = "content_content")]
#[serde(rename_all = "camelCase")]
pub struct ContentRow {
    #[identity]
    pub pk: i64,
    pub node_id: i64,
    pub content_type_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Storable)]
#[storable(table = "content_version")]
#[serde(rename_all = "camelCase")]
pub struct ContentVersionRow {
    #[identity]
    pub id: i64,
    pub node_id: i64,
    pub version_id: Uuid,
    pub version_date: StorageDatetime,
}

/// Per-version document data carrying the newest and published flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Storable)]
#[storable(table = "content_document")]
#[serde(rename_all = "camelCase")]
pub struct DocumentRow {
    pub node_id: i64,
    #[key]
    pub version_id: Uuid,
    pub published: bool,
    pub newest: bool,
    pub document_user: i64,
    pub text: String,
    pub update_date: StorageDatetime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Storable)]
#[storable(table = "content_property_data")]
#[serde(rename_all = "camelCase")]
pub struct PropertyDataRow {
    #[identity]
    pub id: i64,
    pub node_id: i64,
    pub version_id: Uuid,
    pub property_type_id: i64,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Storable)]
#[storable(table = "content_tag_relationship")]
#[serde(rename_all = "camelCase")]
pub struct TagRelationshipRow {
    pub node_id: i64,
    pub tag_id: i64,
    pub property_type_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Storable)]
#[storable(table = "content_node_permission")]
#[serde(rename_all = "camelCase")]
pub struct NodePermissionRow {
    pub node_id: i64,
    pub user_id: i64,
    pub permission: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Storable)]
#[storable(table = "content_redirect_url")]
#[serde(rename_all = "camelCase")]
pub struct RedirectUrlRow {
    #[identity]
    pub id: i64,
    pub content_key: Uuid,
    pub url: String,
    pub create_date: StorageDatetime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Storable)]
#[storable(table = "content_relation")]
#[serde(rename_all = "camelCase")]
pub struct RelationRow {
    #[identity]
    pub id: i64,
    pub parent_id: i64,
    pub child_id: i64,
    pub relation_type: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Storable)]
#[storable(table = "content_domain")]
#[serde(rename_all = "camelCase")]
pub struct DomainRow {
    #[identity]
    pub id: i64,
    pub root_node_id: i64,
    pub name: String,
}

/// Public access entry for a node. Rules hang off `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Storable)]
#[storable(table = "content_access")]
#[serde(rename_all = "camelCase")]
pub struct AccessRow {
    #[key]
    pub id: Uuid,
    pub node_id: i64,
    pub login_node_id: i64,
    pub no_access_node_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Storable)]
#[storable(table = "content_access_rule")]
#[serde(rename_all = "camelCase")]
pub struct AccessRuleRow {
    #[identity]
    pub id: i64,
    pub access_id: Uuid,
    pub rule_value: String,
    pub rule_type: String,
}
