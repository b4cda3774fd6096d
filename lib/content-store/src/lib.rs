//! Content Store - versioned document persistence over a relational store.
//!
//! This crate keeps a tree of documents, each with a version history and a
//! publish lifecycle, and maps them onto a handful of tables through a
//! backend-agnostic query layer.
//!
//! # Core Concepts
//!
//! - **Node**: tree position of a document (parent, materialized path, level,
//!   sort order).
//! - **Version**: one snapshot of a document's content. Exactly one version per
//!   node is *newest* (the working copy) and at most one is *published*.
//! - **Publish intent**: what a persist call asks for (save, publish,
//!   unpublish). The engine derives a [`PublishedState`] from the intent and
//!   the stored flags and decides from it whether a new version is cut.
//!
//! # Traits
//!
//! - [`Storable`]: row types that map onto one table
//! - [`QueryExecutor`] / [`TransactionExecutor`]: backend seams
//! - [`ContentTypeService`], [`TemplateService`], [`TagService`],
//!   [`PermissionService`], [`ReadCache`]: collaborators injected into
//!   [`ContentRepository`]

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

// Lets the derive's `content_store::` paths resolve inside this crate too.
extern crate self as content_store;

mod config;
mod engine;
mod error;
mod model;
mod query;
mod repository;
pub mod rows;
mod services;
mod storable;
mod time;

pub use config::{DOCUMENT_OBJECT_TYPE, EngineConfig, RECYCLE_BIN_ID, ROOT_ID};
pub use engine::{
    ContentQuery, ContentRepository, ContentRepositoryBuilder, PageRequest,
    compare_similar_names, order_by_column, resolve_unique_name, sanitize_text,
};
pub use error::{ContentError, StorageError};
pub use model::{
    ContentType, Document, DocumentDefinition, Page, PermissionGrant, Property, PropertyType,
    PublishIntent, PublishedState, Template,
};
pub use query::{
    Aggregate, Delete, Filter, Join, Order, Query, QueryExecutor, TransactionExecutor, Value,
};
pub use repository::{ConnectionConfig, RepositoryConnection};
pub use services::{ContentTypeService, PermissionService, ReadCache, TagService, TemplateService};
pub use storable::Storable;
pub use time::StorageDatetime;

// Re-export derive macro
pub use content_store_derive::Storable;
