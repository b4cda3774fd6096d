//! PostgreSQL implementation for content-store.
//!
//! This crate provides the PostgreSQL executor for the content-store query
//! layer. It uses serde serialization for binding values, so row types only
//! need `#[derive(Storable)]`.
//!
//! # Usage
//!
//! ```text
//! use content_store::{QueryExecutor, RepositoryConnection, TransactionExecutor};
//! use content_store_postgres::PgPool;
//!
//! let pool = PgPool::connect(&database_url).await?;
//! pool.initialize().await?; // runs the bundled migrations
//!
//! let mut tx = pool.begin_transaction().await?;
//! tx.acquire_advisory_lock(&format!("content:{}", document.id)).await?;
//! repository.persist_updated(&mut tx, &mut document, PublishIntent::Publish).await?;
//! tx.commit().await?;
//! ```

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

mod executor;
mod serde_bind;

pub use executor::{PgPool, PgTransaction};
pub use serde_bind::deserialize_row;

// Re-export sqlx migration types
pub use sqlx::migrate;
pub use sqlx::migrate::Migrator;
