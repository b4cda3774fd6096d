//! In-process backend for content-store.
//!
//! Rows live in memory as JSON objects keyed by column name. Queries support
//! the full builder surface (joins, filters, ordering, paging, aggregates),
//! which makes this backend a drop-in store for tests and single-process
//! tools.
//!
//! # Usage
//!
//! ```text
//! use content_store::{QueryExecutor, TransactionExecutor};
//! use content_store_memory::MemoryPool;
//!
//! let pool = MemoryPool::new();
//! let mut tx = pool.begin_transaction().await?;
//! repository.persist_new(&mut tx, &mut document, PublishIntent::Save).await?;
//! tx.commit().await?;
//! ```

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

mod executor;
mod table;

pub use executor::{MemoryPool, MemoryTransaction};
