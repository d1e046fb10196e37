//! PostgreSQL implementation of the anchor graph document store.
//!
//! Each collection is a `(id TEXT PRIMARY KEY, doc JSONB)` table created by
//! the migrations in `src/postgres/migrations`.
//!
//! ## Key Features
//!
//! - Connection pooling with `sqlx::PgPool`
//! - Multi-document transactions with rollback on drop
//! - Bulk upserts with `QueryBuilder` and `ON CONFLICT DO UPDATE`
//! - Filters translated to JSONB path predicates
mod document_store;
mod filter;

pub use document_store::{PostgresStore, PostgresTransaction};
