use anchor_graph_shared::{AnchorKind, ObjectId};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};

use super::filter::push_filter;
use crate::errors::StoreError;
use crate::interfaces::{DocumentStore, StoreTransaction};
use crate::query::{Filter, WriteOp};

/// PostgreSQL document store.
///
/// Every collection is a JSONB table named after [`AnchorKind::collection`].
/// Table names come from that closed enum and are never user supplied.
#[derive(Clone)]
pub struct PostgresStore {
    pool: sqlx::PgPool,
}

impl PostgresStore {
    /// Wraps an existing pool whose schema is already migrated.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool.
    ///
    /// # Arguments
    ///
    /// * `database_url` - Postgres connection string
    /// * `max_connections` - Pool size
    ///
    /// # Returns
    ///
    /// * `Ok(PostgresStore)` - Connected store (schema not yet migrated)
    /// * `Err(StoreError)` - Connection failure
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Applies the bundled migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("src/postgres/migrations")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

fn table(kind: AnchorKind) -> String {
    format!("\"{}\"", kind.collection())
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn find_by_id(
        &self,
        kind: AnchorKind,
        id: &ObjectId,
    ) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query(&format!("SELECT doc FROM {} WHERE id = $1", table(kind)))
            .bind(id.to_hex())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.try_get::<Value, _>("doc")).transpose()?)
    }

    #[instrument(skip(self, filter), fields(collection = kind.collection()))]
    async fn find(&self, kind: AnchorKind, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT doc FROM {} WHERE ", table(kind)));
        push_filter(&mut builder, filter);

        let rows = builder.build().fetch_all(&self.pool).await?;
        debug!(rows = rows.len(), "Loaded documents");

        rows.iter()
            .map(|row| row.try_get::<Value, _>("doc").map_err(StoreError::from))
            .collect()
    }

    async fn insert_one(
        &self,
        kind: AnchorKind,
        id: &ObjectId,
        document: Value,
    ) -> Result<(), StoreError> {
        sqlx::query(&format!("INSERT INTO {} (id, doc) VALUES ($1, $2)", table(kind)))
            .bind(id.to_hex())
            .bind(document)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn replace_if(
        &self,
        kind: AnchorKind,
        id: &ObjectId,
        expected: &Filter,
        document: Value,
    ) -> Result<bool, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET doc = ", table(kind)));
        builder
            .push_bind(document)
            .push(" WHERE id = ")
            .push_bind(id.to_hex())
            .push(" AND ");
        push_filter(&mut builder, expected);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_if(
        &self,
        kind: AnchorKind,
        id: &ObjectId,
        expected: &Filter,
    ) -> Result<bool, StoreError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("DELETE FROM {} WHERE id = ", table(kind)));
        builder.push_bind(id.to_hex()).push(" AND ");
        push_filter(&mut builder, expected);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

/// Open Postgres transaction. Dropping it without commit rolls back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    /// Upserts a batch of documents with a single multi-row `INSERT`.
    ///
    /// # Arguments
    ///
    /// * `kind` - Target collection
    /// * `documents` - `(id, document)` pairs (empty slices are no-ops)
    /// * `overwrite` - Replace existing rows when true, keep them otherwise
    async fn insert_documents_tx(
        &mut self,
        kind: AnchorKind,
        documents: &[(ObjectId, Value)],
        overwrite: bool,
    ) -> Result<(), StoreError> {
        if documents.is_empty() {
            return Ok(());
        }

        let mut query_builder =
            QueryBuilder::<Postgres>::new(format!("INSERT INTO {} (id, doc) ", table(kind)));
        query_builder.push_values(documents, |mut b, (id, document)| {
            b.push_bind(id.to_hex()).push_bind(document.clone());
        });
        if overwrite {
            query_builder.push(" ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc");
        } else {
            query_builder.push(" ON CONFLICT (id) DO NOTHING");
        }

        query_builder.build().execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn delete_documents_tx(
        &mut self,
        kind: AnchorKind,
        ids: &[ObjectId],
    ) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = ids.iter().map(|id| id.to_hex()).collect();
        sqlx::query(&format!(
            "DELETE FROM {} WHERE id IN (SELECT * FROM UNNEST($1::text[]))",
            table(kind)
        ))
        .bind(&ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_matching_tx(&mut self, kind: AnchorKind, filter: &Filter) -> Result<(), StoreError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("DELETE FROM {} WHERE ", table(kind)));
        push_filter(&mut builder, filter);
        builder.build().execute(&mut *self.tx).await?;
        Ok(())
    }
}

/// Consecutive writes of the same shape, flushed as one statement.
enum Batch {
    Upsert(Vec<(ObjectId, Value)>),
    InsertIfAbsent(Vec<(ObjectId, Value)>),
    Delete(Vec<ObjectId>),
    DeleteMany(Filter),
}

fn batches(ops: &[WriteOp]) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    for op in ops {
        match (op, batches.last_mut()) {
            (WriteOp::Upsert { id, document }, Some(Batch::Upsert(docs))) => {
                docs.push((*id, document.clone()));
            }
            (WriteOp::Upsert { id, document }, _) => {
                batches.push(Batch::Upsert(vec![(*id, document.clone())]));
            }
            (WriteOp::InsertIfAbsent { id, document }, Some(Batch::InsertIfAbsent(docs))) => {
                docs.push((*id, document.clone()));
            }
            (WriteOp::InsertIfAbsent { id, document }, _) => {
                batches.push(Batch::InsertIfAbsent(vec![(*id, document.clone())]));
            }
            (WriteOp::Delete { id }, Some(Batch::Delete(ids))) => ids.push(*id),
            (WriteOp::Delete { id }, _) => batches.push(Batch::Delete(vec![*id])),
            (WriteOp::DeleteMany(filter), _) => batches.push(Batch::DeleteMany(filter.clone())),
        }
    }
    batches
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn bulk_write(&mut self, kind: AnchorKind, ops: &[WriteOp]) -> Result<(), StoreError> {
        for batch in batches(ops) {
            match batch {
                Batch::Upsert(documents) => self.insert_documents_tx(kind, &documents, true).await?,
                Batch::InsertIfAbsent(documents) => {
                    self.insert_documents_tx(kind, &documents, false).await?
                }
                Batch::Delete(ids) => self.delete_documents_tx(kind, &ids).await?,
                Batch::DeleteMany(filter) => self.delete_matching_tx(kind, &filter).await?,
            }
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
