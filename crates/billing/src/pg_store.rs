//! PostgreSQL record store
//!
//! Documents are JSONB rows in a single `documents` table keyed by
//! `(collection, id)`. Updates merge with `||`, so fields absent from the
//! patch survive. Server timestamps come from the database clock.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::error::{StoreError, StoreResult};
use crate::records::Collection;
use crate::store::{Document, Patch, RecordStore};

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn split_patch(patch: Patch) -> (Json<Value>, Vec<String>) {
    let stamps = patch.server_timestamps().to_vec();
    (Json(Value::Object(patch.fields().clone())), stamps)
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        let row: Option<(Json<Value>,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((Json(Value::Object(doc)),)) => Ok(Some(doc)),
            Some((Json(other),)) => Err(StoreError::Serialization(format!(
                "{}/{} is not an object: {}",
                collection, id, other
            ))),
            None => Ok(None),
        }
    }

    async fn set(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()> {
        let (fields, stamps) = split_patch(patch);

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES (
                $1, $2,
                $3::jsonb || COALESCE(
                    (SELECT jsonb_object_agg(k, to_jsonb(NOW())) FROM unnest($4::text[]) AS k),
                    '{}'::jsonb
                )
            )
            ON CONFLICT (collection, id) DO UPDATE SET
                data = EXCLUDED.data,
                updated_at = NOW()
            "#,
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(fields)
        .bind(stamps)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, collection: Collection, id: &str, patch: Patch) -> StoreResult<()> {
        let (fields, stamps) = split_patch(patch);

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET data = data || $3::jsonb || COALESCE(
                    (SELECT jsonb_object_agg(k, to_jsonb(NOW())) FROM unnest($4::text[]) AS k),
                    '{}'::jsonb
                ),
                updated_at = NOW()
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(fields)
        .bind(stamps)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        }

        Ok(())
    }
}
