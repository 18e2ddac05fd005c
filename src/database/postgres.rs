use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::store::{strip_id, Condition, Document, DocumentStore, Filter, StoreError, ID_FIELD};
use crate::config::DatabaseConfig;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id UUID NOT NULL,
        body JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (collection, id)
    )
"#;

/// PostgreSQL-backed document store: one `documents` table, JSONB bodies.
pub struct PgDocumentStore {
    pool: PgPool,
}

type DocumentRow = (Uuid, Json<Value>);

impl PgDocumentStore {
    pub async fn connect(uri: &str, settings: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.connection_timeout))
            .connect(uri)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;

        info!("Created database pool for document store");
        Ok(Self { pool })
    }

    fn into_document(collection: &str, (id, Json(body)): DocumentRow) -> Result<Document, StoreError> {
        match body {
            Value::Object(mut map) => {
                map.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
                Ok(map)
            }
            other => Err(StoreError::Corrupt {
                collection: collection.to_string(),
                reason: format!("body of {} is not an object: {}", id, other),
            }),
        }
    }

    fn into_optional(collection: &str, row: Option<DocumentRow>) -> Result<Option<Document>, StoreError> {
        row.map(|r| Self::into_document(collection, r)).transpose()
    }
}

/// Escape LIKE wildcards so the needle is matched literally.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_conditions<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &'a Filter) {
    for condition in filter.conditions() {
        match condition {
            Condition::Equals(field, value) => {
                builder.push(" AND body -> ");
                builder.push_bind(field.as_str());
                builder.push(" = ");
                builder.push_bind(Json(value));
            }
            Condition::Contains(field, needle) => {
                builder.push(" AND body ->> ");
                builder.push_bind(field.as_str());
                builder.push(" ILIKE ");
                builder.push_bind(like_pattern(needle));
            }
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, StoreError> {
        let body = Value::Object(strip_id(doc));
        let row: DocumentRow = sqlx::query_as(
            "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3) RETURNING id, body",
        )
        .bind(collection)
        .bind(Uuid::new_v4())
        .bind(Json(body))
        .fetch_one(&self.pool)
        .await?;
        Self::into_document(collection, row)
    }

    async fn find_by_id(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT id, body FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Self::into_optional(collection, row)
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT id, body FROM documents WHERE collection = ");
        builder.push_bind(collection);
        push_conditions(&mut builder, filter);
        builder.push(" ORDER BY created_at, id");

        let rows: Vec<DocumentRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| Self::into_document(collection, row))
            .collect()
    }

    async fn update(&self, collection: &str, id: Uuid, patch: Document) -> Result<Option<Document>, StoreError> {
        let patch = Value::Object(strip_id(patch));
        let row: Option<DocumentRow> = sqlx::query_as(
            "UPDATE documents SET body = body || $3, updated_at = now() \
             WHERE collection = $1 AND id = $2 RETURNING id, body",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(patch))
        .fetch_optional(&self.pool)
        .await?;
        Self::into_optional(collection, row)
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let row: Option<DocumentRow> =
            sqlx::query_as("DELETE FROM documents WHERE collection = $1 AND id = $2 RETURNING id, body")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Self::into_optional(collection, row)
    }

    async fn push(&self, collection: &str, id: Uuid, field: &str, value: Value) -> Result<Option<Document>, StoreError> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "UPDATE documents \
             SET body = jsonb_set(body, ARRAY[$3::text], \
                 COALESCE(body -> $3::text, '[]'::jsonb) || jsonb_build_array($4::jsonb), true), \
                 updated_at = now() \
             WHERE collection = $1 AND id = $2 RETURNING id, body",
        )
        .bind(collection)
        .bind(id)
        .bind(field)
        .bind(Json(value))
        .fetch_optional(&self.pool)
        .await?;
        Self::into_optional(collection, row)
    }

    async fn pull(&self, collection: &str, id: Uuid, field: &str, value: &Value) -> Result<Option<Document>, StoreError> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "UPDATE documents \
             SET body = jsonb_set(body, ARRAY[$3::text], COALESCE(( \
                 SELECT jsonb_agg(item) \
                 FROM jsonb_array_elements(COALESCE(body -> $3::text, '[]'::jsonb)) AS item \
                 WHERE item <> $4::jsonb), '[]'::jsonb), true), \
                 updated_at = now() \
             WHERE collection = $1 AND id = $2 RETURNING id, body",
        )
        .bind(collection)
        .bind(id)
        .bind(field)
        .bind(Json(value))
        .fetch_optional(&self.pool)
        .await?;
        Self::into_optional(collection, row)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}
