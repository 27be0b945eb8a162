use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::database::{
    CollectionStats, DistanceMetric, ScoredRecord, TAGS_FIELD, VectorRecord, VectorStore,
    check_dimensions,
};

/// pgvector 后端，每种度量一张表 `<base>_<metric>`
pub struct PgVectorStore {
    pool: PgPool,
    table_base: String,
    dimensions: usize,
}

impl PgVectorStore {
    pub async fn new(pool: PgPool, table_base: &str, dimensions: usize) -> Result<Self> {
        let store = Self {
            pool,
            table_base: table_base.to_string(),
            dimensions,
        };
        store.ensure_collections().await?;
        Ok(store)
    }

    fn table(&self, metric: DistanceMetric) -> String {
        metric.collection_name(&self.table_base)
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

/// 距离运算符
fn operator(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "<=>",
        DistanceMetric::Euclid => "<->",
        DistanceMetric::Dot => "<#>",
        DistanceMetric::Manhattan => "<+>",
    }
}

/// 把运算符结果换成与 Qdrant 一致的分数：cosine / dot 越大越好
fn score_expr(metric: DistanceMetric) -> String {
    let op = operator(metric);
    match metric {
        DistanceMetric::Cosine => format!("1 - (embedding {} $1::real[]::vector)", op),
        DistanceMetric::Dot => format!("(embedding {} $1::real[]::vector) * -1", op),
        _ => format!("embedding {} $1::real[]::vector", op),
    }
}

/// `LIMIT` 只接受 i64
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn dimension(&self) -> usize {
        self.dimensions
    }

    async fn ensure_collections(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .context("Failed to create vector extension")?;

        for metric in DistanceMetric::ALL {
            let sql = format!(
                r#"
                CREATE TABLE IF NOT EXISTS "{}" (
                    id UUID PRIMARY KEY,
                    embedding VECTOR({}),
                    payload JSONB DEFAULT '{{}}'::jsonb,
                    createat TIMESTAMPTZ DEFAULT NOW(),
                    updateat TIMESTAMPTZ DEFAULT NOW()
                );"#,
                self.table(metric),
                self.dimensions,
            );
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .context("Failed to init vector table")?;
        }
        Ok(())
    }

    async fn upsert_vectors(&self, vectors: Vec<VectorRecord>) -> Result<()> {
        check_dimensions(self.dimensions, &vectors)?;
        let mut tx = self.pool.begin().await?;

        for metric in DistanceMetric::ALL {
            for vec in &vectors {
                let id = Uuid::parse_str(&vec.id).context(format!("Invalid UUID: {}", vec.id))?;
                let now = Utc::now();

                sqlx::query(&format!(
                    r#"INSERT INTO "{}" (id, embedding, payload, createat, updateat)
                       VALUES ($1, $2::real[]::vector, $3, $4, $4)
                       ON CONFLICT (id) DO UPDATE SET
                         embedding = EXCLUDED.embedding,
                         payload = EXCLUDED.payload,
                         updateat = EXCLUDED.updateat"#,
                    self.table(metric)
                ))
                .bind(id)
                .bind(&vec.embedding)
                .bind(&vec.payload)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, metric: DistanceMetric, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        if query.len() != self.dimensions {
            anyhow::bail!(
                "Query dim mismatch: expected {}, got {}",
                self.dimensions,
                query.len()
            );
        }
        let sql = format!(
            r#"SELECT id::text AS id, payload, ({})::float8 AS score
               FROM "{}"
               ORDER BY embedding {} $1::real[]::vector
               LIMIT $2"#,
            score_expr(metric),
            self.table(metric),
            operator(metric),
        );
        let rows = sqlx::query(&sql)
            .bind(query)
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<ScoredRecord> {
                Ok(ScoredRecord {
                    id: row.try_get("id")?,
                    score: row.try_get::<f64, _>("score")? as f32,
                    payload: row.try_get("payload")?,
                })
            })
            .collect()
    }

    async fn find_by_tags(&self, metric: DistanceMetric, tags: &[String], limit: usize) -> Result<Vec<ScoredRecord>> {
        let sql = format!(
            r#"SELECT id::text AS id, payload FROM "{}"
               WHERE payload->'{}' ?| $1
               ORDER BY createat
               LIMIT $2"#,
            self.table(metric),
            TAGS_FIELD,
        );
        let rows = sqlx::query(&sql)
            .bind(tags)
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<ScoredRecord> {
                Ok(ScoredRecord {
                    id: row.try_get("id")?,
                    score: 0.0,
                    payload: row.try_get("payload")?,
                })
            })
            .collect()
    }

    async fn get_vector(&self, metric: DistanceMetric, id: &str) -> Result<Option<VectorRecord>> {
        let uuid = Uuid::parse_str(id)?;
        let row = sqlx::query(&format!(
            r#"SELECT id::text AS id, embedding::real[] AS embedding, payload FROM "{}" WHERE id = $1"#,
            self.table(metric)
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<VectorRecord> {
            Ok(VectorRecord {
                id: row.try_get("id")?,
                embedding: row.try_get("embedding")?,
                payload: row.try_get("payload")?,
            })
        })
        .transpose()
    }

    async fn delete_vector(&self, ids: Vec<String>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let uuids = ids
            .iter()
            .map(|id| Uuid::parse_str(id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await?;
        for metric in DistanceMetric::ALL {
            sqlx::query(&format!(r#"DELETE FROM "{}" WHERE id = ANY($1)"#, self.table(metric)))
                .bind(&uuids)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn collection_stats(&self) -> Result<Vec<CollectionStats>> {
        let mut stats = Vec::new();
        for metric in DistanceMetric::ALL {
            let table = self.table(metric);
            if !self.table_exists(&table).await? {
                continue;
            }
            let count: i64 = sqlx::query_scalar(&format!(r#"SELECT COUNT(*) FROM "{}""#, table))
                .fetch_one(&self.pool)
                .await?;
            stats.push(CollectionStats {
                name: table,
                metric,
                dimension: self.dimensions,
                points_count: count as u64,
                status: "green".to_string(),
            });
        }
        Ok(stats)
    }

    async fn drop_collections(&self) -> Result<()> {
        for metric in DistanceMetric::ALL {
            sqlx::query(&format!(r#"DROP TABLE IF EXISTS "{}""#, self.table(metric)))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn health(&self) -> Result<String> {
        let version: String = sqlx::query_scalar("SELECT version()")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotenv::dotenv;
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;

    async fn connect() -> PgVectorStore {
        dotenv().ok();
        let url = std::env::var("DATABASE_URL").unwrap_or("postgres:///imgrag_test".to_string());
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("Failed to connect");
        PgVectorStore::new(pool, "imgrag_test", 3)
            .await
            .expect("Failed to create PgVectorStore")
    }

    #[test]
    fn test_score_expr() {
        assert_eq!(score_expr(DistanceMetric::Euclid), "embedding <-> $1::real[]::vector");
        assert!(score_expr(DistanceMetric::Cosine).starts_with("1 - "));
        assert!(score_expr(DistanceMetric::Dot).ends_with("* -1"));
        assert_eq!(operator(DistanceMetric::Manhattan), "<+>");
    }

    #[test]
    fn test_sql_limit_clamps() {
        assert_eq!(sql_limit(10), 10);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
    }

    #[tokio::test]
    #[ignore = "needs a postgres with the vector extension"]
    async fn test_upsert_search_delete() {
        let store = connect().await;
        let id = "00000000-0000-0000-0000-000000000001".to_string();
        let record = VectorRecord {
            id: id.clone(),
            embedding: vec![1.0, 2.0, 3.0],
            payload: json!({"ai_tags": ["snow"]}),
        };
        store.upsert_vectors(vec![record]).await.unwrap();

        let hits = store.search(DistanceMetric::Euclid, &[1.0, 2.0, 3.0], 1).await.unwrap();
        assert_eq!(hits[0].id, id);
        assert!(hits[0].score.abs() < 1e-6);

        let tagged = store
            .find_by_tags(DistanceMetric::Cosine, &["snow".to_string()], 10)
            .await
            .unwrap();
        assert!(tagged.iter().any(|r| r.id == id));

        store.delete_vector(vec![id.clone()]).await.unwrap();
        assert!(store.get_vector(DistanceMetric::Dot, &id).await.unwrap().is_none());
    }
}
