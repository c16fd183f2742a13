//! # Cache Namespaces
//!
//! Named, versioned partitions of request/response pairs used by the
//! interception layer. Entries are keyed by [`HttpRequest::cache_key`] and
//! never expire individually; a namespace is evicted as a whole.
//!
//! [`HttpRequest::cache_key`]: crate::network::HttpRequest::cache_key

use crate::local_db::LocalDatabase;
use crate::network::HttpResponse;
use crate::shared::error::Result;
use crate::shared::task::now_millis;
use bytes::Bytes;
use sqlx::{Row, SqliteConnection};

impl LocalDatabase {
    /// Create a namespace if it does not exist yet
    pub async fn open_cache(&self, namespace: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        open_cache_on(&mut conn, namespace).await
    }

    /// Store one response, replacing any previous entry for the key
    pub async fn cache_put(&self, namespace: &str, key: &str, response: &HttpResponse) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        open_cache_on(&mut tx, namespace).await?;
        cache_put_on(&mut tx, namespace, key, response).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Store several responses; either all are written or none are
    pub async fn cache_put_all(&self, namespace: &str, entries: &[(String, HttpResponse)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        open_cache_on(&mut tx, namespace).await?;
        for (key, response) in entries {
            cache_put_on(&mut tx, namespace, key, response).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Look up a response in one namespace
    pub async fn cache_match(&self, namespace: &str, key: &str) -> Result<Option<HttpResponse>> {
        let row = sqlx::query(
            "SELECT status, headers, body FROM cache_entries WHERE namespace = ? AND request_key = ?",
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row_to_response(&row)).transpose()
    }

    /// Look up a response in every namespace, oldest namespace first
    pub async fn cache_match_any(&self, key: &str) -> Result<Option<HttpResponse>> {
        let row = sqlx::query(
            "SELECT e.status, e.headers, e.body
             FROM cache_entries e
             JOIN cache_namespaces n ON n.name = e.namespace
             WHERE e.request_key = ?
             ORDER BY n.created_at ASC, n.rowid ASC
             LIMIT 1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row_to_response(&row)).transpose()
    }

    /// Names of all namespaces in creation order
    pub async fn cache_names(&self) -> Result<Vec<String>> {
        let names: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM cache_namespaces ORDER BY created_at ASC, rowid ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(names.into_iter().map(|(name,)| name).collect())
    }

    /// Drop a namespace and every entry in it; returns whether it existed
    pub async fn delete_cache(&self, namespace: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cache_entries WHERE namespace = ?")
            .bind(namespace)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM cache_namespaces WHERE name = ?")
            .bind(namespace)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn open_cache_on(conn: &mut SqliteConnection, namespace: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO cache_namespaces (name, created_at) VALUES (?, ?)")
        .bind(namespace)
        .bind(now_millis())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn cache_put_on(
    conn: &mut SqliteConnection,
    namespace: &str,
    key: &str,
    response: &HttpResponse,
) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO cache_entries (namespace, request_key, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(namespace)
    .bind(key)
    .bind(i64::from(response.status))
    .bind(serde_json::to_string(&response.headers)?)
    .bind(response.body.to_vec())
    .bind(now_millis())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn row_to_response(row: &sqlx::sqlite::SqliteRow) -> Result<HttpResponse> {
    let status: i64 = row.try_get("status")?;
    let headers: String = row.try_get("headers")?;
    let body: Vec<u8> = row.try_get("body")?;

    Ok(HttpResponse {
        status: u16::try_from(status)
            .map_err(|_| crate::shared::error::SyncError::corrupt("cache_entries", format!("status {}", status)))?,
        headers: serde_json::from_str(&headers)?,
        body: Bytes::from(body),
    })
}
