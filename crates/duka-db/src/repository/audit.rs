//! # Audit Log Repository
//!
//! Who did what to which row. `old_values` / `new_values` hold JSON text.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use duka_core::AuditLog;

/// Repository for audit records.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    /// Creates a new AuditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Appends an audit record.
    pub async fn insert(&self, entry: &AuditLog) -> DbResult<()> {
        debug!(action = %entry.action, table = %entry.table_name, "Writing audit record");

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, user_id, action, table_name, record_id, old_values, new_values, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.action)
        .bind(&entry.table_name)
        .bind(&entry.record_id)
        .bind(&entry.old_values)
        .bind(&entry.new_values)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records for one row of one table, newest first.
    pub async fn for_record(&self, table_name: &str, record_id: &str) -> DbResult<Vec<AuditLog>> {
        let rows = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE table_name = ?1 AND record_id = ?2
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(table_name)
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_insert_and_read() {
        let db = fixtures::db().await;
        let entry = AuditLog {
            id: Uuid::new_v4().to_string(),
            user_id: None,
            action: "DELETE".to_string(),
            table_name: "sales".to_string(),
            record_id: Some("s-1".to_string()),
            old_values: Some(r#"{"total_cents":1000}"#.to_string()),
            new_values: None,
            created_at: Utc::now(),
        };
        db.audit().insert(&entry).await.unwrap();

        let rows = db.audit().for_record("sales", "s-1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "DELETE");
    }
}
