//! # Notification Repository
//!
//! In-app notifications. `user_id = NULL` means the notice is for every
//! admin and manager.

use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use duka_core::Notification;

/// Repository for notifications.
#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    /// Creates a new NotificationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        NotificationRepository { pool }
    }

    /// Inserts a notification.
    pub async fn insert(&self, notification: &Notification) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, user_id, title, message, notification_type, is_read, action_url, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.notification_type)
        .bind(notification.is_read)
        .bind(&notification.action_url)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Notifications visible to a user (their own plus broadcasts), newest first.
    pub async fn list_for_user(&self, user_id: &str, unread_only: bool, limit: u32) -> DbResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE (user_id = ?1 OR user_id IS NULL)
              AND (?2 = 0 OR is_read = 0)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Marks a notification read, if `user_id` can see it.
    pub async fn mark_read(&self, id: &str, user_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND (user_id = ?2 OR user_id IS NULL)",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Notification", id));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use chrono::Utc;
    use duka_core::{NotificationType, UserRole};
    use uuid::Uuid;

    fn notice(user_id: Option<&str>, title: &str) -> Notification {
        Notification {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.map(str::to_string),
            title: title.to_string(),
            message: "msg".to_string(),
            notification_type: NotificationType::Warning,
            is_read: false,
            action_url: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_and_read() {
        let db = fixtures::db().await;
        let user = fixtures::user("mgr", UserRole::Manager);
        db.users().insert(&user).await.unwrap();
        let repo = db.notifications();

        let broadcast = notice(None, "Low Stock Alert");
        repo.insert(&broadcast).await.unwrap();
        repo.insert(&notice(Some(&user.id), "Personal")).await.unwrap();

        assert_eq!(repo.list_for_user(&user.id, false, 10).await.unwrap().len(), 2);
        repo.mark_read(&broadcast.id, &user.id).await.unwrap();
        let unread = repo.list_for_user(&user.id, true, 10).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].title, "Personal");

        let err = repo.mark_read(&unread[0].id, "someone-else").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
