//! # User Repository
//!
//! Staff accounts. Password hashes are stored as argon2 PHC strings and are
//! never serialized out of the crate (`#[serde(skip)]` on the field).

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use duka_core::{User, UserRole};

/// Repository for user database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Gets a user by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Gets an active user by login name.
    pub async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE username = ?1 AND is_active = 1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Role of an active user, `None` if the user is unknown or disabled.
    pub async fn active_role(&self, id: &str) -> DbResult<Option<UserRole>> {
        let role = sqlx::query_scalar::<_, UserRole>(
            "SELECT role FROM users WHERE id = ?1 AND is_active = 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    /// Inserts a new user.
    pub async fn insert(&self, user: &User) -> DbResult<()> {
        debug!(id = %user.id, username = %user.username, role = %user.role.as_str(), "Inserting user");

        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, name, email, password_hash, role,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// True when the user row exists, on the caller's connection.
pub async fn exists(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::DbError;

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = fixtures::db().await;
        let user = fixtures::user("amina", UserRole::Manager);
        db.users().insert(&user).await.unwrap();

        let by_name = db.users().get_by_username("amina").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
        assert_eq!(db.users().active_role(&user.id).await.unwrap(), Some(UserRole::Manager));
        assert_eq!(db.users().active_role("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let db = fixtures::db().await;
        db.users().insert(&fixtures::user("otieno", UserRole::Staff)).await.unwrap();
        let err = db
            .users()
            .insert(&fixtures::user("otieno", UserRole::Staff))
            .await
            .unwrap_err();
        assert!(err.is_unique_on("username"));
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }
}
