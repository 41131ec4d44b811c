//! User/auth collaborator.
//!
//! The engine only needs two questions answered about a user id. The HTTP
//! layer works out *who* is calling (JWT `sub`); this trait says what they
//! may do.

use async_trait::async_trait;
use duka_db::UserRepository;

use crate::error::{EngineError, EngineResult};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// True for an existing, active user.
    async fn user_exists(&self, id: &str) -> EngineResult<bool>;

    /// True for an active admin or manager.
    async fn is_admin_or_manager(&self, id: &str) -> EngineResult<bool>;
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn user_exists(&self, id: &str) -> EngineResult<bool> {
        Ok(self.active_role(id).await?.is_some())
    }

    async fn is_admin_or_manager(&self, id: &str) -> EngineResult<bool> {
        Ok(self
            .active_role(id)
            .await?
            .map(|role| role.is_privileged())
            .unwrap_or(false))
    }
}

/// Fails with `Forbidden` unless `actor_id` is an admin or manager.
pub(crate) async fn require_privileged(
    users: &dyn UserDirectory,
    actor_id: &str,
    operation: &str,
) -> EngineResult<()> {
    if users.is_admin_or_manager(actor_id).await? {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "only admins and managers may {}",
            operation
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;
    use duka_core::UserRole;

    #[tokio::test]
    async fn test_repository_answers_role_questions() {
        let db = testkit::db().await;
        let admin = testkit::user(&db, "wanjiru", UserRole::Admin).await;
        let cashier = testkit::user(&db, "otieno", UserRole::Employee).await;
        let users = db.users();

        assert!(users.user_exists(&cashier).await.unwrap());
        assert!(!users.user_exists("missing").await.unwrap());
        assert!(users.is_admin_or_manager(&admin).await.unwrap());
        assert!(!users.is_admin_or_manager(&cashier).await.unwrap());

        assert!(require_privileged(&users, &admin, "restock").await.is_ok());
        assert!(matches!(
            require_privileged(&users, &cashier, "restock").await,
            Err(EngineError::Forbidden(_))
        ));
    }
}
