//! User service
//!
//! Credential checks and account management. Session handling lives in
//! [`crate::services::session`].

use crate::db::repositories::UserRepository;
use crate::models::{CreateUserInput, User, UserType};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use std::sync::Arc;

/// Shortest password accepted for new accounts
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Login failures
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown name or wrong password. The two are not distinguished.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Error types for user management
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),

    /// Name already in use
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    NotFound(i64),

    /// An admin tried to delete their own account
    #[error("Cannot delete the current user")]
    CannotDeleteSelf,

    /// The user reported tickets or acted on them; the log keeps them
    #[error("User {0} has ticket history")]
    HasHistory(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for authentication and account management
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    /// Verified against on unknown names so every failed login costs one Argon2 run
    dummy_hash: Option<String>,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>) -> Self {
        let dummy_hash = match hash_password("roberts-dummy-password") {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!("Failed to prepare dummy password hash: {:#}", e);
                None
            }
        };
        Self {
            user_repo,
            dummy_hash,
        }
    }

    /// Check a name/password pair.
    pub async fn login(&self, name: &str, password: &str) -> Result<User, AuthError> {
        let Some(user) = self
            .user_repo
            .get_by_name(name.trim())
            .await
            .context("Failed to look up user")?
        else {
            if let Some(hash) = &self.dummy_hash {
                let _ = verify_password(password, hash);
            }
            tracing::info!("Failed login for unknown user");
            return Err(AuthError::InvalidCredentials);
        };

        let valid = verify_password(password, &user.password)
            .with_context(|| format!("Stored password hash of user {} is invalid", user.id))?;

        if !valid {
            tracing::info!("Failed login for user {}", user.name);
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!("User {} logged in", user.name);
        Ok(user)
    }

    /// Create an account. New users are agents unless a type is given.
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(UserServiceError::EmptyName);
        }
        if input.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(UserServiceError::PasswordTooShort(MIN_PASSWORD_LENGTH));
        }

        if self
            .user_repo
            .get_by_name(&name)
            .await
            .context("Failed to check name")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(name));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(name, password_hash, input.user_type.unwrap_or_default());
        let user = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!("Created {} {}", user.user_type, user.name);
        Ok(user)
    }

    pub async fn get(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<User>, UserServiceError> {
        Ok(self.user_repo.list().await.context("Failed to list users")?)
    }

    /// Delete `id` on behalf of `acting_user_id`. Sessions go with the user.
    ///
    /// Users who appear in the ticket log are refused.
    pub async fn delete(&self, id: i64, acting_user_id: i64) -> Result<(), UserServiceError> {
        if id == acting_user_id {
            return Err(UserServiceError::CannotDeleteSelf);
        }
        let user = self.get(id).await?;
        if self
            .user_repo
            .has_history(id)
            .await
            .context("Failed to check user history")?
        {
            return Err(UserServiceError::HasHistory(user.name));
        }
        self.user_repo
            .delete(id)
            .await
            .context("Failed to delete user")?;
        tracing::info!("Deleted user {}", user.name);
        Ok(())
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    /// Create the first administrator on an empty database.
    ///
    /// Returns `None` when users already exist.
    pub async fn bootstrap_admin(
        &self,
        name: &str,
        password: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if !self.is_first_user().await? {
            return Ok(None);
        }
        let admin = self
            .create_user(CreateUserInput {
                name: name.to_string(),
                password: password.to_string(),
                user_type: Some(UserType::Admin),
            })
            .await?;
        Ok(Some(admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxUserRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    async fn setup_service() -> UserService {
        UserService::new(SqlxUserRepository::boxed(setup_pool().await))
    }

    fn input(name: &str, password: &str) -> CreateUserInput {
        CreateUserInput {
            name: name.to_string(),
            password: password.to_string(),
            user_type: None,
        }
    }

    #[tokio::test]
    async fn test_create_user_defaults_to_agent() {
        let service = setup_service().await;
        let user = service.create_user(input("  ana  ", "password123")).await.unwrap();

        assert_eq!(user.name, "ana");
        assert_eq!(user.user_type, UserType::Agent);
        assert!(user.password.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_create_user_validation() {
        let service = setup_service().await;

        assert!(matches!(
            service.create_user(input("  ", "password123")).await,
            Err(UserServiceError::EmptyName)
        ));
        assert!(matches!(
            service.create_user(input("ana", "short")).await,
            Err(UserServiceError::PasswordTooShort(MIN_PASSWORD_LENGTH))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_name() {
        let service = setup_service().await;
        service.create_user(input("ana", "password123")).await.unwrap();

        assert!(matches!(
            service.create_user(input("ana", "password456")).await,
            Err(UserServiceError::UserExists(_))
        ));
    }

    #[tokio::test]
    async fn test_login() {
        let service = setup_service().await;
        let created = service.create_user(input("ana", "password123")).await.unwrap();

        let user = service.login("ana", "password123").await.unwrap();
        assert_eq!(user.id, created.id);

        assert!(matches!(
            service.login("ana", "wrong-password").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            service.login("nobody", "password123").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let service = setup_service().await;
        let admin = service.create_user(input("admin", "password123")).await.unwrap();
        let agent = service.create_user(input("ana", "password123")).await.unwrap();

        assert!(matches!(
            service.delete(admin.id, admin.id).await,
            Err(UserServiceError::CannotDeleteSelf)
        ));
        service.delete(agent.id, admin.id).await.unwrap();
        assert!(matches!(
            service.delete(agent.id, admin.id).await,
            Err(UserServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_on_empty_database() {
        let service = setup_service().await;

        let admin = service
            .bootstrap_admin("root", "password123")
            .await
            .unwrap()
            .unwrap();
        assert!(admin.is_admin());

        assert!(service
            .bootstrap_admin("root2", "password123")
            .await
            .unwrap()
            .is_none());
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_name_still_verifies_a_hash() {
        let service = setup_service().await;
        let dummy = service.dummy_hash.as_deref().unwrap();
        assert!(dummy.starts_with("$argon2id$"));
        assert!(!verify_password("password123", dummy).unwrap());

        assert!(matches!(
            service.login("nobody", "roberts-dummy-password").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_delete_user_with_ticket_history_is_refused() {
        let pool = setup_pool().await;
        let service = UserService::new(SqlxUserRepository::boxed(pool.clone()));
        let admin = service.create_user(input("admin", "password123")).await.unwrap();
        let agent = service.create_user(input("ana", "password123")).await.unwrap();

        sqlx::query(
            "INSERT INTO tickets (title, created_at, reported_by, email_to_reply) \
             VALUES ('Printer on fire', 0, ?, 'bob@example.com')",
        )
        .bind(agent.id)
        .execute(pool.sqlite().unwrap())
        .await
        .unwrap();

        assert!(matches!(
            service.delete(agent.id, admin.id).await,
            Err(UserServiceError::HasHistory(name)) if name == "ana"
        ));
        assert!(service.get(agent.id).await.is_ok());
    }
}
