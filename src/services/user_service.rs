use std::sync::Arc;

use uuid::Uuid;

use crate::config::settings::BootstrapConfig;
use crate::db::repositories::{User, UserRepository};
use crate::error::AppError;
use crate::models::{AuthenticatedUser, UserRole};
use crate::security::password::{hash_password, validate_password, verify_dummy_password, verify_password};
use crate::services::session_store::SessionStore;

const MAX_NAME_CHARS: usize = 120;

pub fn validate_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(AppError::Validation(format!("{} is not a valid email address", email)));
    }
    Ok(email)
}

pub fn validate_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "Name must be at most {} characters",
            MAX_NAME_CHARS
        )));
    }
    Ok(name)
}

/// Login, profile and user administration. Changes that should end a user's
/// access invalidate their sessions right away.
pub struct UserService {
    users: Arc<UserRepository>,
    sessions: SessionStore,
}

impl UserService {
    pub fn new(users: Arc<UserRepository>, sessions: SessionStore) -> Self {
        Self { users, sessions }
    }

    pub fn repository(&self) -> &UserRepository {
        &self.users
    }

    /// Checks credentials. Unknown email, wrong password and inactive account
    /// all give the same message.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<AuthenticatedUser, AppError> {
        let rejected = || AppError::Validation("Invalid email or password".to_string());
        let Some(user) = self.users.find_by_email(email.trim()).await? else {
            verify_dummy_password(password);
            log::info!("Login attempt for unknown email");
            return Err(rejected());
        };
        if !verify_password(password, &user.password_hash) {
            log::info!("Wrong password for user {}", user.id);
            return Err(rejected());
        }
        if !user.is_active {
            log::info!("Login attempt for deactivated user {}", user.id);
            return Err(rejected());
        }
        self.users.record_login(&user.id).await?;
        Ok(user.to_authenticated())
    }

    pub async fn create(&self, email: &str, full_name: &str, role: UserRole, password: &str) -> Result<Uuid, AppError> {
        let email = validate_email(email)?;
        let full_name = validate_name(full_name)?;
        let hash = hash_password(password)?;
        let id = self.users.create(&email, &hash, full_name, role).await?;
        log::info!("User {} created with role {}", id, role);
        Ok(id)
    }

    pub async fn update(
        &self,
        actor: &AuthenticatedUser,
        id: &Uuid,
        email: &str,
        full_name: &str,
        role: UserRole,
    ) -> Result<(), AppError> {
        let email = validate_email(email)?;
        let full_name = validate_name(full_name)?;
        if *id == actor.user_id && role != UserRole::Admin {
            return Err(AppError::Validation("You cannot remove your own admin role".to_string()));
        }
        self.users.update_profile(id, &email, full_name, role).await?;
        let updated = self.users.get_by_id(id).await?;
        self.sessions.refresh_user(&updated.to_authenticated());
        Ok(())
    }

    pub async fn reset_password(&self, id: &Uuid, password: &str) -> Result<User, AppError> {
        let user = self.users.get_by_id(id).await?;
        let hash = hash_password(password)?;
        self.users.set_password_hash(id, &hash).await?;
        let removed = self.sessions.invalidate_user_sessions(id);
        log::info!("Password of user {} reset; {} session(s) ended", id, removed);
        Ok(user)
    }

    pub async fn set_active(&self, actor: &AuthenticatedUser, id: &Uuid, active: bool) -> Result<User, AppError> {
        if !active && *id == actor.user_id {
            return Err(AppError::Validation("You cannot deactivate your own account".to_string()));
        }
        let user = self.users.get_by_id(id).await?;
        self.users.set_active(id, active).await?;
        if !active {
            let removed = self.sessions.invalidate_user_sessions(id);
            log::info!("User {} deactivated by {}; {} session(s) ended", id, actor.user_id, removed);
        }
        Ok(user)
    }

    /// Name and optional password change from the profile page.
    pub async fn update_own_profile(
        &self,
        user: &AuthenticatedUser,
        full_name: &str,
        current_password: Option<&str>,
        new_password: Option<&str>,
    ) -> Result<AuthenticatedUser, AppError> {
        let full_name = validate_name(full_name)?;
        if let Some(new_password) = new_password {
            validate_password(new_password)?;
            let stored = self.users.get_by_id(&user.user_id).await?;
            let current = current_password.unwrap_or_default();
            if !verify_password(current, &stored.password_hash) {
                return Err(AppError::Validation("Current password is incorrect".to_string()));
            }
            self.users.set_password_hash(&user.user_id, &hash_password(new_password)?).await?;
        }
        self.users.update_name(&user.user_id, full_name).await?;

        let refreshed = AuthenticatedUser {
            full_name: full_name.to_string(),
            ..user.clone()
        };
        self.sessions.refresh_user(&refreshed);
        Ok(refreshed)
    }

    /// Creates the first admin from configuration when none exists yet.
    pub async fn bootstrap_admin(&self, config: &BootstrapConfig) -> Result<Option<Uuid>, AppError> {
        let (Some(email), Some(password)) = (config.admin_email.as_deref(), config.admin_password.as_deref()) else {
            return Ok(None);
        };
        if self.users.count_admins().await? > 0 {
            log::debug!("Admin already present; skipping bootstrap");
            return Ok(None);
        }
        let id = self.create(email, "Administrator", UserRole::Admin, password).await?;
        log::info!("Bootstrap admin {} created", email);
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email("  Pat@Example.COM ").unwrap(), "pat@example.com");
        assert!(validate_email("pat").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("pat@localhost").is_err());
        assert!(validate_email("pat@.com").is_err());
        assert!(validate_email("p at@example.com").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Jo  ").unwrap(), "Jo");
        assert!(validate_name("").is_err());
        assert!(validate_name(&"n".repeat(121)).is_err());
    }
}
