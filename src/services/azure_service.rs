use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::clients::{AzureBlobClient, ContainerSas};
use crate::db::repositories::{AzureContainer, AzureContainerRepository, UserRepository};
use crate::error::AppError;
use crate::models::{AuthenticatedUser, UserRole};

const CLIENT_PERMISSIONS: &str = "rl";

/// Azure container naming: 3-63 characters of lowercase letters, digits and
/// single hyphens, starting and ending with a letter or digit.
pub fn validate_container_name(name: &str) -> Result<(), AppError> {
    let invalid = |reason: &str| Err(AppError::Validation(format!("Invalid container name: {}", reason)));

    if !(3..=63).contains(&name.len()) {
        return invalid("it must be 3 to 63 characters long");
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return invalid("use only lowercase letters, digits and hyphens");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return invalid("it must start and end with a letter or digit");
    }
    if name.contains("--") {
        return invalid("hyphens cannot be consecutive");
    }
    Ok(())
}

pub struct AzureService {
    containers: Arc<AzureContainerRepository>,
    users: Arc<UserRepository>,
    client: Option<AzureBlobClient>,
}

impl AzureService {
    pub fn new(
        containers: Arc<AzureContainerRepository>,
        users: Arc<UserRepository>,
        client: Option<AzureBlobClient>,
    ) -> Self {
        Self { containers, users, client }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Option<&AzureBlobClient> {
        self.client.as_ref()
    }

    fn require_client(&self) -> Result<&AzureBlobClient, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Validation("Azure storage is not configured".to_string()))
    }

    /// Containers the user may see: clients only their own.
    pub async fn visible_containers(&self, user: &AuthenticatedUser) -> Result<Vec<AzureContainer>, AppError> {
        match user.role {
            UserRole::Client => self.containers.list(Some(user.user_id)).await,
            UserRole::Admin | UserRole::Employee => self.containers.list(None).await,
        }
    }

    /// Creates the remote container, then records it. If recording fails the
    /// remote container is removed again.
    pub async fn add(
        &self,
        user: &AuthenticatedUser,
        name: &str,
        client_id: Option<Uuid>,
        description: Option<&str>,
    ) -> Result<Uuid, AppError> {
        user.require_admin()?;
        let name = name.trim();
        validate_container_name(name)?;
        let azure = self.require_client()?;
        if let Some(client_id) = client_id {
            self.users.get_with_role(&client_id, UserRole::Client).await?;
        }

        azure.create_container(name).await?;
        match self.containers.insert(name, client_id, description, &user.user_id).await {
            Ok(id) => Ok(id),
            Err(e) => {
                if let Err(cleanup) = azure.delete_container(name).await {
                    log::error!("Container {} created but not recorded, cleanup failed: {}", name, cleanup);
                }
                Err(e)
            }
        }
    }

    pub async fn delete(&self, user: &AuthenticatedUser, id: &Uuid) -> Result<AzureContainer, AppError> {
        user.require_admin()?;
        let azure = self.require_client()?;
        let container = self.containers.get(id).await?;
        azure.delete_container(&container.name).await?;
        self.containers.delete(id).await?;
        Ok(container)
    }

    /// Generates a SAS for a registered container. Clients get read and list
    /// on their own containers only.
    pub async fn generate_sas(
        &self,
        user: &AuthenticatedUser,
        id: &Uuid,
        permissions: &str,
        valid_hours: i64,
    ) -> Result<(AzureContainer, ContainerSas), AppError> {
        let azure = self.require_client()?;
        let container = self.containers.get(id).await?;

        let permissions = match user.role {
            UserRole::Client => {
                if container.client_id != Some(user.user_id) {
                    return Err(AppError::NotFound("Container not found".to_string()));
                }
                restrict_to_client(permissions)
            }
            UserRole::Admin | UserRole::Employee => permissions.to_string(),
        };

        let sas = azure.container_sas(&container.name, &permissions, valid_hours, Utc::now())?;
        log::info!(
            "SAS ({}) for container {} issued to {} until {}",
            permissions,
            container.name,
            user.user_id,
            sas.expires_at
        );
        Ok((container, sas))
    }
}

/// Drops any permission a client may not hold.
fn restrict_to_client(requested: &str) -> String {
    let kept: String = requested.chars().filter(|c| CLIENT_PERMISSIONS.contains(*c)).collect();
    if kept.is_empty() {
        CLIENT_PERMISSIONS.to_string()
    } else {
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name_rules() {
        assert!(validate_container_name("client-files").is_ok());
        assert!(validate_container_name("abc").is_ok());
        assert!(validate_container_name(&"a".repeat(63)).is_ok());

        assert!(validate_container_name("ab").is_err());
        assert!(validate_container_name(&"a".repeat(64)).is_err());
        assert!(validate_container_name("Client").is_err());
        assert!(validate_container_name("-files").is_err());
        assert!(validate_container_name("files-").is_err());
        assert!(validate_container_name("my--files").is_err());
        assert!(validate_container_name("my_files").is_err());
    }

    #[test]
    fn test_client_permissions_are_restricted() {
        assert_eq!(restrict_to_client("racwdl"), "rl");
        assert_eq!(restrict_to_client("w"), "rl");
        assert_eq!(restrict_to_client("r"), "r");
    }
}
