use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::db::repositories::{MediaItem, MediaRepository, NewMedia, PlanDocumentRepository};
use crate::error::AppError;
use crate::models::AuthenticatedUser;
use crate::security::share_links::ShareLinkSigner;
use crate::services::file_storage::FileStorage;
use crate::utils::mime_utils::display_name;
use crate::utils::multipart_utils::UploadedFile;

const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Stored(Uuid),
    /// Same bytes already in the library under this title.
    Duplicate(String),
}

pub struct MediaService {
    media: Arc<MediaRepository>,
    documents: Arc<PlanDocumentRepository>,
    storage: FileStorage,
    signer: ShareLinkSigner,
    share_link_hours: i64,
}

impl MediaService {
    pub fn new(
        media: Arc<MediaRepository>,
        documents: Arc<PlanDocumentRepository>,
        storage: FileStorage,
        signer: ShareLinkSigner,
        share_link_hours: i64,
    ) -> Self {
        Self {
            media,
            documents,
            storage,
            signer,
            share_link_hours,
        }
    }

    pub fn repository(&self) -> &MediaRepository {
        &self.media
    }

    /// Stores an upload unless a file with the same checksum exists.
    pub async fn upload(
        &self,
        user: &AuthenticatedUser,
        upload: UploadedFile,
        title: Option<&str>,
        alt_text: Option<&str>,
    ) -> Result<UploadOutcome, AppError> {
        user.require_staff()?;
        if let Some(existing) = self.media.find_by_checksum(&upload.checksum_sha256).await? {
            log::info!("Upload of {} matches existing media {}", upload.original_name, existing.id);
            return Ok(UploadOutcome::Duplicate(existing.title));
        }

        let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => validate_title(title)?.to_string(),
            None => display_name(&upload.original_name),
        };
        let stored = self.storage.store(upload)?;
        let new = NewMedia {
            title,
            original_name: display_name(&stored.original_name),
            stored_name: stored.stored_name.clone(),
            mime_type: stored.mime_type.clone(),
            size_bytes: stored.size_bytes,
            checksum_sha256: stored.checksum_sha256.clone(),
            alt_text: alt_text.map(str::to_string),
            uploaded_by: user.user_id,
        };

        match self.media.insert(&new).await {
            Ok(id) => Ok(UploadOutcome::Stored(id)),
            Err(e) => {
                self.storage.remove(&stored.stored_name);
                Err(e)
            }
        }
    }

    pub async fn update_details(&self, id: &Uuid, title: &str, alt_text: Option<&str>) -> Result<(), AppError> {
        let title = validate_title(title)?;
        self.media.update_details(id, title, alt_text).await
    }

    /// Deletes the row and then the file. Items still attached to a plan
    /// document stay.
    pub async fn delete(&self, id: &Uuid) -> Result<MediaItem, AppError> {
        let item = self.media.get(id).await?;
        let references = self.documents.count_for_media(id).await?;
        if references > 0 {
            return Err(AppError::Validation(format!(
                "{} is used by {} plan document(s) and cannot be deleted",
                item.title, references
            )));
        }
        self.media.delete(id).await?;
        self.storage.remove(&item.stored_name);
        Ok(item)
    }

    pub async fn file(&self, id: &Uuid) -> Result<(MediaItem, PathBuf), AppError> {
        let item = self.media.get(id).await?;
        let path = self.storage.path_for(&item.stored_name)?;
        Ok((item, path))
    }

    pub fn share_token(&self, id: Uuid) -> Result<String, AppError> {
        self.signer.sign(id, Duration::hours(self.share_link_hours))
    }

    pub fn share_link_hours(&self) -> i64 {
        self.share_link_hours
    }

    /// Resolves a share link without a session.
    pub async fn shared_file(&self, token: &str) -> Result<(MediaItem, PathBuf), AppError> {
        let id = self.signer.verify(token)?;
        self.file(&id).await
    }
}

pub fn validate_title(title: &str) -> Result<&str, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::Validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title("  Logo  ").unwrap(), "Logo");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(201)).is_err());
    }
}
