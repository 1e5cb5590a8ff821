use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::AppError;
use crate::utils::mime_utils::{extension_for, get_mime_type_from_filename};
use crate::utils::multipart_utils::UploadedFile;

/// A file moved into the upload directory.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub stored_name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
}

/// Upload directory shared by the media library and ticket attachments.
/// Files are stored under generated names; the client-supplied name is only
/// kept in the database.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn ensure_root(&self) -> Result<(), AppError> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            AppError::Configuration(format!("Cannot create upload directory {}: {}", self.root.display(), e))
        })
    }

    /// Checks the file type against the allow-list and moves the spooled
    /// file into place.
    pub fn store(&self, upload: UploadedFile) -> Result<StoredFile, AppError> {
        let mime_type = get_mime_type_from_filename(&upload.original_name)?;
        let stored_name = format!("{}.{}", Uuid::new_v4().simple(), extension_for(&upload.original_name));
        let target = self.root.join(&stored_name);

        if let Err(persist_error) = upload.temp_file.persist_noclobber(&target) {
            // The temp dir may sit on another filesystem; fall back to a copy.
            log::debug!("persist failed ({}), copying upload instead", persist_error.error);
            std::fs::copy(persist_error.file.path(), &target)?;
        }

        log::info!(
            "Stored upload {} as {} ({} bytes)",
            upload.original_name,
            stored_name,
            upload.size_bytes
        );

        Ok(StoredFile {
            stored_name,
            original_name: upload.original_name,
            mime_type: mime_type.to_string(),
            size_bytes: upload.size_bytes,
            checksum_sha256: upload.checksum_sha256,
        })
    }

    /// Path of a stored file. Names that could escape the directory are
    /// rejected.
    pub fn path_for(&self, stored_name: &str) -> Result<PathBuf, AppError> {
        let valid = !stored_name.is_empty()
            && stored_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
            && !stored_name.starts_with('.');
        if !valid {
            return Err(AppError::NotFound("File not found".to_string()));
        }
        Ok(self.root.join(stored_name))
    }

    /// Removes a stored file; a file already gone only logs a warning.
    pub fn remove(&self, stored_name: &str) {
        match self.path_for(stored_name) {
            Ok(path) => {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::warn!("Could not remove stored file {}: {}", path.display(), e);
                }
            }
            Err(_) => log::warn!("Refusing to remove suspicious stored name {}", stored_name),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn upload(name: &str, contents: &[u8]) -> UploadedFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents).unwrap();
        UploadedFile {
            field_name: "file".to_string(),
            original_name: name.to_string(),
            size_bytes: contents.len() as i64,
            checksum_sha256: hex::encode(Sha256::digest(contents)),
            temp_file,
        }
    }

    #[test]
    fn test_store_moves_file_under_generated_name() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        let stored = storage.store(upload("Quarterly Report.pdf", b"%PDF-1.4")).unwrap();

        assert_eq!(stored.mime_type, "application/pdf");
        assert!(stored.stored_name.ends_with(".pdf"));
        assert_ne!(stored.stored_name, "Quarterly Report.pdf");
        let path = storage.path_for(&stored.stored_name).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn test_store_rejects_disallowed_type() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        let result = storage.store(upload("payload.exe", b"MZ"));
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_path_for_rejects_traversal() {
        let storage = FileStorage::new("/srv/uploads");
        assert!(storage.path_for("../secrets.txt").is_err());
        assert!(storage.path_for("a/b.png").is_err());
        assert!(storage.path_for(".env").is_err());
        assert!(storage.path_for("0f3c.png").is_ok());
    }

    #[test]
    fn test_remove_deletes_file() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        let stored = storage.store(upload("notes.txt", b"hello")).unwrap();
        storage.remove(&stored.stored_name);
        assert!(!storage.root().join(&stored.stored_name).exists());
    }
}
