use actix_multipart::Multipart;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::io::Write;
use tempfile::NamedTempFile;

use crate::error::AppError;
use crate::utils::form::FormFields;
use crate::utils::mime_utils::display_name;

/// A file part spooled to a temporary file while it was read.
pub struct UploadedFile {
    pub field_name: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
    pub temp_file: NamedTempFile,
}

/// Text fields and file parts of a multipart form.
pub struct UploadForm {
    pub fields: FormFields,
    pub files: Vec<UploadedFile>,
}

impl UploadForm {
    pub fn take_files(&mut self, field_name: &str) -> Vec<UploadedFile> {
        let list_name = format!("{}[]", field_name);
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|f| f.field_name == field_name || f.field_name == list_name);
        self.files = rest;
        matching
    }
}

const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

/// Ceilings applied while a multipart body streams in.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    pub max_files: usize,
}

/// Reads a multipart body. File parts stream into temporary files with a
/// running SHA-256. `authorize` sees the text fields read so far and runs
/// once, before the first file part is spooled (or at the end when the form
/// carries no file), so the CSRF field must precede any file input.
/// File inputs left empty by the browser are skipped.
pub async fn read_upload_form<F>(mut payload: Multipart, limits: UploadLimits, authorize: F) -> Result<UploadForm, AppError>
where
    F: FnOnce(&FormFields) -> Result<(), AppError>,
{
    let mut fields = FormFields::default();
    let mut files = Vec::new();
    let mut authorize = Some(authorize);
    let mut total: u64 = 0;

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let content_disposition = field
            .content_disposition()
            .ok_or_else(|| AppError::BadRequest("Content-Disposition header missing".to_string()))?;
        let field_name = content_disposition
            .get_name()
            .ok_or_else(|| AppError::BadRequest("Field name missing".to_string()))?
            .to_string();

        match content_disposition.get_filename().map(str::to_string) {
            Some(filename) => {
                if let Some(check) = authorize.take() {
                    check(&fields)?;
                }
                if files.len() >= limits.max_files && !filename.trim().is_empty() {
                    return Err(too_many_files(limits.max_files));
                }

                let mut temp_file = NamedTempFile::new()?;
                let mut hasher = Sha256::new();
                let mut size: u64 = 0;

                while let Some(chunk) = field.next().await {
                    let chunk = chunk?;
                    size += chunk.len() as u64;
                    total += chunk.len() as u64;
                    if size > limits.max_file_bytes {
                        return Err(AppError::PayloadTooLarge(format!(
                            "{} is larger than the {} MB limit",
                            display_name(&filename),
                            limits.max_file_bytes / (1024 * 1024)
                        )));
                    }
                    if total > limits.max_total_bytes {
                        return Err(AppError::PayloadTooLarge(format!(
                            "Uploads together exceed the {} MB limit",
                            limits.max_total_bytes / (1024 * 1024)
                        )));
                    }
                    hasher.update(&chunk);
                    temp_file.write_all(&chunk)?;
                }

                if filename.trim().is_empty() && size == 0 {
                    continue;
                }
                if size == 0 {
                    return Err(AppError::Validation(format!("{} is empty", display_name(&filename))));
                }
                temp_file.flush()?;

                files.push(UploadedFile {
                    field_name,
                    original_name: display_name(&filename),
                    size_bytes: size as i64,
                    checksum_sha256: hex::encode(hasher.finalize()),
                    temp_file,
                });
            }
            None => {
                let mut data = Vec::new();
                while let Some(chunk) = field.next().await {
                    data.extend_from_slice(&chunk?);
                    if data.len() > MAX_TEXT_FIELD_BYTES {
                        return Err(AppError::PayloadTooLarge(format!("Field {} is too long", field_name)));
                    }
                }
                let value = String::from_utf8(data)
                    .map_err(|_| AppError::BadRequest(format!("Invalid encoding in field {}", field_name)))?;
                fields.push(field_name, value);
            }
        }
    }

    if let Some(check) = authorize.take() {
        check(&fields)?;
    }
    Ok(UploadForm { fields, files })
}

fn too_many_files(max_files: usize) -> AppError {
    match max_files {
        0 => AppError::Validation("File uploads are turned off".to_string()),
        1 => AppError::Validation("Only one file can be uploaded at a time".to_string()),
        n => AppError::Validation(format!("At most {} files per upload", n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::{self, HeaderMap, HeaderValue};
    use actix_web::web::Bytes;
    use std::cell::Cell;

    const BOUNDARY: &str = "portal-boundary";

    fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> Multipart {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&format!("multipart/form-data; boundary={}", BOUNDARY)).unwrap(),
        );
        let stream = futures_util::stream::once(async move { Ok::<_, actix_web::error::PayloadError>(Bytes::from(body)) });
        Multipart::new(&headers, stream)
    }

    fn limits() -> UploadLimits {
        UploadLimits {
            max_file_bytes: 1024,
            max_total_bytes: 1536,
            max_files: 2,
        }
    }

    fn allow(_: &FormFields) -> Result<(), AppError> {
        Ok(())
    }

    #[actix_web::test]
    async fn test_reads_fields_and_files() {
        let payload = multipart(&[
            ("_csrf", None, b"token"),
            ("subject", None, b"Printer"),
            ("attachments[]", Some("notes.txt"), b"hello"),
        ]);
        let mut form = read_upload_form(payload, limits(), allow).await.unwrap();
        assert_eq!(form.fields.raw("subject"), Some("Printer"));
        let files = form.take_files("attachments");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].original_name, "notes.txt");
        assert_eq!(files[0].size_bytes, 5);
    }

    #[actix_web::test]
    async fn test_authorize_runs_before_first_file() {
        let payload = multipart(&[("attachments[]", Some("a.txt"), b"data"), ("_csrf", None, b"token")]);
        let seen_token = Cell::new(None);
        let result = read_upload_form(payload, limits(), |fields: &FormFields| {
            seen_token.set(Some(fields.raw("_csrf").is_some()));
            Err(AppError::Forbidden("token missing".to_string()))
        })
        .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert_eq!(seen_token.get(), Some(false));
    }

    #[actix_web::test]
    async fn test_authorize_runs_without_files() {
        let payload = multipart(&[("_csrf", None, b"token")]);
        let calls = Cell::new(0);
        read_upload_form(payload, limits(), |_: &FormFields| {
            calls.set(calls.get() + 1);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[actix_web::test]
    async fn test_empty_named_file_is_rejected() {
        let payload = multipart(&[("_csrf", None, b"token"), ("attachments[]", Some("blank.txt"), b"")]);
        let result = read_upload_form(payload, limits(), allow).await;
        assert!(matches!(result, Err(AppError::Validation(message)) if message.contains("blank.txt")));
    }

    #[actix_web::test]
    async fn test_unnamed_empty_file_input_is_skipped() {
        let payload = multipart(&[("_csrf", None, b"token"), ("attachments[]", Some(""), b"")]);
        let form = read_upload_form(payload, limits(), allow).await.unwrap();
        assert!(form.files.is_empty());
    }

    #[actix_web::test]
    async fn test_file_count_limit() {
        let payload = multipart(&[
            ("attachments[]", Some("a.txt"), b"a"),
            ("attachments[]", Some("b.txt"), b"b"),
            ("attachments[]", Some("c.txt"), b"c"),
        ]);
        let result = read_upload_form(payload, limits(), allow).await;
        assert!(matches!(result, Err(AppError::Validation(message)) if message.contains("At most 2")));
    }

    #[actix_web::test]
    async fn test_single_file_limit() {
        let big = vec![b'x'; 1025];
        let payload = multipart(&[("file", Some("big.bin"), &big)]);
        let result = read_upload_form(payload, limits(), allow).await;
        assert!(matches!(result, Err(AppError::PayloadTooLarge(_))));
    }

    #[actix_web::test]
    async fn test_total_size_limit() {
        let part = vec![b'x'; 1000];
        let payload = multipart(&[("attachments[]", Some("a.bin"), &part), ("attachments[]", Some("b.bin"), &part)]);
        let result = read_upload_form(payload, limits(), allow).await;
        assert!(matches!(result, Err(AppError::PayloadTooLarge(message)) if message.contains("together")));
    }
}
