use crate::error::AppError;

/// MIME type for an uploaded file, decided by its extension. Only the
/// extensions listed here are accepted by the media library and ticket
/// attachments.
pub fn get_mime_type_from_filename(filename: &str) -> Result<&'static str, AppError> {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "gif" => Ok("image/gif"),
        "webp" => Ok("image/webp"),
        "pdf" => Ok("application/pdf"),
        "txt" => Ok("text/plain"),
        "csv" => Ok("text/csv"),
        "doc" => Ok("application/msword"),
        "docx" => Ok("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        "xls" => Ok("application/vnd.ms-excel"),
        "xlsx" => Ok("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        "zip" => Ok("application/zip"),
        "" => Err(AppError::Validation(format!("{} has no file extension", display_name(filename)))),
        _ => Err(AppError::Validation(format!(
            "Files of type .{} are not allowed",
            extension
        ))),
    }
}

/// Extension stored with the generated file name.
pub fn extension_for(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default()
}

/// Whether browsers may render the type inline rather than download it.
pub fn is_inline_safe(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "image/png" | "image/jpeg" | "image/gif" | "image/webp" | "application/pdf" | "text/plain"
    )
}

/// Client-supplied file name without any directory part, for display and
/// the download Content-Disposition.
pub fn display_name(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename).trim();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).take(200).collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extensions() {
        assert_eq!(get_mime_type_from_filename("Logo.PNG").unwrap(), "image/png");
        assert_eq!(get_mime_type_from_filename("contract.pdf").unwrap(), "application/pdf");
        assert!(get_mime_type_from_filename("script.exe").is_err());
        assert!(get_mime_type_from_filename("README").is_err());
        assert!(get_mime_type_from_filename("image.svg").is_err());
    }

    #[test]
    fn test_display_name_strips_directories() {
        assert_eq!(display_name("C:\\Users\\me\\report.pdf"), "report.pdf");
        assert_eq!(display_name("../../etc/passwd"), "passwd");
        assert_eq!(display_name("   "), "file");
    }

    #[test]
    fn test_inline_safe() {
        assert!(is_inline_safe("image/png"));
        assert!(!is_inline_safe("application/zip"));
    }
}
