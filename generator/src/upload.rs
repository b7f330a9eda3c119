use crate::models::DocumentKind;
use thiserror::Error;

pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;
pub const ACCEPTED_MIME_TYPES: &[&str] = &["application/xml", "text/xml"];

/// Reasons an uploaded file is rejected before schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("File must have a .xml extension: {0}")]
    Extension(String),

    #[error("File is {size} bytes, larger than the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("Unsupported content type {0}, expected application/xml or text/xml")]
    MimeType(String),

    #[error("File does not contain a <{0}> element")]
    MissingRoot(&'static str),
}

/// Cheap checks on an uploaded document. Passing them says nothing about schema validity.
pub fn check_upload(
    filename: &str,
    mime_type: Option<&str>,
    content: &str,
    kind: DocumentKind,
) -> Result<(), UploadError> {
    if !filename.trim().to_ascii_lowercase().ends_with(".xml") {
        return Err(UploadError::Extension(filename.to_string()));
    }

    if content.len() > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge {
            size: content.len(),
            limit: MAX_UPLOAD_BYTES,
        });
    }

    // parameters such as "; charset=utf-8" are ignored
    if let Some(mime) = mime_type.map(str::trim).filter(|m| !m.is_empty()) {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        if !ACCEPTED_MIME_TYPES.contains(&essence.as_str()) {
            return Err(UploadError::MimeType(mime.to_string()));
        }
    }

    let root = kind.root_tag();
    if !content.contains(&format!("<{}", root)) {
        return Err(UploadError::MissingRoot(root));
    }

    Ok(())
}
