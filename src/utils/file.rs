use std::path::Path;
use uuid::Uuid;

use crate::models::MediaKind;

/// Per-owner namespace inside the blob store.
pub fn owner_container_name(owner_id: Uuid) -> String {
    format!("user-{}", owner_id.to_string().to_lowercase())
}

/// Random blob name that keeps the original extension, lowercased.
pub fn generate_blob_name(original_filename: &str) -> String {
    match file_extension(original_filename) {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    }
}

pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_lowercase())
}

/// Strips directory components so a client supplied name can't escape its container.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        "upload".to_string()
    } else {
        name.to_string()
    }
}

pub fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

pub fn kind_for_content_type(content_type: &str) -> MediaKind {
    if content_type.starts_with("image/") {
        MediaKind::Photo
    } else if content_type.starts_with("video/") {
        MediaKind::Video
    } else {
        MediaKind::Other
    }
}
