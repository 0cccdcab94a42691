//! Object key and content type helpers.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPrefix {
    Videos,
    Thumbnails,
}

impl KeyPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyPrefix::Videos => "videos",
            KeyPrefix::Thumbnails => "thumbnails",
        }
    }
}

/// `.mp4` for `/tmp/a.mp4`, empty when there is no extension.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// `{prefix}/{record_id}{ext}`. Deterministic, so redelivered jobs overwrite the same object.
pub fn media_key(prefix: KeyPrefix, record_id: &str, source: &Path) -> String {
    format!("{}/{}{}", prefix.as_str(), record_id, extension_of(source))
}

pub fn attachment_key(folder: &str, unix_millis: i128, filename: &str) -> String {
    format!("clubs/{}/{}_{}", folder, unix_millis, filename)
}

/// Extensions uploaded with their own content type; anything else is an opaque blob.
const MEDIA_EXTENSIONS: [&str; 6] = ["mp4", "mov", "mkv", "png", "jpg", "jpeg"];
const OCTET_STREAM: &str = "application/octet-stream";

pub fn content_type_for(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if !MEDIA_EXTENSIONS.contains(&ext.as_str()) {
        return OCTET_STREAM.to_string();
    }
    mime_guess::from_ext(&ext)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
