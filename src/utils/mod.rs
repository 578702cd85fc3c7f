use image::ImageFormat;

use crate::common::{DEFAULT_MEDIA_TYPE, VALID_IMAGE_EXTENSIONS};

/// Strips parameters (`; charset=...`) and lowercases a media type.
pub fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Guesses the media type of raw image bytes from their magic number.
pub fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

/// File extension used when an image of this media type is written out.
pub fn extension_for(media_type: &str) -> &'static str {
    ImageFormat::from_mime_type(essence(media_type))
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}

pub fn is_image_media_type(media_type: &str) -> bool {
    let essence = essence(media_type);
    if !essence.starts_with("image/") {
        return false;
    }
    VALID_IMAGE_EXTENSIONS.contains(&extension_for(&essence))
}

/// Keeps the declared media type when `image` knows it, otherwise sniffs the
/// bytes. Browsers send aliases such as `image/jpg` or `image/pjpeg`.
pub fn resolve_media_type(declared: Option<&str>, bytes: &[u8]) -> String {
    let declared = declared.map(essence).filter(|declared| !declared.is_empty());
    if let Some(declared) = &declared {
        if ImageFormat::from_mime_type(declared).is_some() {
            return declared.clone();
        }
    }
    match sniff_media_type(bytes) {
        Some(sniffed) => sniffed.to_string(),
        None => declared.unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string()),
    }
}
