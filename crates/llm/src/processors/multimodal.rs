//! Multimodal processor (spec.md §4.2): dialect content items → upstream
//! `parts[]`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::upstream::{InlineData, Part};

/// 20 MB, the accepted decoded image size ceiling (spec.md §4.2, §8).
const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// A dialect-neutral content item, built by each transformer's encode step.
#[derive(Debug, Clone)]
pub enum ContentItem {
    /// Plain text.
    Text(String),
    /// An inline base64 image with its declared MIME type.
    InlineImage {
        /// The declared (possibly loosely-cased/aliased) MIME type.
        media_type: String,
        /// Base64 data, possibly still carrying a `data:...;base64,` prefix.
        data: String,
    },
    /// An `http(s)://` image URL (unsupported, spec.md §4.2).
    RemoteImage {
        /// The URL, for the resulting error message.
        url: String,
    },
}

/// Translate one content item into an upstream part. Per-item failures
/// degrade to a text placeholder rather than failing the whole request
/// (spec.md §4.2, §8 scenario 6).
pub fn process(item: &ContentItem) -> Part {
    match item {
        ContentItem::Text(text) => Part::text(text.clone()),
        ContentItem::InlineImage { media_type, data } => match process_image(media_type, data) {
            Ok(inline) => Part {
                text: None,
                thought: None,
                inline_data: Some(inline),
                function_call: None,
                function_response: None,
            },
            Err(message) => Part::text(format!("[Image processing failed: {message}]")),
        },
        ContentItem::RemoteImage { url } => {
            Part::text(format!("[Image processing failed: remote image URLs are not supported ({url})]"))
        }
    }
}

fn process_image(media_type: &str, data: &str) -> Result<InlineData, String> {
    let mime_type = normalize_mime(media_type);

    let stripped = data
        .split_once(";base64,")
        .map(|(_, rest)| rest)
        .unwrap_or(data)
        .trim();

    if stripped.is_empty() {
        return Err("empty image data".to_string());
    }

    BASE64
        .decode(stripped)
        .map_err(|e| format!("invalid base64 image data: {e}"))?;

    let estimated_bytes = (stripped.len() as f64 * 0.75) as usize;
    if estimated_bytes > MAX_IMAGE_BYTES {
        return Err(format!("image exceeds 20MB limit ({estimated_bytes} bytes estimated)"));
    }

    Ok(InlineData { mime_type, data: stripped.to_string() })
}

/// Normalize a client-supplied MIME type (spec.md §4.2: "case-insensitive,
/// `jpg`→`jpeg`, `x-png`→`png`, unknown → `image/jpeg`").
fn normalize_mime(media_type: &str) -> String {
    let lower = media_type.to_ascii_lowercase();
    let subtype = lower.strip_prefix("image/").unwrap_or(&lower);

    let normalized = match subtype {
        "jpg" => "jpeg",
        "x-png" => "png",
        "jpeg" | "png" | "gif" | "webp" | "heic" | "heif" => subtype,
        _ => "jpeg",
    };

    format!("image/{normalized}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_passes_through() {
        let part = process(&ContentItem::Text("hi".to_string()));
        assert_eq!(part.text.as_deref(), Some("hi"));
    }

    #[test]
    fn normalizes_jpg_alias() {
        assert_eq!(normalize_mime("image/JPG"), "image/jpeg");
        assert_eq!(normalize_mime("x-png"), "image/png");
        assert_eq!(normalize_mime("image/bmp"), "image/jpeg");
    }

    #[test]
    fn strips_data_url_prefix() {
        let data = format!("data:image/png;base64,{}", BASE64.encode(b"hello world"));
        let part = process(&ContentItem::InlineImage { media_type: "image/png".to_string(), data });
        assert!(part.inline_data.is_some());
    }

    #[test]
    fn oversized_image_degrades_to_text_placeholder() {
        let huge = BASE64.encode(vec![0u8; MAX_IMAGE_BYTES + 1024]);
        let part = process(&ContentItem::InlineImage { media_type: "image/png".to_string(), data: huge });
        assert!(part.inline_data.is_none());
        assert!(part.text.unwrap().contains("exceeds 20MB"));
    }

    #[test]
    fn remote_image_degrades_to_text_placeholder() {
        let part = process(&ContentItem::RemoteImage { url: "https://example.com/cat.png".to_string() });
        assert!(part.text.unwrap().contains("not supported"));
    }
}
