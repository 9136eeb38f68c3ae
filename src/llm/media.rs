use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;

static DATA_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^data:(?P<mime>[\w.+-]+/[\w.+-]+)?(?:;[\w-]+=[^;,]*)*;base64,(?P<data>.*)$")
        .expect("valid data url regex")
});

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        _ => lowered,
    }
}

pub fn gemini_supports_image_mime(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "image/png" | "image/jpeg" | "image/webp" | "image/heic" | "image/heif"
    )
}

/// Picks the MIME type sent to Gemini: the declared one when supported,
/// then the sniffed one, then `image/png`.
pub fn gemini_image_mime(declared: &str, bytes: &[u8]) -> String {
    let mut candidates = Vec::new();
    if !declared.trim().is_empty() {
        candidates.push(declared.to_string());
    }
    if let Some(detected) = detect_mime_type(bytes) {
        candidates.push(detected);
    }

    candidates
        .into_iter()
        .map(|candidate| normalize_image_mime_type(&candidate))
        .find(|candidate| gemini_supports_image_mime(candidate))
        .unwrap_or_else(|| "image/png".to_string())
}

pub fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

pub fn decode_base64(data: &str) -> Option<Vec<u8>> {
    let cleaned: String = data.chars().filter(|ch| !ch.is_whitespace()).collect();
    general_purpose::STANDARD.decode(cleaned).ok()
}

pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, encode_base64(bytes))
}

/// Splits a `data:` URL into its declared MIME type and decoded payload.
pub fn parse_data_url(value: &str) -> Option<(Option<String>, Vec<u8>)> {
    let captures = DATA_URL_RE.captures(value.trim())?;
    let mime_type = captures
        .name("mime")
        .map(|mime| normalize_image_mime_type(mime.as_str()));
    let bytes = decode_base64(captures.name("data")?.as_str())?;
    Some((mime_type, bytes))
}

pub fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}
