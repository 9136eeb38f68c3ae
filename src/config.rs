use std::env;
use std::path::PathBuf;
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::warn;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_image_model: String,
    pub gemini_chat_model: String,
    pub gemini_temperature: f32,
    pub gemini_top_k: i32,
    pub gemini_top_p: f32,
    pub gemini_max_output_tokens: i32,
    pub gemini_safety_settings: String,
    pub poster_aspect_ratio: String,
    pub poster_image_size: String,
    pub output_dir: PathBuf,
    pub request_timeout_seconds: u64,
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::load);

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

/// Prefers `GEMINI_API_KEY`, then the bare `API_KEY` the hosted studio injects.
fn resolve_api_key() -> String {
    let primary = env_string("GEMINI_API_KEY", "");
    if !primary.trim().is_empty() {
        return primary.trim().to_string();
    }
    env_string("API_KEY", "").trim().to_string()
}

pub fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "permissive".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to permissive.",
                value
            );
            "permissive".to_string()
        }
    }
}

fn normalize_base_url(value: String) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_GEMINI_BASE_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

impl Config {
    pub fn load() -> Self {
        Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(env_string("LOG_DIR", "logs")),
            gemini_api_key: resolve_api_key(),
            gemini_base_url: normalize_base_url(env_string(
                "GEMINI_BASE_URL",
                DEFAULT_GEMINI_BASE_URL,
            )),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-3-pro-image-preview"),
            gemini_chat_model: env_string("GEMINI_CHAT_MODEL", "gemini-3-pro-preview"),
            gemini_temperature: env_f32("GEMINI_TEMPERATURE", 0.7),
            gemini_top_k: env_i32("GEMINI_TOP_K", 40),
            gemini_top_p: env_f32("GEMINI_TOP_P", 0.95),
            gemini_max_output_tokens: env_i32("GEMINI_MAX_OUTPUT_TOKENS", 2048),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "permissive",
            )),
            poster_aspect_ratio: env_string("POSTER_ASPECT_RATIO", "3:4"),
            poster_image_size: env_string("POSTER_IMAGE_SIZE", "4K"),
            output_dir: PathBuf::from(env_string("OUTPUT_DIR", "output")),
            request_timeout_seconds: env_u64("REQUEST_TIMEOUT_SECONDS", 180).max(1),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

pub const CHAT_SYSTEM_PROMPT: &str =
    "Bạn là trợ lý \"Nam Vui Designer\", chuyên thiết kế poster ca nhạc rèm đỏ chuyên nghiệp.";

pub const CHAT_GREETING: &str = "Chào bạn! Tôi là trợ lý Sân Khấu Vàng. Tôi có thể giúp gì cho bạn trong việc tạo poster hoặc chuẩn bị cho đêm diễn không?";

pub const CHAT_FALLBACK_REPLY: &str =
    "Rất tiếc, tôi đang gặp lỗi kết nối. Bạn vui lòng thử lại sau nhé!";

pub const API_KEY_PROMPT: &str =
    "Vui lòng chọn API Key trả phí để sử dụng Nano Banana Pro (đặt biến môi trường GEMINI_API_KEY).";
