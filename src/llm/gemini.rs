use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::{decode_base64, encode_base64, gemini_image_mime, to_data_url, truncate_for_log};
use crate::poster::types::{ChatMessage, ChatRole, PortraitImage};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

/// Provider message that means the selected key cannot reach the model.
pub const ENTITY_NOT_FOUND_MARKER: &str = "entity was not found";

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("Chưa cấu hình API key cho Gemini")]
    MissingApiKey,
    #[error("Không kết nối được tới Gemini: {0}")]
    Transport(String),
    #[error("Gemini trả về lỗi {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Không thể tạo được ảnh poster. (model: {model}, detail: {detail})")]
    NoImage { model: String, detail: String },
    #[error("Gemini không trả lời (model: {model})")]
    EmptyReply { model: String },
    #[error("Không đọc được phản hồi của Gemini: {0}")]
    Decode(String),
}

impl GeminiError {
    /// True when the user has to pick or fix an API key before retrying.
    pub fn requires_api_key(&self) -> bool {
        match self {
            GeminiError::MissingApiKey => true,
            GeminiError::Api { message, .. } | GeminiError::Transport(message) => message
                .to_ascii_lowercase()
                .contains(ENTITY_NOT_FOUND_MARKER),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub base_url: String,
    pub image_model: String,
    pub chat_model: String,
    pub temperature: f32,
    pub top_k: i32,
    pub top_p: f32,
    pub max_output_tokens: i32,
    pub safety_settings: String,
    pub request_timeout: Duration,
    pub retry_base_delay: Duration,
}

impl GeminiSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_base_url.clone(),
            image_model: config.gemini_image_model.clone(),
            chat_model: config.gemini_chat_model.clone(),
            temperature: config.gemini_temperature,
            top_k: config.gemini_top_k,
            top_p: config.gemini_top_p,
            max_output_tokens: config.gemini_max_output_tokens,
            safety_settings: config.gemini_safety_settings.clone(),
            request_timeout: config.request_timeout(),
            retry_base_delay: Duration::from_millis(GEMINI_RETRY_BASE_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOptions {
    pub aspect_ratio: Option<String>,
    pub image_size: Option<String>,
}

impl ImageOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            aspect_ratio: Some(config.poster_aspect_ratio.clone()),
            image_size: Some(config.poster_image_size.clone()),
        }
    }
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            aspect_ratio: Some("3:4".to_string()),
            image_size: Some("4K".to_string()),
        }
    }
}

/// First inline image returned by the model.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl std::fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl GeneratedImage {
    pub fn data_url(&self) -> String {
        to_data_url(&self.mime_type, &self.bytes)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    #[allow(dead_code)]
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

const GEMINI_MAX_RETRY_ATTEMPTS: usize = 2;
const GEMINI_RETRY_BASE_DELAY_MS: u64 = 900;

fn gemini_should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn gemini_should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        "permissive" => "OFF",
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}', using permissive defaults.",
                profile
            );
            "OFF"
        }
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_CIVIC_INTEGRITY", "threshold": threshold }),
    ]
}

fn build_image_config(options: &ImageOptions) -> Option<Value> {
    let mut map = Map::new();

    if let Some(aspect_ratio) = options.aspect_ratio.as_deref() {
        let trimmed = aspect_ratio.trim();
        if !trimmed.is_empty() {
            map.insert("aspectRatio".to_string(), json!(trimmed));
        }
    }

    if let Some(image_size) = options.image_size.as_deref() {
        let trimmed = image_size.trim();
        if !trimmed.is_empty() {
            map.insert("imageSize".to_string(), json!(trimmed));
        }
    }

    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}

fn role_label(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::Model => "model",
    }
}

fn build_chat_contents(history: &[ChatMessage]) -> Vec<Value> {
    history
        .iter()
        .map(|message| {
            json!({
                "role": role_label(message.role),
                "parts": [{ "text": message.text }]
            })
        })
        .collect()
}

fn summarize_gemini_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_gemini_payload(payload: &Value, system_prompt_label: Option<&str>) -> Value {
    let mut summary = Map::new();

    if payload.pointer("/systemInstruction").is_some() {
        let label = system_prompt_label.unwrap_or("inline_system_prompt");
        summary.insert(
            "systemInstruction".to_string(),
            Value::String(label.to_string()),
        );
    }

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let summarized_contents: Vec<Value> = contents
            .iter()
            .map(|content| {
                let role = content
                    .get("role")
                    .and_then(|value| value.as_str())
                    .unwrap_or("user");
                let parts = content
                    .get("parts")
                    .and_then(|value| value.as_array())
                    .map(|parts| summarize_gemini_parts(parts))
                    .unwrap_or_default();
                json!({ "role": role, "parts": parts })
            })
            .collect();
        summary.insert("contents".to_string(), Value::Array(summarized_contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    if let Some(safety) = payload
        .get("safetySettings")
        .and_then(|value| value.as_array())
    {
        summary.insert("safetySettingsCount".to_string(), json!(safety.len()));
    }

    Value::Object(summary)
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    for part in response_parts(response) {
        match part {
            GeminiPart::Text { text } => {
                text_parts += 1;
                if text_preview.is_none() && !text.trim().is_empty() {
                    text_preview = Some(truncate_for_log(text, 200));
                }
            }
            GeminiPart::InlineData { inline_data } => {
                if inline_data.mime_type.starts_with("image/") {
                    image_parts += 1;
                }
            }
            GeminiPart::Other(_) => {}
        }
    }

    json!({
        "candidates": response.candidates.as_ref().map(|candidates| candidates.len()).unwrap_or(0),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn response_parts(response: &GeminiResponse) -> impl Iterator<Item = &GeminiPart> {
    response
        .candidates
        .iter()
        .flatten()
        .filter_map(|candidate| candidate.content.as_ref())
        .filter_map(|content| content.parts.as_ref())
        .flatten()
}

fn extract_text_from_response(response: &GeminiResponse) -> String {
    response_parts(response)
        .filter_map(|part| match part {
            GeminiPart::Text { text } if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_first_image(response: &GeminiResponse) -> Option<GeneratedImage> {
    response_parts(response).find_map(|part| match part {
        GeminiPart::InlineData { inline_data } if inline_data.mime_type.starts_with("image/") => {
            decode_base64(&inline_data.data).map(|bytes| GeneratedImage {
                bytes,
                mime_type: inline_data.mime_type.clone(),
            })
        }
        _ => None,
    })
}

/// Why a response carried no image, for the error shown to the user.
fn missing_image_detail(response: &GeminiResponse) -> String {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return format!("blocked: {reason}");
    }
    let finish_reason = response
        .candidates
        .iter()
        .flatten()
        .find_map(|candidate| candidate.finish_reason.as_deref());
    let text = extract_text_from_response(response);
    match (finish_reason, text.trim().is_empty()) {
        (Some(reason), true) => format!("finish reason {reason}"),
        (Some(reason), false) => format!("finish reason {reason}: {}", truncate_for_log(&text, 200)),
        (None, false) => truncate_for_log(&text, 200),
        (None, true) => "no image parts".to_string(),
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    settings: GeminiSettings,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Self {
        Self {
            http: get_http_client().clone(),
            settings,
        }
    }

    fn redact(&self, text: &str) -> String {
        let key = self.settings.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    fn retry_delay(&self, attempt: usize) -> Duration {
        let attempt = attempt.max(1) as u32;
        self.settings.retry_base_delay.saturating_mul(attempt)
    }

    async fn call_gemini_api(
        &self,
        model: &str,
        payload: &Value,
        system_prompt_label: Option<&str>,
    ) -> Result<GeminiResponse, GeminiError> {
        if self.settings.api_key.trim().is_empty() {
            return Err(GeminiError::MissingApiKey);
        }

        let url = format!(
            "{}/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            model
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(payload, system_prompt_label);
            debug!(target: "llm.gemini", model = model, payload = %payload_summary);
        }

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match self
                .http
                .post(&url)
                .timeout(self.settings.request_timeout)
                .header("x-goog-api-key", self.settings.api_key.trim())
                .json(payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let err_text = self.redact(&err.to_string());
                    let should_retry =
                        gemini_should_retry_error(&err) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
                    warn!(
                        "Gemini request failed to send: {} (timeout={}, connect={}, retrying={})",
                        err_text,
                        err.is_timeout(),
                        err.is_connect(),
                        should_retry
                    );
                    if should_retry {
                        tokio::time::sleep(self.retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(GeminiError::Transport(err_text));
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|err| GeminiError::Transport(self.redact(&err.to_string())))?;

            if !status.is_success() {
                let (message, body_summary) = summarize_error_body(&body);
                let should_retry =
                    gemini_should_retry_status(status) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
                warn!(
                    "Gemini API error: status={}, body={}, retrying={}",
                    status,
                    self.redact(&body_summary),
                    should_retry
                );
                if should_retry {
                    tokio::time::sleep(self.retry_delay(attempt)).await;
                    continue;
                }
                return Err(GeminiError::Api {
                    status: status.as_u16(),
                    message: self.redact(&message.unwrap_or(body_summary)),
                });
            }

            let value = serde_json::from_str::<GeminiResponse>(&body)
                .map_err(|err| GeminiError::Decode(err.to_string()))?;
            if tracing::enabled!(tracing::Level::DEBUG) {
                let response_summary = summarize_gemini_response(&value);
                debug!(target: "llm.gemini", model = model, response = %response_summary);
            }
            return Ok(value);
        }
    }

    /// Sends the portrait and the art-direction prompt to the image model.
    pub async fn generate_image(
        &self,
        prompt: &str,
        portrait: &PortraitImage,
        options: &ImageOptions,
    ) -> Result<GeneratedImage, GeminiError> {
        let mime_type = gemini_image_mime(&portrait.mime_type, &portrait.bytes);
        let parts = vec![
            json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": encode_base64(&portrait.bytes)
                }
            }),
            json!({ "text": prompt }),
        ];

        let mut generation_config = json!({
            "responseModalities": ["TEXT", "IMAGE"]
        });
        if let Some(image_config) = build_image_config(options) {
            if let Some(config_object) = generation_config.as_object_mut() {
                config_object.insert("imageConfig".to_string(), image_config);
            }
        }

        let payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
            "safetySettings": build_safety_settings(&self.settings.safety_settings),
        });

        let model = self.settings.image_model.as_str();
        let metadata = json!({ "promptChars": prompt.chars().count(), "portraitBytes": portrait.bytes.len() });
        log_llm_timing("gemini", model, "generate_poster", Some(metadata), || async {
            let response = self.call_gemini_api(model, &payload, None).await?;
            extract_first_image(&response).ok_or_else(|| GeminiError::NoImage {
                model: model.to_string(),
                detail: missing_image_detail(&response),
            })
        })
        .await
    }

    /// One chat turn. `history` must end with the user message being answered.
    pub async fn generate_text(
        &self,
        system_instruction: &str,
        history: &[ChatMessage],
    ) -> Result<String, GeminiError> {
        let payload = json!({
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
            "contents": build_chat_contents(history),
            "generationConfig": {
                "temperature": self.settings.temperature,
                "topK": self.settings.top_k,
                "topP": self.settings.top_p,
                "maxOutputTokens": self.settings.max_output_tokens,
            },
            "safetySettings": build_safety_settings(&self.settings.safety_settings),
        });

        let model = self.settings.chat_model.as_str();
        log_llm_timing("gemini", model, "chat", None, || async {
            let response = self
                .call_gemini_api(model, &payload, Some("chat_system_prompt"))
                .await?;
            let text = extract_text_from_response(&response);
            if text.trim().is_empty() {
                return Err(GeminiError::EmptyReply {
                    model: model.to_string(),
                });
            }
            Ok(text)
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn test_settings(base_url: &str) -> GeminiSettings {
        GeminiSettings {
            api_key: "test-key".to_string(),
            base_url: base_url.to_string(),
            image_model: "image-model".to_string(),
            chat_model: "chat-model".to_string(),
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 256,
            safety_settings: "permissive".to_string(),
            request_timeout: Duration::from_secs(5),
            retry_base_delay: Duration::from_millis(1),
        }
    }

    pub(crate) fn image_response(bytes: &[u8]) -> Value {
        json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Here is your poster" },
                        { "inlineData": { "mimeType": "image/png", "data": encode_base64(bytes) } }
                    ]
                },
                "finishReason": "STOP"
            }]
        })
    }

    pub(crate) fn text_response(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    fn portrait() -> PortraitImage {
        PortraitImage {
            bytes: vec![1, 2, 3, 4],
            mime_type: "image/jpeg".to_string(),
        }
    }

    #[tokio::test]
    async fn image_request_carries_portrait_prompt_and_image_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/image-model:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "inlineData": { "mimeType": "image/jpeg", "data": "AQIDBA==" } },
                        { "text": "make a poster" }
                    ]
                }],
                "generationConfig": {
                    "imageConfig": { "aspectRatio": "3:4", "imageSize": "4K" }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_response(b"poster")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(test_settings(&server.uri()));
        let image = client
            .generate_image("make a poster", &portrait(), &ImageOptions::default())
            .await
            .unwrap();
        assert_eq!(image.bytes, b"poster");
        assert_eq!(image.mime_type, "image/png");
        assert!(image.data_url().starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn text_only_response_is_no_image_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/image-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("I cannot draw that")))
            .mount(&server)
            .await;

        let client = GeminiClient::new(test_settings(&server.uri()));
        let err = client
            .generate_image("prompt", &portrait(), &ImageOptions::default())
            .await
            .unwrap_err();
        match err {
            GeminiError::NoImage { model, detail } => {
                assert_eq!(model, "image-model");
                assert!(detail.contains("I cannot draw that"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_retried_once() {
        let server = MockServer::start().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        Mock::given(method("POST"))
            .and(path("/models/chat-model:generateContent"))
            .respond_with(move |_req: &wiremock::Request| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(503).set_body_string("overloaded")
                } else {
                    ResponseTemplate::new(200).set_body_json(text_response("Xin chào"))
                }
            })
            .expect(2)
            .mount(&server)
            .await;

        let client = GeminiClient::new(test_settings(&server.uri()));
        let reply = client
            .generate_text("system", &[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(reply, "Xin chào");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rate_limits_and_request_timeouts_are_retried() {
        for status in [429u16, 408] {
            let server = MockServer::start().await;
            let counter = Arc::new(AtomicUsize::new(0));
            let seen = counter.clone();
            Mock::given(method("POST"))
                .and(path("/models/image-model:generateContent"))
                .respond_with(move |_req: &wiremock::Request| {
                    if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                        ResponseTemplate::new(status).set_body_json(json!({
                            "error": { "message": "slow down" }
                        }))
                    } else {
                        ResponseTemplate::new(200).set_body_json(image_response(b"poster"))
                    }
                })
                .expect(2)
                .mount(&server)
                .await;

            let client = GeminiClient::new(test_settings(&server.uri()));
            let image = client
                .generate_image("prompt", &portrait(), &ImageOptions::default())
                .await
                .unwrap();
            assert_eq!(image.bytes, b"poster", "status {status}");
            assert_eq!(counter.load(Ordering::SeqCst), 2, "status {status}");
        }
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/image-model:generateContent"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "Unsupported image" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(test_settings(&server.uri()));
        let err = client
            .generate_image("prompt", &portrait(), &ImageOptions::default())
            .await
            .unwrap_err();
        match err {
            GeminiError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Unsupported image");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn entity_not_found_requires_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(test_settings(&server.uri()));
        let err = client
            .generate_text("system", &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::Api { status: 404, .. }));
        assert!(err.requires_api_key());
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let mut settings = test_settings("http://127.0.0.1:9");
        settings.api_key = "  ".to_string();
        let client = GeminiClient::new(settings);
        let err = client
            .generate_text("system", &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::MissingApiKey));
        assert!(err.requires_api_key());
    }

    #[test]
    fn chat_history_maps_roles() {
        let contents = build_chat_contents(&[ChatMessage::user("a"), ChatMessage::model("b")]);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "b");
    }

    #[test]
    fn blank_image_options_are_omitted() {
        let options = ImageOptions {
            aspect_ratio: Some(" ".to_string()),
            image_size: None,
        };
        assert!(build_image_config(&options).is_none());
    }

    #[test]
    fn unknown_parts_do_not_break_parsing() {
        let raw = json!({
            "candidates": [{
                "content": { "parts": [
                    { "functionCall": { "name": "noop", "args": {} } },
                    { "inlineData": { "mimeType": "image/png", "data": "cG5n" } }
                ]}
            }]
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        let image = extract_first_image(&response).unwrap();
        assert_eq!(image.bytes, b"png");
    }

    #[test]
    fn error_body_prefers_nested_message() {
        let (message, _) = summarize_error_body(r#"{"error":{"message":"quota exceeded"}}"#);
        assert_eq!(message.as_deref(), Some("quota exceeded"));
        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }
}
