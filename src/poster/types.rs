use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::llm::media::{detect_mime_type, parse_data_url};
use crate::poster::form::FormError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PosterStyle {
    #[default]
    NamVui,
    Bolero,
    Modern,
}

impl PosterStyle {
    pub const ALL: [PosterStyle; 3] = [PosterStyle::NamVui, PosterStyle::Bolero, PosterStyle::Modern];

    pub fn key(self) -> &'static str {
        match self {
            PosterStyle::NamVui => "NAM_VUI",
            PosterStyle::Bolero => "BOLERO",
            PosterStyle::Modern => "MODERN",
        }
    }

    pub fn mapping(self) -> &'static StyleMapping {
        match self {
            PosterStyle::NamVui => &NAM_VUI_MAPPING,
            PosterStyle::Bolero => &BOLERO_MAPPING,
            PosterStyle::Modern => &MODERN_MAPPING,
        }
    }

    pub fn font_suggestions(self) -> &'static [&'static str] {
        match self {
            PosterStyle::NamVui => &[
                "Chữ không chân (Sans-serif) Bold trắng",
                "Chữ nghệ thuật Gradient Hồng-Vàng rực rỡ",
                "Font chữ hiện đại, sắc nét kiểu Showbiz",
                "Chữ vàng gold sang trọng",
            ],
            PosterStyle::Bolero => &[
                "Chữ Serif cổ điển mạ vàng 3D",
                "Thư pháp hiện đại (Calligraphy)",
                "Font lồng đèn hoài cổ",
            ],
            PosterStyle::Modern => &[
                "Chữ Neon phát sáng",
                "Font Sans-serif khối đậm",
                "Hiệu ứng Glitch",
            ],
        }
    }
}

impl fmt::Display for PosterStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for PosterStyle {
    type Err = FormError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "namvui" => Ok(PosterStyle::NamVui),
            "bolero" => Ok(PosterStyle::Bolero),
            "modern" => Ok(PosterStyle::Modern),
            _ => Err(FormError::UnknownStyle(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StyleMapping {
    pub label: &'static str,
    pub description: &'static str,
    pub font_description: &'static str,
}

static NAM_VUI_MAPPING: StyleMapping = StyleMapping {
    label: "🎭 Style Chuyên Nghiệp",
    description: "Classic theatre stage with heavy red velvet curtains, two strong red spotlights from top corners, highly reflective red marble floor reflecting the singer.",
    font_description: "Tên ca sĩ sử dụng font Sans-serif Extra Bold với màu Gradient rực rỡ từ Hồng sang Vàng (Pink to Yellow). Các thông tin khác dùng font Sans-serif trắng hoặc vàng nghệ thuật.",
};

static BOLERO_MAPPING: StyleMapping = StyleMapping {
    label: "🌟 Bolero Trữ Tình",
    description: "Luxury concert stage, warm golden lights, bokeh background, elegant curtains.",
    font_description: "Font Serif cổ điển hoặc Calligraphy mạ vàng 3D.",
};

static MODERN_MAPPING: StyleMapping = StyleMapping {
    label: "🔥 Nhạc Trẻ Hiện Đại",
    description: "Modern stage with neon geometric lights and futuristic vibes.",
    font_description: "Font Sans-serif đậm kiểu Neon phát sáng.",
};

/// The uploaded artist portrait.
#[derive(Clone, PartialEq, Eq)]
pub struct PortraitImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl fmt::Debug for PortraitImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortraitImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl PortraitImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime_type = detect_mime_type(&bytes).unwrap_or_else(|| "image/png".to_string());
        Self { bytes, mime_type }
    }

    pub fn from_path(path: &Path) -> Result<Self, FormError> {
        let bytes = fs::read(path).map_err(|source| FormError::ReadPortrait {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(FormError::EmptyPortrait(path.to_path_buf()));
        }
        Ok(Self::from_bytes(bytes))
    }

    pub fn from_data_url(value: &str) -> Result<Self, FormError> {
        let (mime_type, bytes) = parse_data_url(value).ok_or(FormError::InvalidDataUrl)?;
        let mime_type = mime_type
            .or_else(|| detect_mime_type(&bytes))
            .unwrap_or_else(|| "image/png".to_string());
        Ok(Self { bytes, mime_type })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PosterData {
    pub club: String,
    pub event: String,
    pub artist: String,
    pub seat_number: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub style: PosterStyle,
    pub portrait: Option<PortraitImage>,
    pub ai_redesign: bool,
    pub font_preference: Option<String>,
}

pub const DEFAULT_CLUB: &str = "CLB XUÂN KHÊ KẾT NỐI BỐN PHƯƠNG";
pub const DEFAULT_EVENT: &str = "GIỚI THIỆU ĐÊM NHẠC LIVE MUSIC";
pub const DEFAULT_ARTIST: &str = "VUI DƯƠNG";
pub const DEFAULT_SEAT_NUMBER: &str = "SBD 023";
pub const DEFAULT_DATE: &str = "T7 10-01";
pub const DEFAULT_TIME: &str = "9:30 PM";

impl Default for PosterData {
    fn default() -> Self {
        PosterData {
            club: DEFAULT_CLUB.to_string(),
            event: DEFAULT_EVENT.to_string(),
            artist: DEFAULT_ARTIST.to_string(),
            seat_number: DEFAULT_SEAT_NUMBER.to_string(),
            date: Some(DEFAULT_DATE.to_string()),
            time: Some(DEFAULT_TIME.to_string()),
            style: PosterStyle::NamVui,
            portrait: None,
            ai_redesign: true,
            font_preference: None,
        }
    }
}

/// Role of a chat transcript entry, serialized the way Gemini expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}
