use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::poster::types::{PortraitImage, PosterData, PosterStyle, DEFAULT_EVENT};

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("Không đọc được file form {path}: {source}")]
    ReadForm {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("File form {path} không hợp lệ: {source}")]
    ParseForm {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Không đọc được ảnh chân dung {path}: {source}")]
    ReadPortrait {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Ảnh chân dung {0} bị rỗng")]
    EmptyPortrait(PathBuf),
    #[error("Chuỗi data URL của ảnh không hợp lệ")]
    InvalidDataUrl,
    #[error("Phong cách '{0}' không tồn tại (chọn nam-vui, bolero hoặc modern)")]
    UnknownStyle(String),
}

/// Reasons a form cannot be submitted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Vui lòng tải ảnh chân dung nghệ sĩ lên!")]
    MissingPortrait,
    #[error("Hãy nhập tên nghệ sĩ để bắt đầu thiết kế!")]
    MissingArtist,
}

/// On-disk form. Accepts the short field names of the web form as aliases.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PosterFormFile {
    #[serde(default, alias = "clb")]
    pub club: Option<String>,
    #[serde(default, alias = "su_kien")]
    pub event: Option<String>,
    #[serde(default, alias = "ca_si")]
    pub artist: Option<String>,
    #[serde(default, alias = "sbd")]
    pub seat_number: Option<String>,
    #[serde(default, alias = "ngay")]
    pub date: Option<String>,
    #[serde(default, alias = "gio")]
    pub time: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default, alias = "image_path")]
    pub image: Option<PathBuf>,
    #[serde(default, alias = "image_base64")]
    pub image_data_url: Option<String>,
    #[serde(default, alias = "aiRedesign")]
    pub ai_redesign: Option<bool>,
    #[serde(default, alias = "fontPreference")]
    pub font_preference: Option<String>,
}

/// Values supplied on the command line; applied after the form file.
#[derive(Debug, Default, Clone)]
pub struct FormOverrides {
    pub club: Option<String>,
    pub event: Option<String>,
    pub artist: Option<String>,
    pub seat_number: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub style: Option<PosterStyle>,
    pub image: Option<PathBuf>,
    pub ai_redesign: Option<bool>,
    pub font_preference: Option<String>,
}

fn optional_text(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl PosterFormFile {
    pub fn load(path: &Path) -> Result<Self, FormError> {
        let raw = fs::read_to_string(path).map_err(|source| FormError::ReadForm {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = Self::parse(&raw).map_err(|source| FormError::ParseForm {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded poster form from {}", path.display());
        Ok(parsed)
    }

    pub fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Merges the file over `data`. Relative image paths resolve against `base_dir`.
    pub fn apply_to(self, data: &mut PosterData, base_dir: Option<&Path>) -> Result<(), FormError> {
        if let Some(club) = self.club {
            data.club = club;
        }
        if let Some(event) = self.event {
            data.event = event;
        }
        if let Some(artist) = self.artist {
            data.artist = artist;
        }
        if let Some(seat_number) = self.seat_number {
            data.seat_number = seat_number;
        }
        if let Some(date) = self.date {
            data.date = optional_text(date);
        }
        if let Some(time) = self.time {
            data.time = optional_text(time);
        }
        if let Some(style) = self.style {
            data.style = style.parse()?;
        }
        if let Some(ai_redesign) = self.ai_redesign {
            data.ai_redesign = ai_redesign;
        }
        if let Some(font) = self.font_preference {
            data.font_preference = optional_text(font);
        }
        if let Some(image) = self.image {
            let resolved = match base_dir {
                Some(dir) if image.is_relative() => dir.join(image),
                _ => image,
            };
            data.portrait = Some(PortraitImage::from_path(&resolved)?);
        } else if let Some(data_url) = self.image_data_url {
            data.portrait = Some(PortraitImage::from_data_url(&data_url)?);
        }
        Ok(())
    }
}

impl FormOverrides {
    pub fn apply_to(self, data: &mut PosterData) -> Result<(), FormError> {
        if let Some(club) = self.club {
            data.club = club;
        }
        if let Some(event) = self.event {
            data.event = event;
        }
        if let Some(artist) = self.artist {
            data.artist = artist;
        }
        if let Some(seat_number) = self.seat_number {
            data.seat_number = seat_number;
        }
        if let Some(date) = self.date {
            data.date = optional_text(date);
        }
        if let Some(time) = self.time {
            data.time = optional_text(time);
        }
        if let Some(style) = self.style {
            data.style = style;
        }
        if let Some(ai_redesign) = self.ai_redesign {
            data.ai_redesign = ai_redesign;
        }
        if let Some(font) = self.font_preference {
            data.font_preference = optional_text(font);
        }
        if let Some(image) = self.image {
            data.portrait = Some(PortraitImage::from_path(&image)?);
        }
        Ok(())
    }
}

impl PosterData {
    /// Defaults, then the optional form file, then command-line overrides.
    pub fn assemble(form_path: Option<&Path>, overrides: FormOverrides) -> Result<Self, FormError> {
        let mut data = PosterData::default();
        if let Some(path) = form_path {
            let file = PosterFormFile::load(path)?;
            file.apply_to(&mut data, path.parent())?;
            info!("Using poster form {}", path.display());
        }
        overrides.apply_to(&mut data)?;
        Ok(data)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.portrait.is_none() {
            return Err(ValidationError::MissingPortrait);
        }
        if self.artist.trim().is_empty() {
            return Err(ValidationError::MissingArtist);
        }
        Ok(())
    }

    /// The event line printed under the club name.
    pub fn event_line(&self) -> &str {
        let trimmed = self.event.trim();
        if trimmed.is_empty() {
            DEFAULT_EVENT
        } else {
            trimmed
        }
    }
}
