//! Local post-processing of a generated poster: crop box plus brightness and
//! contrast filters, matching CSS `brightness()`/`contrast()` semantics.

use std::io::Cursor;
use std::str::FromStr;

use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use tracing::debug;

pub const FILTER_MIN: u32 = 50;
pub const FILTER_MAX: u32 = 150;
pub const FILTER_NEUTRAL: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("Không đọc được ảnh poster: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Không ghi được ảnh PNG: {0}")]
    Encode(#[source] image::ImageError),
    #[error("Vùng cắt không hợp lệ '{0}' (dạng x,y,rộng,cao theo %)")]
    InvalidCrop(String),
}

/// Crop box in percent of the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for CropRect {
    fn default() -> Self {
        Self {
            x: 5.0,
            y: 5.0,
            width: 90.0,
            height: 90.0,
        }
    }
}

impl CropRect {
    pub const FULL: CropRect = CropRect {
        x: 0.0,
        y: 0.0,
        width: 100.0,
        height: 100.0,
    };

    /// Clamps width and height into (0, 100] and the origin so the box stays inside.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        let width = sanitize(width).clamp(1.0, 100.0);
        let height = sanitize(height).clamp(1.0, 100.0);
        Self {
            x: sanitize(x).clamp(0.0, 100.0 - width),
            y: sanitize(y).clamp(0.0, 100.0 - height),
            width,
            height,
        }
    }

    /// Drags the box by percentage deltas; the size never changes.
    pub fn nudge(&mut self, dx: f64, dy: f64) {
        self.x = (self.x + sanitize(dx)).clamp(0.0, 100.0 - self.width);
        self.y = (self.y + sanitize(dy)).clamp(0.0, 100.0 - self.height);
    }

    pub fn is_full_frame(&self) -> bool {
        *self == Self::FULL
    }

    /// Pixel rectangle `(x, y, width, height)` for an image of the given size.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let px = |percent: f64, total: u32| ((percent / 100.0) * f64::from(total)).floor() as u32;
        let x = px(self.x, image_width).min(image_width.saturating_sub(1));
        let y = px(self.y, image_height).min(image_height.saturating_sub(1));
        let width = px(self.width, image_width).clamp(1, image_width.saturating_sub(x).max(1));
        let height = px(self.height, image_height).clamp(1, image_height.saturating_sub(y).max(1));
        (x, y, width, height)
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

impl FromStr for CropRect {
    type Err = EditError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let numbers: Vec<f64> = value
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| EditError::InvalidCrop(value.to_string()))?;
        match numbers.as_slice() {
            [x, y, width, height] if numbers.iter().all(|n| n.is_finite()) => {
                Ok(CropRect::new(*x, *y, *width, *height))
            }
            _ => Err(EditError::InvalidCrop(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditSettings {
    brightness: u32,
    contrast: u32,
    pub crop: CropRect,
}

impl Default for EditSettings {
    fn default() -> Self {
        Self {
            brightness: FILTER_NEUTRAL,
            contrast: FILTER_NEUTRAL,
            crop: CropRect::default(),
        }
    }
}

impl EditSettings {
    pub fn brightness(&self) -> u32 {
        self.brightness
    }

    pub fn contrast(&self) -> u32 {
        self.contrast
    }

    pub fn set_brightness(&mut self, percent: u32) {
        self.brightness = percent.clamp(FILTER_MIN, FILTER_MAX);
    }

    pub fn set_contrast(&mut self, percent: u32) {
        self.contrast = percent.clamp(FILTER_MIN, FILTER_MAX);
    }

    pub fn with_filters(mut self, brightness: u32, contrast: u32) -> Self {
        self.set_brightness(brightness);
        self.set_contrast(contrast);
        self
    }

    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = crop;
        self
    }

    pub fn reset_filters(&mut self) {
        self.brightness = FILTER_NEUTRAL;
        self.contrast = FILTER_NEUTRAL;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn has_neutral_filters(&self) -> bool {
        self.brightness == FILTER_NEUTRAL && self.contrast == FILTER_NEUTRAL
    }
}

fn filter_channel(value: u8, brightness: f32, contrast: f32) -> u8 {
    // Each filter clamps to the channel range before the next one runs.
    let brightened = (f32::from(value) * brightness).clamp(0.0, 255.0);
    let contrasted = (brightened - 127.5) * contrast + 127.5;
    contrasted.round().clamp(0.0, 255.0) as u8
}

fn apply_filters(image: &mut RgbaImage, settings: &EditSettings) {
    if settings.has_neutral_filters() {
        return;
    }
    let brightness = settings.brightness as f32 / 100.0;
    let contrast = settings.contrast as f32 / 100.0;
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            *channel = filter_channel(*channel, brightness, contrast);
        }
    }
}

/// Crops and filters `image`. Neutral filters with a full-frame crop return it unchanged.
pub fn edit_image(image: &DynamicImage, settings: &EditSettings) -> RgbaImage {
    let (width, height) = image.dimensions();
    let (x, y, crop_width, crop_height) = settings.crop.to_pixels(width, height);
    let mut output = image.crop_imm(x, y, crop_width, crop_height).to_rgba8();
    apply_filters(&mut output, settings);
    output
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, EditError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(EditError::Encode)?;
    Ok(buf)
}

/// Decodes `source`, applies `settings` and re-encodes as PNG.
pub fn apply_edits(source: &[u8], settings: &EditSettings) -> Result<Vec<u8>, EditError> {
    let image = image::load_from_memory(source).map_err(EditError::Decode)?;
    let edited = edit_image(&image, settings);
    debug!(
        "Edited poster {}x{} -> {}x{} (brightness={}%, contrast={}%)",
        image.width(),
        image.height(),
        edited.width(),
        edited.height(),
        settings.brightness(),
        settings.contrast()
    );
    encode_png(&edited)
}

/// Holds the image returned by the model and the latest edit of it.
///
/// Edits always start from the original, never from a previous edit.
#[derive(Debug, Clone)]
pub struct PosterEditor {
    original: Vec<u8>,
    edited: Option<Vec<u8>>,
    pub settings: EditSettings,
}

impl PosterEditor {
    pub fn new(original: Vec<u8>) -> Self {
        Self {
            original,
            edited: None,
            settings: EditSettings::default(),
        }
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    pub fn edited(&self) -> Option<&[u8]> {
        self.edited.as_deref()
    }

    /// The bytes to save: the latest edit, else the original.
    pub fn current(&self) -> &[u8] {
        self.edited.as_deref().unwrap_or(&self.original)
    }

    pub fn apply(&mut self) -> Result<&[u8], EditError> {
        let output = apply_edits(&self.original, &self.settings)?;
        Ok(self.edited.insert(output).as_slice())
    }

    /// Cancels pending filter changes without touching the last applied edit.
    pub fn discard_filters(&mut self) {
        self.settings.reset_filters();
    }

    pub fn reset(&mut self) {
        self.settings.reset();
        self.edited = None;
    }
}
