use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::editor::{EditError, EditSettings, PosterEditor};
use crate::llm::gemini::{GeminiClient, GeminiError, GeneratedImage, ImageOptions};
use crate::poster::form::ValidationError;
use crate::poster::prompt::build_poster_prompt;
use crate::poster::types::{PortraitImage, PosterData, PosterStyle};

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("Cần cấu hình lại API key: {0}")]
    ApiKeyRequired(#[source] GeminiError),
    #[error("Có lỗi: {0}")]
    Generation(#[source] GeminiError),
    #[error("Chưa có poster nào để chỉnh sửa")]
    NoResult,
    #[error("Không có gợi ý font số {choice} cho phong cách {style} (chọn 1-{available})")]
    UnknownFont {
        choice: usize,
        style: PosterStyle,
        available: usize,
    },
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error("Không lưu được poster vào {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    None,
    Filters,
    Crop,
    Font,
}

/// Poster workflow: form in, generated image out, then local edits.
pub struct PosterStudio {
    client: GeminiClient,
    image_options: ImageOptions,
    pub form: PosterData,
    result: Option<GeneratedImage>,
    editor: Option<PosterEditor>,
    loading: bool,
    needs_api_key: bool,
    pub edit_mode: EditMode,
    pub selected_font: Option<String>,
}

impl PosterStudio {
    pub fn new(client: GeminiClient, image_options: ImageOptions, form: PosterData) -> Self {
        Self {
            client,
            image_options,
            form,
            result: None,
            editor: None,
            loading: false,
            needs_api_key: false,
            edit_mode: EditMode::None,
            selected_font: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn needs_api_key(&self) -> bool {
        self.needs_api_key
    }

    /// Called once the user has configured a new key.
    pub fn api_key_configured(&mut self, client: GeminiClient) {
        self.client = client;
        self.needs_api_key = false;
    }

    pub fn result(&self) -> Option<&GeneratedImage> {
        self.result.as_ref()
    }

    pub fn font_suggestions(&self) -> &'static [&'static str] {
        self.form.style.font_suggestions()
    }

    pub fn prompt(&self) -> String {
        build_poster_prompt(&self.form)
    }

    /// Validates the form and asks the image model for a poster.
    ///
    /// The previous result and any edits are dropped first; the loading flag
    /// is cleared whether or not generation succeeds.
    pub async fn create_poster(&mut self) -> Result<&GeneratedImage, StudioError> {
        self.form.validate()?;
        let portrait = self
            .form
            .portrait
            .clone()
            .ok_or(ValidationError::MissingPortrait)?;

        self.loading = true;
        self.result = None;
        self.editor = None;
        let outcome = self.request_poster(&portrait).await;
        self.loading = false;
        let generated = outcome?;

        info!(
            "Poster generated ({} bytes, {})",
            generated.bytes.len(),
            generated.mime_type
        );
        self.editor = Some(PosterEditor::new(generated.bytes.clone()));
        self.edit_mode = EditMode::None;
        self.selected_font = self.form.font_preference.clone();
        Ok(self.result.insert(generated))
    }

    async fn request_poster(&mut self, portrait: &PortraitImage) -> Result<GeneratedImage, StudioError> {
        let prompt = self.prompt();
        info!(
            "Generating poster for '{}' (style={}, redesign={}, font={:?})",
            self.form.artist, self.form.style, self.form.ai_redesign, self.form.font_preference
        );

        match self
            .client
            .generate_image(&prompt, portrait, &self.image_options)
            .await
        {
            Ok(image) => Ok(image),
            Err(err) if err.requires_api_key() => {
                warn!("Gemini rejected the API key: {}", err);
                self.needs_api_key = true;
                Err(StudioError::ApiKeyRequired(err))
            }
            Err(err) => {
                error!("Poster generation failed: {}", err);
                Err(StudioError::Generation(err))
            }
        }
    }

    fn set_font(&mut self, font: &str) {
        let font = font.trim();
        self.form.font_preference = if font.is_empty() {
            None
        } else {
            Some(font.to_string())
        };
        self.selected_font = self.form.font_preference.clone();
    }

    /// Picks suggestion `choice` (1-based) for the current style without generating.
    pub fn choose_font_suggestion(&mut self, choice: usize) -> Result<&'static str, StudioError> {
        let suggestions = self.font_suggestions();
        let font = choice
            .checked_sub(1)
            .and_then(|index| suggestions.get(index))
            .copied()
            .ok_or(StudioError::UnknownFont {
                choice,
                style: self.form.style,
                available: suggestions.len(),
            })?;
        self.edit_mode = EditMode::Font;
        self.set_font(font);
        Ok(font)
    }

    /// Stores the chosen font for the artist name and regenerates the poster.
    pub async fn refine_font(&mut self, font: &str) -> Result<&GeneratedImage, StudioError> {
        self.edit_mode = EditMode::Font;
        self.set_font(font);
        self.create_poster().await
    }

    /// Applies `settings` to the generated poster and returns the PNG bytes.
    pub fn apply_edits(&mut self, settings: EditSettings) -> Result<&[u8], StudioError> {
        let editor = self.editor.as_mut().ok_or(StudioError::NoResult)?;
        info!(
            "Applying {:?} edits: brightness={} contrast={} crop={:?}",
            self.edit_mode,
            settings.brightness(),
            settings.contrast(),
            settings.crop
        );
        editor.settings = settings;
        let output = editor.apply()?;
        self.edit_mode = EditMode::None;
        Ok(output)
    }

    /// Bytes a download would produce: the edited poster, else the original.
    pub fn current_image(&self) -> Option<&[u8]> {
        self.editor.as_ref().map(|editor| editor.current())
    }

    pub fn default_file_name() -> String {
        format!("SanKhauVang_Poster_{}.png", Utc::now().timestamp_millis())
    }

    /// Writes the current image to `path`, or to a timestamped file in `output_dir`.
    pub fn save(&self, path: Option<&Path>, output_dir: &Path) -> Result<PathBuf, StudioError> {
        let bytes = self.current_image().ok_or(StudioError::NoResult)?;
        let target = match path {
            Some(path) => path.to_path_buf(),
            None => output_dir.join(Self::default_file_name()),
        };
        save_bytes(&target, bytes)?;
        info!("Saved poster to {}", target.display());
        Ok(target)
    }
}

pub fn save_bytes(target: &Path, bytes: &[u8]) -> Result<(), StudioError> {
    if let Some(parent) = target.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StudioError::Save {
            path: target.to_path_buf(),
            source,
        })?;
    }
    fs::write(target, bytes).map_err(|source| StudioError::Save {
        path: target.to_path_buf(),
        source,
    })
}
