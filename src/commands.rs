use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::chat::ChatSession;
use crate::cli::{EditArgs, EditFlags, FormArgs, GenerateArgs};
use crate::config::{API_KEY_PROMPT, CONFIG};
use crate::editor::{apply_edits, EditSettings};
use crate::llm::gemini::{GeminiClient, GeminiSettings, ImageOptions};
use crate::poster::prompt::build_poster_prompt;
use crate::poster::types::{ChatRole, PosterData, PosterStyle};
use crate::studio::{save_bytes, EditMode, PosterStudio, StudioError};

const CHAT_EXIT_COMMANDS: [&str; 3] = ["/exit", "/quit", "/thoat"];

fn load_form(args: FormArgs) -> Result<PosterData> {
    let data = PosterData::assemble(args.form.as_deref(), args.overrides)?;
    Ok(data)
}

fn gemini_client() -> GeminiClient {
    GeminiClient::new(GeminiSettings::from_config(&CONFIG))
}

/// Reads one trimmed line from stdin; `None` on EOF.
async fn read_line(lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>) -> Result<Option<String>> {
    let line = lines.next_line().await.context("Failed to read from stdin")?;
    Ok(line.map(|line| line.trim().to_string()))
}

async fn prompt_user(label: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

/// Asks for a replacement key on an interactive terminal.
async fn ask_for_api_key() -> Result<Option<String>> {
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }
    prompt_user("GEMINI_API_KEY: ").await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    Ok(read_line(&mut lines).await?.filter(|key| !key.is_empty()))
}

fn edit_mode_for(flags: &EditFlags) -> EditMode {
    if flags.crop.is_some() {
        EditMode::Crop
    } else {
        EditMode::Filters
    }
}

pub async fn run_generate(args: GenerateArgs) -> Result<PathBuf> {
    let form = load_form(args.form)?;
    let studio = PosterStudio::new(gemini_client(), ImageOptions::from_config(&CONFIG), form);
    generate_poster(
        studio,
        args.refine_font,
        args.edits,
        args.out.as_deref(),
        &CONFIG.output_dir,
    )
    .await
}

/// One generation: the font choice is applied to the form before the model is called.
async fn generate_poster(
    mut studio: PosterStudio,
    font_choice: Option<usize>,
    edits: EditFlags,
    out: Option<&Path>,
    output_dir: &Path,
) -> Result<PathBuf> {
    if let Some(choice) = font_choice {
        let font = studio.choose_font_suggestion(choice)?;
        info!("Using font suggestion {}: {}", choice, font);
    }

    let first_attempt = studio.create_poster().await.map(|_| ());
    match first_attempt {
        Ok(()) => {}
        Err(StudioError::ApiKeyRequired(err)) => {
            println!("{API_KEY_PROMPT}");
            let Some(api_key) = ask_for_api_key().await? else {
                return Err(StudioError::ApiKeyRequired(err).into());
            };
            let mut settings = GeminiSettings::from_config(&CONFIG);
            settings.api_key = api_key;
            studio.api_key_configured(GeminiClient::new(settings));
            studio.create_poster().await?;
        }
        Err(err) => return Err(err.into()),
    }

    if let Some(result) = studio.result() {
        info!("Received {} poster from Gemini", result.mime_type);
    }
    if let Some(font) = studio.selected_font.as_deref() {
        info!("Artist name lettering: {}", font);
    }

    if !edits.is_empty() {
        studio.edit_mode = edit_mode_for(&edits);
        studio.apply_edits(edits.to_settings())?;
    }

    let saved = studio.save(out, output_dir)?;
    Ok(saved)
}

pub fn run_prompt(args: FormArgs) -> Result<String> {
    let form = load_form(args)?;
    Ok(build_poster_prompt(&form))
}

fn edited_file_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "poster".to_string());
    format!("{stem}_edited.png")
}

pub fn run_edit(args: EditArgs) -> Result<PathBuf> {
    let source = fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let settings: EditSettings = args.edits.to_settings();
    if settings.has_neutral_filters() && settings.crop.is_full_frame() {
        warn!("No edits requested; writing a PNG copy of {}", args.input.display());
    }

    let output = apply_edits(&source, &settings)?;
    let target = match args.out {
        Some(path) => path,
        None => CONFIG.output_dir.join(edited_file_name(&args.input)),
    };
    save_bytes(&target, &output)?;
    Ok(target)
}

pub fn render_fonts(style: Option<PosterStyle>) -> String {
    let styles: Vec<PosterStyle> = match style {
        Some(style) => vec![style],
        None => PosterStyle::ALL.to_vec(),
    };

    let mut output = String::new();
    for style in styles {
        let mapping = style.mapping();
        output.push_str(&format!("{} ({})\n", mapping.label, style.key()));
        output.push_str(&format!("  {}\n", mapping.font_description));
        for (index, font) in style.font_suggestions().iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", index + 1, font));
        }
    }
    output
}

pub async fn run_chat() -> Result<()> {
    let session = ChatSession::new(gemini_client());
    for message in session.transcript() {
        if message.role == ChatRole::Model {
            println!("{}\n", message.text);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt_user("> ").await?;
        let Some(line) = read_line(&mut lines).await? else {
            break;
        };
        if CHAT_EXIT_COMMANDS.contains(&line.to_lowercase().as_str()) {
            break;
        }
        if let Some(reply) = session.send(&line).await {
            println!("{reply}\n");
        }
    }

    info!("Chat ended after {} turns", session.history_len() / 2);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{encode_png, CropRect};
    use crate::llm::gemini::tests::{image_response, test_settings};
    use crate::poster::types::PortraitImage;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn poster_png() -> Vec<u8> {
        encode_png(&image::RgbaImage::from_pixel(
            8,
            8,
            image::Rgba([200, 30, 30, 255]),
        ))
        .unwrap()
    }

    fn studio_against(server: &MockServer) -> PosterStudio {
        let form = PosterData {
            portrait: Some(PortraitImage::from_bytes(poster_png())),
            ..PosterData::default()
        };
        PosterStudio::new(
            GeminiClient::new(test_settings(&server.uri())),
            ImageOptions::default(),
            form,
        )
    }

    #[tokio::test]
    async fn font_choice_needs_a_single_generation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/image-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_response(&poster_png())))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("poster.png");
        let saved = generate_poster(
            studio_against(&server),
            Some(2),
            EditFlags::default(),
            Some(&out),
            dir.path(),
        )
        .await
        .unwrap();
        assert_eq!(saved, out);
        assert_eq!(fs::read(&out).unwrap(), poster_png());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = requests[0].body_json().unwrap();
        let prompt = body["contents"][0]["parts"][1]["text"].as_str().unwrap();
        let font = PosterStyle::NamVui.font_suggestions()[1];
        assert!(prompt.contains(&format!("Thiết kế theo kiểu {font}.")));
    }

    #[tokio::test]
    async fn unknown_font_choice_fails_before_any_request() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let err = generate_poster(
            studio_against(&server),
            Some(9),
            EditFlags::default(),
            None,
            dir.path(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StudioError>(),
            Some(StudioError::UnknownFont { choice: 9, available: 4, .. })
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn fonts_listing_numbers_suggestions() {
        let listing = render_fonts(Some(PosterStyle::Bolero));
        assert!(listing.starts_with("🌟 Bolero Trữ Tình (BOLERO)\n"));
        assert!(listing.contains("  1. Chữ Serif cổ điển mạ vàng 3D\n"));
        assert!(listing.contains("  3. Font lồng đèn hoài cổ\n"));

        let all = render_fonts(None);
        assert!(all.contains("(NAM_VUI)") && all.contains("(MODERN)"));
    }

    #[test]
    fn edit_writes_cropped_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("poster.png");
        let png = encode_png(&image::RgbaImage::from_pixel(
            20,
            10,
            image::Rgba([10, 20, 30, 255]),
        ))
        .unwrap();
        fs::write(&input, png).unwrap();

        let out = dir.path().join("out/cropped.png");
        let saved = run_edit(EditArgs {
            input,
            edits: EditFlags {
                crop: Some(CropRect::new(0.0, 0.0, 50.0, 50.0)),
                ..EditFlags::default()
            },
            out: Some(out.clone()),
        })
        .unwrap();

        assert_eq!(saved, out);
        let decoded = image::open(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 5));
    }

    #[test]
    fn edited_name_keeps_input_stem() {
        assert_eq!(edited_file_name(Path::new("a/show.jpg")), "show_edited.png");
        assert_eq!(edited_file_name(Path::new("")), "poster_edited.png");
    }

    #[test]
    fn crop_flag_selects_crop_mode() {
        let crop = EditFlags {
            crop: Some(CropRect::FULL),
            ..EditFlags::default()
        };
        assert_eq!(edit_mode_for(&crop), EditMode::Crop);
        assert_eq!(edit_mode_for(&EditFlags::default()), EditMode::Filters);
    }
}
