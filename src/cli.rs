use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::editor::{CropRect, EditSettings};
use crate::poster::form::FormOverrides;
use crate::poster::types::PosterStyle;

pub fn usage() -> &'static str {
    "Usage: stage_poster_studio <command> [options]

Commands:
  generate   Generate a poster from a portrait and the form fields
  prompt     Print the generated art-direction prompt without calling the API
  edit       Crop or adjust brightness/contrast of an existing poster
  fonts      List styles and their font suggestions
  chat       Talk to the Nam Vui Designer assistant
  help       Show this message

Form options (generate, prompt):
  --form <file.yaml>     Load form fields from YAML
  --image <path>         Artist portrait
  --artist <name>        --club <name>    --event <text>    --seat <text>
  --date <text>          --time <text>    --style <nam-vui|bolero|modern>
  --redesign | --faithful
  --font <description>   Lettering for the artist name
  --refine-font <n>      (generate) Letter the name with suggestion n from `fonts`

Edit options (generate, edit):
  --brightness <50-150>  --contrast <50-150>  --crop <x,y,width,height in %>
  --out <path>           Output file (default: $OUTPUT_DIR/SanKhauVang_Poster_<ms>.png)

edit also takes --input <poster.png>; fonts takes --style."
}

#[derive(Debug, Default)]
pub struct FormArgs {
    pub form: Option<PathBuf>,
    pub overrides: FormOverrides,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct EditFlags {
    pub brightness: Option<u32>,
    pub contrast: Option<u32>,
    pub crop: Option<CropRect>,
}

impl EditFlags {
    pub fn is_empty(&self) -> bool {
        self.brightness.is_none() && self.contrast.is_none() && self.crop.is_none()
    }

    /// Flags layered over the editor defaults. Without `--crop` the whole frame is kept.
    pub fn to_settings(self) -> EditSettings {
        let mut settings = EditSettings::default().with_crop(self.crop.unwrap_or(CropRect::FULL));
        if let Some(brightness) = self.brightness {
            settings.set_brightness(brightness);
        }
        if let Some(contrast) = self.contrast {
            settings.set_contrast(contrast);
        }
        settings
    }
}

#[derive(Debug)]
pub struct GenerateArgs {
    pub form: FormArgs,
    pub edits: EditFlags,
    /// 1-based index into the style's font suggestions, applied before generating.
    pub refine_font: Option<usize>,
    pub out: Option<PathBuf>,
}

#[derive(Debug)]
pub struct EditArgs {
    pub input: PathBuf,
    pub edits: EditFlags,
    pub out: Option<PathBuf>,
}

#[derive(Debug)]
pub enum Command {
    Generate(GenerateArgs),
    Prompt(FormArgs),
    Edit(EditArgs),
    Fonts { style: Option<PosterStyle> },
    Chat,
    Help,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Generate(_) => "generate",
            Command::Prompt(_) => "prompt",
            Command::Edit(_) => "edit",
            Command::Fonts { .. } => "fonts",
            Command::Chat => "chat",
            Command::Help => "help",
        }
    }
}

fn take_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_percent(value: &str, flag: &str) -> Result<u32> {
    value
        .trim()
        .trim_end_matches('%')
        .parse::<u32>()
        .map_err(|_| anyhow!("Invalid {flag} value: {value}"))
}

/// Consumes a form or edit flag at `index`. Returns false when the flag is not one of them.
fn parse_shared_flag(
    args: &[String],
    index: &mut usize,
    form: Option<&mut FormArgs>,
    edits: Option<&mut EditFlags>,
) -> Result<bool> {
    let flag = args[*index].as_str();
    if let Some(form) = form {
        let overrides = &mut form.overrides;
        let handled = match flag {
            "--form" => {
                form.form = Some(PathBuf::from(take_value(args, index, flag)?));
                true
            }
            "--image" => {
                overrides.image = Some(PathBuf::from(take_value(args, index, flag)?));
                true
            }
            "--artist" => {
                overrides.artist = Some(take_value(args, index, flag)?.to_string());
                true
            }
            "--club" => {
                overrides.club = Some(take_value(args, index, flag)?.to_string());
                true
            }
            "--event" => {
                overrides.event = Some(take_value(args, index, flag)?.to_string());
                true
            }
            "--seat" => {
                overrides.seat_number = Some(take_value(args, index, flag)?.to_string());
                true
            }
            "--date" => {
                overrides.date = Some(take_value(args, index, flag)?.to_string());
                true
            }
            "--time" => {
                overrides.time = Some(take_value(args, index, flag)?.to_string());
                true
            }
            "--style" => {
                overrides.style = Some(take_value(args, index, flag)?.parse()?);
                true
            }
            "--font" => {
                overrides.font_preference = Some(take_value(args, index, flag)?.to_string());
                true
            }
            "--redesign" => {
                overrides.ai_redesign = Some(true);
                true
            }
            "--faithful" => {
                overrides.ai_redesign = Some(false);
                true
            }
            _ => false,
        };
        if handled {
            return Ok(true);
        }
    }

    if let Some(edits) = edits {
        let handled = match flag {
            "--brightness" => {
                edits.brightness = Some(parse_percent(take_value(args, index, flag)?, flag)?);
                true
            }
            "--contrast" => {
                edits.contrast = Some(parse_percent(take_value(args, index, flag)?, flag)?);
                true
            }
            "--crop" => {
                edits.crop = Some(take_value(args, index, flag)?.parse()?);
                true
            }
            _ => false,
        };
        if handled {
            return Ok(true);
        }
    }

    Ok(false)
}

fn unknown_argument(command: &str, other: &str) -> anyhow::Error {
    anyhow!("Unknown {command} argument: {other}\n{}", usage())
}

/// Parses `args` as produced by `std::env::args()` (program name first).
pub fn parse_command(args: &[String]) -> Result<Command> {
    let Some(command) = args.get(1).map(|value| value.as_str()) else {
        return Ok(Command::Help);
    };

    match command {
        "generate" => {
            let mut form = FormArgs::default();
            let mut edits = EditFlags::default();
            let mut refine_font = None;
            let mut out = None;
            let mut index = 2;
            while index < args.len() {
                if args[index] == "--out" {
                    out = Some(PathBuf::from(take_value(args, &mut index, "--out")?));
                } else if args[index] == "--refine-font" {
                    let value = take_value(args, &mut index, "--refine-font")?;
                    let choice = value
                        .parse::<usize>()
                        .ok()
                        .filter(|choice| *choice > 0)
                        .ok_or_else(|| anyhow!("Invalid --refine-font value: {value}"))?;
                    refine_font = Some(choice);
                } else if !parse_shared_flag(args, &mut index, Some(&mut form), Some(&mut edits))? {
                    return Err(unknown_argument(command, &args[index]));
                }
                index += 1;
            }
            Ok(Command::Generate(GenerateArgs {
                form,
                edits,
                refine_font,
                out,
            }))
        }
        "prompt" => {
            let mut form = FormArgs::default();
            let mut index = 2;
            while index < args.len() {
                if !parse_shared_flag(args, &mut index, Some(&mut form), None)? {
                    return Err(unknown_argument(command, &args[index]));
                }
                index += 1;
            }
            Ok(Command::Prompt(form))
        }
        "edit" => {
            let mut input = None;
            let mut edits = EditFlags::default();
            let mut out = None;
            let mut index = 2;
            while index < args.len() {
                match args[index].as_str() {
                    "--input" => input = Some(PathBuf::from(take_value(args, &mut index, "--input")?)),
                    "--out" => out = Some(PathBuf::from(take_value(args, &mut index, "--out")?)),
                    _ => {
                        if !parse_shared_flag(args, &mut index, None, Some(&mut edits))? {
                            return Err(unknown_argument(command, &args[index]));
                        }
                    }
                }
                index += 1;
            }
            let input = input.ok_or_else(|| anyhow!("--input is required\n{}", usage()))?;
            Ok(Command::Edit(EditArgs { input, edits, out }))
        }
        "fonts" | "styles" => {
            let mut style = None;
            let mut index = 2;
            while index < args.len() {
                match args[index].as_str() {
                    "--style" => style = Some(take_value(args, &mut index, "--style")?.parse()?),
                    other => return Err(unknown_argument(command, other)),
                }
                index += 1;
            }
            Ok(Command::Fonts { style })
        }
        "chat" => {
            if let Some(extra) = args.get(2) {
                return Err(unknown_argument(command, extra));
            }
            Ok(Command::Chat)
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once("stage_poster_studio")
            .chain(values.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn no_command_shows_help() {
        assert!(matches!(parse_command(&args(&[])).unwrap(), Command::Help));
    }

    #[test]
    fn generate_collects_form_and_edit_flags() {
        let command = parse_command(&args(&[
            "generate",
            "--image",
            "me.jpg",
            "--artist",
            "Minh Tâm",
            "--style",
            "bolero",
            "--faithful",
            "--brightness",
            "120%",
            "--crop",
            "5,5,90,90",
            "--refine-font",
            "2",
            "--out",
            "poster.png",
        ]))
        .unwrap();

        let Command::Generate(generate) = command else {
            panic!("expected generate");
        };
        assert_eq!(generate.form.overrides.image, Some(PathBuf::from("me.jpg")));
        assert_eq!(generate.form.overrides.artist.as_deref(), Some("Minh Tâm"));
        assert_eq!(generate.form.overrides.style, Some(PosterStyle::Bolero));
        assert_eq!(generate.form.overrides.ai_redesign, Some(false));
        assert_eq!(generate.edits.brightness, Some(120));
        assert_eq!(generate.edits.crop, Some(CropRect::default()));
        assert_eq!(generate.refine_font, Some(2));
        assert_eq!(generate.out, Some(PathBuf::from("poster.png")));
    }

    #[test]
    fn prompt_rejects_edit_flags() {
        let err = parse_command(&args(&["prompt", "--brightness", "120"])).unwrap_err();
        assert!(err.to_string().contains("Unknown prompt argument: --brightness"));
    }

    #[test]
    fn edit_requires_input() {
        let err = parse_command(&args(&["edit", "--contrast", "90"])).unwrap_err();
        assert!(err.to_string().starts_with("--input is required"));

        let Command::Edit(edit) =
            parse_command(&args(&["edit", "--input", "a.png", "--contrast", "90"])).unwrap()
        else {
            panic!("expected edit");
        };
        assert_eq!(edit.input, PathBuf::from("a.png"));
        assert_eq!(edit.edits.contrast, Some(90));
    }

    #[test]
    fn missing_values_and_bad_styles_are_errors() {
        assert!(parse_command(&args(&["generate", "--artist"])).is_err());
        assert!(parse_command(&args(&["fonts", "--style", "jazz"])).is_err());
        assert!(parse_command(&args(&["generate", "--refine-font", "0"])).is_err());
        assert!(parse_command(&args(&["dance"])).is_err());
    }

    #[test]
    fn edit_flags_default_to_full_frame() {
        let flags = EditFlags {
            brightness: Some(500),
            ..EditFlags::default()
        };
        let settings = flags.to_settings();
        assert_eq!(settings.crop, CropRect::FULL);
        assert_eq!(settings.brightness(), 150);
        assert!(EditFlags::default().is_empty());
    }
}
