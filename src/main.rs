use std::process::ExitCode;

use dotenvy::dotenv;
use tracing::{error, info};

mod chat;
mod cli;
mod commands;
mod config;
mod editor;
mod llm;
mod poster;
mod studio;
mod utils;

use cli::{parse_command, usage, Command};
use utils::logging::init_logging;
use utils::timing::{complete_command_timer, start_command_timer};

async fn dispatch(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Generate(args) => {
            let saved = commands::run_generate(args).await?;
            println!("Poster đã lưu: {}", saved.display());
        }
        Command::Prompt(args) => {
            println!("{}", commands::run_prompt(args)?);
        }
        Command::Edit(args) => {
            let saved = commands::run_edit(args)?;
            println!("Poster đã chỉnh sửa: {}", saved.display());
        }
        Command::Fonts { style } => {
            print!("{}", commands::render_fonts(style));
        }
        Command::Chat => commands::run_chat().await?,
        Command::Help => println!("{}", usage()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    let _guards = init_logging(matches!(command, Command::Chat));
    info!("Starting Stage Poster Studio ({})", command.name());

    let mut timer = start_command_timer(command.name(), args.get(2..).unwrap_or_default());
    match dispatch(command).await {
        Ok(()) => {
            complete_command_timer(&mut timer, "success", None);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            complete_command_timer(&mut timer, "error", Some(format!("{err:#}")));
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
