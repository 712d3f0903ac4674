// console.rs: Line-oriented front end: plain lines are chat messages,
// slash commands capture context or change configuration.

use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::ai::BackendConfig;
use crate::assistant::Assistant;
use crate::capture::preview;
use crate::settings::Settings;

const HELP: &str = "\
Commands:
  /context                          capture the screen and attach it to the next message
  /backend openai <model> [api-key] use the hosted API (key falls back to OPENAI_API_KEY)
  /backend ollama <model>           use the local model server
  /backend local <url>              use the local companion service
  /preamble <text>                  replace the system preamble
  /history                          print the stored transcript
  /quit                             exit
Anything else is sent as a chat message.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    CaptureContext,
    SetBackend(BackendConfig),
    SetPreamble(String),
    History,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };

    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();
    let command = match name {
        "context" => Command::CaptureContext,
        "history" => Command::History,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "preamble" if !args.is_empty() => Command::SetPreamble(args.to_string()),
        "preamble" => return Err("usage: /preamble <text>".into()),
        "backend" => Command::SetBackend(parse_backend(args)?),
        other => return Err(format!("unknown command /{}; try /help", other)),
    };
    Ok(Some(command))
}

fn parse_backend(args: &str) -> Result<BackendConfig, String> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    match parts.as_slice() {
        // Left empty so the key stays out of settings.toml; the transport
        // falls back to OPENAI_API_KEY.
        ["openai", model] => Ok(BackendConfig::OpenAi {
            api_key: String::new(),
            model: model.to_string(),
        }),
        ["openai", model, key] => Ok(BackendConfig::OpenAi {
            api_key: key.to_string(),
            model: model.to_string(),
        }),
        ["ollama", model] => Ok(BackendConfig::Ollama {
            model: model.to_string(),
        }),
        ["local", base] => {
            let parsed = url::Url::parse(base).map_err(|e| format!("invalid URL {}: {}", base, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!("unsupported scheme {}", parsed.scheme()));
            }
            Ok(BackendConfig::LocalService {
                base_url: base.trim_end_matches('/').to_string(),
            })
        }
        _ => Err("usage: /backend openai <model> [key] | ollama <model> | local <url>".into()),
    }
}

/// Read commands from stdin until `/quit` or end of input.
pub async fn run_console(
    assistant: Assistant,
    mut settings: Settings,
    settings_path: Option<PathBuf>,
) -> std::io::Result<()> {
    println!("Ready. Backend: {}. Type /help for commands.", settings.backend.name());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match command {
            Command::Send(text) => match assistant.send_message(&text).await {
                Ok(reply) => println!("Assistant: {}", reply),
                Err(e) => println!("Error: {}", e.user_message()),
            },
            Command::CaptureContext => {
                let blob = assistant.capture_and_attach_context().await;
                println!("Captured preview:\n{}", preview(&blob));
            }
            Command::SetBackend(backend) => {
                assistant.set_backend(backend.clone()).await;
                println!("Backend: {}", backend.name());
                settings.backend = backend;
                persist(&settings, settings_path.as_deref());
            }
            Command::SetPreamble(text) => {
                assistant.set_system_preamble(&text).await;
                settings.system_preamble = text;
                persist(&settings, settings_path.as_deref());
            }
            Command::History => {
                for msg in assistant.history().await {
                    println!("[{:?}] {}", msg.role, msg.content);
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
        }
    }
    Ok(())
}

fn persist(settings: &Settings, path: Option<&std::path::Path>) {
    if let Some(path) = path {
        if let Err(e) = settings.save(path) {
            log::error!("Failed to save settings: {}", e);
        }
    }
}
