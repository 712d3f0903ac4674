use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ai::{ollama, openai, BackendConfig};
use crate::capture::ocr::DEFAULT_OCR_URL;

pub const DEFAULT_SYSTEM_PREAMBLE: &str =
    "You are a helpful assistant. Use the provided screen context when it is relevant.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub system_preamble: String,
    pub openai_url: String,
    pub ollama_url: String,
    pub ocr_url: String,
    /// Companion `/process` endpoint; post-processing is skipped when unset.
    pub post_process_url: Option<String>,
    pub capture_timeout_secs: u64,
    /// Last so it serialises as a trailing `[backend]` table.
    pub backend: BackendConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            system_preamble: DEFAULT_SYSTEM_PREAMBLE.into(),
            openai_url: openai::DEFAULT_BASE_URL.into(),
            ollama_url: ollama::DEFAULT_BASE_URL.into(),
            ocr_url: DEFAULT_OCR_URL.into(),
            post_process_url: None,
            capture_timeout_secs: 10,
            backend: BackendConfig::default(),
        }
    }
}

/// `<config dir>/screenchat/settings.toml`
pub fn default_config_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir()
        .ok_or_else(|| "no config directory on this platform".to_string())?
        .join("screenchat");
    Ok(dir.join("settings.toml"))
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when the file is missing.
    /// Exactly what is on disk: the `OPENAI_API_KEY` fallback is applied by the
    /// transport so it never gets written back.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        toml::from_str(&content).map_err(|e| e.to_string())
    }

    /// `OPENAI_API_KEY`, if set and non-blank.
    pub fn env_api_key() -> Option<String> {
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| e.to_string())?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, content).map_err(|e| e.to_string())?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn capture_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.capture_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(settings.system_preamble, DEFAULT_SYSTEM_PREAMBLE);
        assert!(settings.backend.preserves_history());
        assert_eq!(settings.post_process_url, None);
    }

    #[test]
    fn save_then_load_keeps_backend_and_preamble() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let settings = Settings {
            system_preamble: "Answer in French.".into(),
            backend: BackendConfig::Ollama {
                model: "mistral".into(),
            },
            post_process_url: Some("http://127.0.0.1:5001/process".into()),
            ..Settings::default()
        };
        settings.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("systemPreamble"));
        assert!(text.contains("kind = \"ollama\""));

        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "systemPreamble = \"Be terse.\"\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.system_preamble, "Be terse.");
        assert_eq!(settings.ollama_url, ollama::DEFAULT_BASE_URL);
        assert_eq!(settings.capture_timeout_secs, 10);
    }

    #[test]
    fn env_key_is_not_loaded_or_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let settings = Settings {
            backend: BackendConfig::OpenAi {
                api_key: String::new(),
                model: "gpt-4o".into(),
            },
            ..Settings::default()
        };
        settings.save(&path).unwrap();

        std::env::set_var("OPENAI_API_KEY", "sk-from-env");
        let mut loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);

        loaded.system_preamble = "Be terse.".into();
        loaded.save(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("sk-from-env"), "{text}");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "backend = 42").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
