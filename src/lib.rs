pub mod ai;
pub mod assistant;
pub mod capture;
pub mod console;
pub mod conversation;
pub mod settings;

use assistant::Assistant;
use settings::Settings;

/// Load settings, build the assistant and drive it from stdin.
pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings_path = match settings::default_config_path() {
        Ok(path) => Some(path),
        Err(e) => {
            log::warn!("Settings will not be persisted: {}", e);
            None
        }
    };
    let settings = match settings_path.as_deref() {
        Some(path) => Settings::load(path).unwrap_or_else(|e| {
            log::error!("Failed to load settings from {}: {}", path.display(), e);
            Settings::default()
        }),
        None => Settings::default(),
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let assistant = Assistant::from_settings(&settings);
        if let Err(e) = console::run_console(assistant, settings, settings_path).await {
            log::error!("Console input failed: {}", e);
        }
    });
}
