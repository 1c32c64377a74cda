//! Provider hot-reload.
//!
//! Watches `taskloom.toml` and, after a debounce window, hands the freshly
//! validated [`ProviderSettings`] to a callback. Other sections need a restart.

use crate::config::TaskloomConfig;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};
use taskloom_core::{TaskloomError, TaskloomResult};
use taskloom_llm::ProviderSettings;

/// Keeps the file watch alive; dropping it stops reloads.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Watch `config_path`. `on_reload` runs on a background thread; files that
    /// fail to parse or validate are logged and skipped.
    pub fn start<F>(config_path: PathBuf, debounce_ms: u64, on_reload: F) -> TaskloomResult<Self>
    where
        F: Fn(ProviderSettings) + Send + Sync + 'static,
    {
        let (tx, rx) = std_mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    let _ = tx.send(());
                }
            }
        })
        .map_err(|e| TaskloomError::Config(format!("Failed to create file watcher: {e}")))?;

        watcher
            .watch(config_path.as_ref(), RecursiveMode::NonRecursive)
            .map_err(|e| TaskloomError::Config(format!("Failed to watch config file: {e}")))?;

        let path = config_path.clone();
        std::thread::spawn(move || {
            let debounce = Duration::from_millis(debounce_ms);
            let mut last_reload = Instant::now();

            while rx.recv().is_ok() {
                // One reload per burst of writes.
                while rx.try_recv().is_ok() {}

                let elapsed = last_reload.elapsed();
                if elapsed < debounce {
                    std::thread::sleep(debounce - elapsed);
                }
                last_reload = Instant::now();

                match parse_provider_settings(&path) {
                    Ok(settings) => {
                        tracing::info!(
                            providers = settings.providers.len(),
                            default = %settings.default_provider,
                            "Provider settings reloaded"
                        );
                        on_reload(settings);
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to reload provider settings"),
                }
            }

            tracing::debug!("Config watcher thread exiting");
        });

        tracing::info!(path = %config_path.display(), "Provider hot-reload watcher started");

        Ok(Self { _watcher: watcher })
    }
}

/// Read `path` and build validated provider settings from its `[providers]` section.
pub fn parse_provider_settings(path: &Path) -> TaskloomResult<ProviderSettings> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        TaskloomError::Config(format!("Failed to read config '{}': {e}", path.display()))
    })?;
    TaskloomConfig::from_toml(&content)?.provider_settings()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_provider_settings() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp.as_file_mut(),
            r#"
[providers]
default = "local"

[[providers.entries]]
id = "local"
kind = "ollama"
model = "mistral"
"#
        )
        .unwrap();

        let settings = parse_provider_settings(tmp.path()).unwrap();
        assert_eq!(settings.default_provider, "local");
        assert_eq!(settings.get("local").unwrap().model, "mistral");
    }

    #[test]
    fn test_parse_rejects_invalid_settings() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp.as_file_mut(),
            r#"
[providers]
default = "ghost"
"#
        )
        .unwrap();
        assert!(parse_provider_settings(tmp.path()).is_err());
    }

    #[test]
    fn test_parse_missing_file() {
        let err = parse_provider_settings(Path::new("/nonexistent/taskloom.toml")).unwrap_err();
        assert!(matches!(err, TaskloomError::Config(_)));
    }

    #[test]
    fn test_watcher_starts_on_existing_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let watcher = ConfigWatcher::start(tmp.path().to_path_buf(), 100, |_| {});
        assert!(watcher.is_ok());
    }

    #[test]
    fn test_watcher_fails_on_missing_file() {
        let watcher = ConfigWatcher::start(PathBuf::from("/nonexistent/taskloom.toml"), 100, |_| {});
        assert!(watcher.is_err());
    }
}
