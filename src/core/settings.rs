use anyhow::{Context, Result};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Periodic incoming/outgoing refresh. Absent means enabled; only an
    /// explicit `false` turns it off.
    pub auto_in_out: Option<bool>,
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hg-inout").join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path().context("Could not determine config directory")?;

        if !path.exists() {
            tracing::info!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(?path, "Loaded config");
        Ok(settings)
    }
}

/// Source of the configuration the poller consumes, plus change
/// notifications. Hosts with their own configuration system implement this
/// directly; [`SettingsWatcher`] is the file-backed implementation.
pub trait ConfigSource: Send + Sync {
    /// The `auto_in_out` option. Absent means enabled.
    fn auto_in_out(&self) -> Option<bool>;

    /// Fires on any configuration change; consumers re-read the options
    /// they care about.
    fn subscribe(&self) -> broadcast::Receiver<()>;
}

/// Watches the settings file on disk and rebroadcasts changes.
pub struct SettingsWatcher {
    settings: Arc<RwLock<Settings>>,
    tx: broadcast::Sender<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl SettingsWatcher {
    pub fn new() -> Result<Self> {
        let settings = Settings::load()?;
        let (tx, _) = broadcast::channel(16);

        Ok(Self {
            settings: Arc::new(RwLock::new(settings)),
            tx,
            _watcher: None,
        })
    }

    pub fn get(&self) -> Settings {
        self.settings.read().unwrap().clone()
    }

    pub fn start_watching(&mut self) -> Result<()> {
        let path = Settings::config_path().context("Could not determine config directory")?;
        let parent = path
            .parent()
            .map(|p| p.to_path_buf())
            .context("Config path has no parent directory")?;
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .context("Config path has no file name")?;

        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    if event.kind.is_modify() || event.kind.is_create() {
                        let changed = event.paths.iter().any(|p| {
                            p.file_name()
                                .map(|f| f.to_string_lossy() == file_name.as_str())
                                .unwrap_or(false)
                        });
                        if changed {
                            let _ = notify_tx.send(());
                        }
                    }
                }
            },
            Config::default(),
        )?;

        if parent.exists() {
            watcher
                .watch(&parent, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch directory: {}", parent.display()))?;
            tracing::info!(?parent, "Watching settings directory");
        } else {
            tracing::warn!(?parent, "Settings directory does not exist, skipping watch");
        }

        let settings = Arc::clone(&self.settings);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while notify_rx.recv().await.is_some() {
                // Editors fire bursts of events per save; settle, then drain.
                tokio::time::sleep(Duration::from_millis(200)).await;
                while notify_rx.try_recv().is_ok() {}

                match Settings::load() {
                    Ok(reloaded) => {
                        *settings.write().unwrap() = reloaded;
                        tracing::info!("Settings reloaded from disk");
                        let _ = tx.send(());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to reload settings, keeping previous");
                    }
                }
            }
        });

        self._watcher = Some(watcher);
        Ok(())
    }
}

impl ConfigSource for SettingsWatcher {
    fn auto_in_out(&self) -> Option<bool> {
        self.settings.read().unwrap().auto_in_out
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.auto_in_out, None);
    }

    #[test]
    fn test_parse_empty_toml() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.auto_in_out, None);
    }

    #[test]
    fn test_parse_toml() {
        let settings: Settings = toml::from_str("auto_in_out = false").unwrap();
        assert_eq!(settings.auto_in_out, Some(false));

        let settings: Settings = toml::from_str("auto_in_out = true").unwrap();
        assert_eq!(settings.auto_in_out, Some(true));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let toml = r#"
            auto_in_out = true

            [paths]
            default = "https://hg.example.org/repo"
        "#;

        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.auto_in_out, Some(true));
    }
}
