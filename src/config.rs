use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;
use std::{env, fs};

use anyhow::Context;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub player: PlayerConfig,
    pub embed: EmbedConfig,
}

impl Config {
    /// First existing candidate config file, next to the working directory or
    /// the executable.
    pub fn config_path() -> Option<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = env::current_dir() {
            candidates.push(current_dir.join("config.toml"));
            candidates.push(current_dir.join("config").join("config.toml"));
            candidates.push(current_dir.join("config").join("embedded_player.toml"));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join("config.toml"));
                candidates.push(dir.join("config").join("config.toml"));
                candidates.push(dir.join("config").join("embedded_player.toml"));
            }
        }

        candidates.into_iter().find(|path| path.exists())
    }

    pub fn load() -> anyhow::Result<Self> {
        if let Some(path) = Self::config_path() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let doc: ConfigDocument = toml::from_str(&data)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            return Ok(doc.into());
        }

        Ok(Config::default())
    }
}

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub binary: String,
    pub probe_binary: String,
    pub extra_args: Vec<String>,
    pub default_volume: i32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: "ffplay".to_string(),
            probe_binary: "ffprobe".to_string(),
            extra_args: Vec::new(),
            default_volume: 50,
        }
    }
}

impl PlayerConfig {
    pub fn default_volume(&self) -> i32 {
        self.default_volume.clamp(0, 100)
    }
}

#[derive(Debug, Clone)]
pub struct EmbedConfig {
    pub max_find_attempts: u32,
    pub find_retry_ms: u64,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            max_find_attempts: 20,
            find_retry_ms: 250,
        }
    }
}

impl EmbedConfig {
    pub fn max_find_attempts(&self) -> u32 {
        self.max_find_attempts.clamp(1, 100)
    }

    pub fn find_retry_delay(&self) -> Duration {
        Duration::from_millis(self.find_retry_ms.clamp(50, 2000))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    player: PlayerSection,
    #[serde(default)]
    embed: EmbedSection,
}

impl From<ConfigDocument> for Config {
    fn from(value: ConfigDocument) -> Self {
        let defaults = PlayerConfig::default();
        let player = PlayerConfig {
            binary: value.player.binary.unwrap_or(defaults.binary),
            probe_binary: value.player.probe_binary.unwrap_or(defaults.probe_binary),
            extra_args: value.player.extra_args.unwrap_or_default(),
            default_volume: value.player.default_volume.unwrap_or(50),
        };

        let embed = EmbedConfig {
            max_find_attempts: value.embed.max_find_attempts.unwrap_or(20),
            find_retry_ms: value.embed.find_retry_ms.unwrap_or(250),
        };

        Config { player, embed }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlayerSection {
    binary: Option<String>,
    probe_binary: Option<String>,
    extra_args: Option<Vec<String>>,
    default_volume: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbedSection {
    max_find_attempts: Option<u32>,
    find_retry_ms: Option<u64>,
}

/// Watches the active config file and reports pending changes, so edits take
/// effect without restarting.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    changes_rx: Receiver<notify::Result<notify::Event>>,
}

impl ConfigWatcher {
    pub fn new() -> Option<Self> {
        let path = Config::config_path()?;
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx).ok()?;
        watcher.watch(&path, RecursiveMode::NonRecursive).ok()?;
        Some(Self {
            _watcher: watcher,
            changes_rx: rx,
        })
    }

    /// Drains the watcher queue; true when the file changed since last poll.
    pub fn poll_changed(&self) -> bool {
        let mut changed = false;
        loop {
            match self.changes_rx.try_recv() {
                Ok(Ok(_)) => changed = true,
                Ok(Err(_)) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let doc: ConfigDocument = toml::from_str("").expect("empty document parses");
        let config: Config = doc.into();
        assert_eq!(config.player.binary, "ffplay");
        assert_eq!(config.player.probe_binary, "ffprobe");
        assert_eq!(config.player.default_volume(), 50);
        assert_eq!(config.embed.max_find_attempts(), 20);
        assert_eq!(config.embed.find_retry_delay(), Duration::from_millis(250));
    }

    #[test]
    fn document_values_override_defaults() {
        let toml_source = r#"
            [player]
            binary = "/opt/ffmpeg/bin/ffplay"
            default_volume = 80
            extra_args = ["-loglevel", "quiet"]

            [embed]
            max_find_attempts = 5
            find_retry_ms = 100
        "#;
        let doc: ConfigDocument = toml::from_str(toml_source).expect("document parses");
        let config: Config = doc.into();
        assert_eq!(config.player.binary, "/opt/ffmpeg/bin/ffplay");
        assert_eq!(config.player.default_volume(), 80);
        assert_eq!(config.player.extra_args, vec!["-loglevel", "quiet"]);
        assert_eq!(config.embed.max_find_attempts(), 5);
        assert_eq!(config.embed.find_retry_delay(), Duration::from_millis(100));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = Config {
            player: PlayerConfig {
                default_volume: 300,
                ..PlayerConfig::default()
            },
            embed: EmbedConfig {
                max_find_attempts: 0,
                find_retry_ms: 10,
            },
        };
        assert_eq!(config.player.default_volume(), 100);
        assert_eq!(config.embed.max_find_attempts(), 1);
        assert_eq!(config.embed.find_retry_delay(), Duration::from_millis(50));
    }
}
