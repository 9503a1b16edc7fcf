//! Application settings
//!
//! Read from `<config_dir>/voice-scrub/settings.json` unless a path is given.
//! A missing or unparsable default file yields defaults; environment
//! variables then override program locations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::deep_filter::DEFAULT_PROGRAM;
use crate::engine::DenoiseParams;

pub const APP_DIR_NAME: &str = "voice-scrub";
pub const SETTINGS_FILE: &str = "settings.json";

pub const ENV_ENGINE: &str = "VOICE_SCRUB_ENGINE";
pub const ENV_FFMPEG: &str = "VOICE_SCRUB_FFMPEG";
pub const ENV_FFPROBE: &str = "VOICE_SCRUB_FFPROBE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub codec: CodecConfig,
    pub denoise: DenoiseParams,
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub program: PathBuf,
    /// Arguments inserted before the input path, for launcher-style installs.
    pub args: Vec<String>,
    /// Unbounded when absent.
    pub timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { program: PathBuf::from(DEFAULT_PROGRAM), args: Vec::new(), timeout_secs: None }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CodecBackend {
    /// ffmpeg when it runs, otherwise the built-in decoder.
    #[default]
    Auto,
    Ffmpeg,
    Native,
}

impl std::str::FromStr for CodecBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(CodecBackend::Auto),
            "ffmpeg" => Ok(CodecBackend::Ffmpeg),
            "native" => Ok(CodecBackend::Native),
            other => Err(format!("unknown codec backend '{}' (expected auto, ffmpeg or native)", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CodecConfig {
    pub backend: CodecBackend,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            backend: CodecBackend::Auto,
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceConfig {
    /// Parent directory for the staging/output temp dirs (system temp when unset).
    pub root: Option<PathBuf>,
}

/// `<config_dir>/voice-scrub/settings.json`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(SETTINGS_FILE))
}

impl AppConfig {
    /// Load settings, then apply environment overrides.
    ///
    /// An explicit `path` must be readable and valid. The default location is
    /// optional and a broken file there only produces a warning.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(default) if default.exists() => Self::from_file(&default).unwrap_or_else(|e| {
                    log::warn!("{}; using default settings", e);
                    Self::default()
                }),
                _ => {
                    log::debug!("No settings file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config = serde_json::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        log::info!("Loaded settings from {:?}", path);
        Ok(config)
    }

    /// Override program paths from environment-style lookups.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(engine) = non_empty(ENV_ENGINE) {
            log::debug!("{} overrides engine program: {}", ENV_ENGINE, engine);
            self.engine.program = PathBuf::from(engine);
        }
        if let Some(ffmpeg) = non_empty(ENV_FFMPEG) {
            self.codec.ffmpeg = PathBuf::from(ffmpeg);
        }
        if let Some(ffprobe) = non_empty(ENV_FFPROBE) {
            self.codec.ffprobe = PathBuf::from(ffprobe);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.program, PathBuf::from("deep-filter"));
        assert!(config.engine.timeout().is_none());
        assert_eq!(config.codec.backend, CodecBackend::Auto);
        assert_eq!(config.denoise, DenoiseParams::default());
        assert!(config.workspace.root.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "engine": { "program": "/opt/df/deep-filter", "timeoutSecs": 600 },
                "codec": { "backend": "native" },
                "denoise": { "postfilter": true, "attenLimDb": 30 }
            }"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.engine.program, PathBuf::from("/opt/df/deep-filter"));
        assert_eq!(config.engine.timeout(), Some(Duration::from_secs(600)));
        assert!(config.engine.args.is_empty());
        assert_eq!(config.codec.backend, CodecBackend::Native);
        assert_eq!(config.codec.ffmpeg, PathBuf::from("ffmpeg"));
        assert!(config.denoise.postfilter);
        assert_eq!(config.denoise.atten_lim_db, Some(30.0));
        assert_eq!(config.denoise.pf_beta, None);
    }

    #[test]
    fn test_explicit_bad_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(Some(&path)), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            AppConfig::load(Some(&dir.path().join("missing.json"))),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            [(ENV_ENGINE, "/usr/local/bin/deep-filter"), (ENV_FFMPEG, "  "), (ENV_FFPROBE, "/x/ffprobe")]
                .into_iter()
                .collect();
        let mut config = AppConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.engine.program, PathBuf::from("/usr/local/bin/deep-filter"));
        assert_eq!(config.codec.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.codec.ffprobe, PathBuf::from("/x/ffprobe"));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("FFmpeg".parse::<CodecBackend>().unwrap(), CodecBackend::Ffmpeg);
        assert!("gstreamer".parse::<CodecBackend>().is_err());
    }

    #[test]
    fn test_zero_timeout_is_unbounded() {
        let engine = EngineConfig { timeout_secs: Some(0), ..Default::default() };
        assert!(engine.timeout().is_none());
    }
}
