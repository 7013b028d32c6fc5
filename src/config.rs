//! Handles application configuration loading and management.
//!
//! This module defines the `AppConfig` struct which holds the info service
//! address, the video URL mode and the initial overlay settings. It provides
//! `load_config` to read these settings from the `[settings]` section of an
//! INI file. Every key is optional; the defaults describe a frame talking to an
//! info service on localhost.

use configparser::ini::Ini;
use super::errors::ConfigError;
use log::{info, debug, error, warn};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ambient.conf";
/// Info endpoint used when the configuration does not name one.
pub const DEFAULT_INFO_URL: &str = "http://localhost:8000/info/";

const SECTION: &str = "settings";

/// Holds the application's configuration parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    /// Step-1 endpoint of the metadata service (`GET` returns `{"url": ...}`).
    pub info_url: String,
    /// Request the transcoded `/bestFit` variant for videos instead of the raw file.
    pub use_video_best_fit: bool,
    /// Initial state of the name/keywords overlay.
    pub show_overlay: bool,
    /// Initial state of the detailed metadata section inside the overlay.
    pub show_detailed_metadata: bool,
    pub fullscreen: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            info_url: DEFAULT_INFO_URL.to_string(),
            use_video_best_fit: false,
            show_overlay: false,
            show_detailed_metadata: false,
            fullscreen: true,
        }
    }
}

impl AppConfig {
    /// Parses configuration from INI text.
    #[must_use = "parsing configuration can fail, the Result must be handled"]
    pub fn from_ini_str(content: &str) -> Result<AppConfig, ConfigError> {
        let mut ini = Ini::new();
        ini.read(content.to_string()).map_err(ConfigError::Parse)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();

        let info_url = match ini.get(SECTION, "info_url") {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            Some(_) => return Err(ConfigError::MissingKey("info_url".to_string())),
            None => defaults.info_url,
        };
        url::Url::parse(&info_url).map_err(|_| ConfigError::InvalidValue {
            key: "info_url".to_string(),
            value: info_url.clone(),
        })?;
        debug!("Loaded config value for key 'info_url': {}", info_url);

        let config = AppConfig {
            info_url,
            use_video_best_fit: get_flag(ini, "use_video_best_fit", defaults.use_video_best_fit)?,
            show_overlay: get_flag(ini, "show_overlay", defaults.show_overlay)?,
            show_detailed_metadata: get_flag(
                ini,
                "show_detailed_metadata",
                defaults.show_detailed_metadata,
            )?,
            fullscreen: get_flag(ini, "fullscreen", defaults.fullscreen)?,
        };
        Ok(config)
    }
}

fn get_flag(ini: &Ini, key: &str, default: bool) -> Result<bool, ConfigError> {
    match ini.getboolcoerce(SECTION, key) {
        Ok(Some(value)) => {
            debug!("Loaded config value for key '{}': {}", key, value);
            Ok(value)
        }
        Ok(None) => Ok(default),
        Err(_) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: ini.get(SECTION, key).unwrap_or_default(),
        }),
    }
}

/// Loads application configuration from the specified INI file path.
///
/// # Errors
/// Returns `ConfigError::Io` if the file cannot be read, `ConfigError::Parse`
/// if it is malformed and `ConfigError::InvalidValue` for values of the wrong type.
#[must_use = "loading configuration can fail, the Result must be handled"]
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Attempting to load config from: {}", path);
    let content = std::fs::read_to_string(path).map_err(|e| {
        error!("Error reading config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    let config = AppConfig::from_ini_str(&content).map_err(|e| {
        error!("Error in config file '{}': {}", path, e);
        e
    })?;
    info!("Configuration loaded successfully from {}: {:?}", path, config);
    Ok(config)
}

/// Loads the configuration, falling back to defaults when the file does not exist.
///
/// A file that exists but is broken is still an error: silently ignoring a typo
/// in `info_url` would leave the frame polling the wrong host forever.
pub fn load_config_or_default(path: &str) -> Result<AppConfig, ConfigError> {
    match load_config(path) {
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file '{}' not found, using defaults.", path);
            Ok(AppConfig::default())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_settings_use_defaults() {
        let config = AppConfig::from_ini_str("[settings]\n").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn reads_all_keys() {
        let config = AppConfig::from_ini_str(
            "[settings]\n\
             info_url = http://frame.local:9000/info/\n\
             use_video_best_fit = yes\n\
             show_overlay = true\n\
             show_detailed_metadata = 1\n\
             fullscreen = false\n",
        )
        .unwrap();
        assert_eq!(config.info_url, "http://frame.local:9000/info/");
        assert!(config.use_video_best_fit);
        assert!(config.show_overlay);
        assert!(config.show_detailed_metadata);
        assert!(!config.fullscreen);
    }

    #[test]
    fn rejects_bad_flag() {
        let err = AppConfig::from_ini_str("[settings]\nshow_overlay = sometimes\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "show_overlay"));
    }

    #[test]
    fn rejects_unparseable_info_url() {
        let err = AppConfig::from_ini_str("[settings]\ninfo_url = not a url\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.conf");
        let config = load_config_or_default(path.to_str().unwrap()).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[settings]\ninfo_url = http://10.0.0.2/info/").unwrap();
        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.info_url, "http://10.0.0.2/info/");
    }
}
