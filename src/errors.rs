//! Defines the custom error types used throughout the `ambient_rs` engine.
//!
//! Errors are grouped by concern: configuration loading, talking to the info
//! service, and media loading/decoding. Fetch errors never leave the info
//! client, which logs them and reports "no data"; `AppError` wraps the rest
//! for `main` and the cycle boundary, where every error is logged and turned
//! into a penalty delay.

use std::error::Error as StdError;
use std::fmt;

// --- ConfigError ---
/// Errors related to loading the INI configuration.
#[must_use = "a configuration error should be handled or propagated"]
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    Io(std::io::Error),
    /// The file content is not valid INI.
    Parse(String),
    /// A required configuration key was missing.
    MissingKey(String),
    /// A key was present but its value could not be interpreted.
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Configuration parse error: {}", e),
            ConfigError::MissingKey(key) => write!(f, "Missing configuration key: '{}'", key),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value '{}' for configuration key '{}'", value, key)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            _ => None,
        }
    }
}

// --- FetchError ---
/// Errors related to requests against the metadata/info service.
#[must_use = "a fetch error should be handled or propagated"]
#[derive(Debug)]
pub enum FetchError {
    /// Transport-level failure from `reqwest` (connect, timeout, body read).
    Reqwest(reqwest::Error),
    /// The response body was not the JSON we expected.
    SerdeJson(serde_json::Error),
    /// The service answered with a non-success status.
    HttpStatus { status: reqwest::StatusCode, url: String },
    /// A JSON document was missing a field the protocol requires (`url`, `result`).
    MissingField(&'static str),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Reqwest(e) => write!(f, "Info request error: {}", e),
            FetchError::SerdeJson(e) => write!(f, "Info JSON error: {}", e),
            FetchError::HttpStatus { status, url } => write!(f, "HTTP {} from {}", status, url),
            FetchError::MissingField(field) => write!(f, "Info response is missing '{}'", field),
        }
    }
}

impl StdError for FetchError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            FetchError::Reqwest(e) => Some(e),
            FetchError::SerdeJson(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Reqwest(err)
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::SerdeJson(err)
    }
}

// --- MediaError ---
/// Errors related to loading and decoding media (images and video streams).
#[must_use = "a media error should be handled or propagated"]
#[derive(Debug)]
pub enum MediaError {
    /// Decoding failed in the `image` crate.
    Image(image::ImageError),
    /// Opening or decoding a stream failed in `ffmpeg-next`.
    Ffmpeg(ffmpeg_next::Error),
    /// Downloading the media bytes failed.
    Download(reqwest::Error),
    Generic(String),
    /// The media format is not supported by the loader.
    UnsupportedFormat(String),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::Image(e) => write!(f, "Image processing error: {}", e),
            MediaError::Ffmpeg(e) => write!(f, "FFmpeg error: {}", e),
            MediaError::Download(e) => write!(f, "Media download error: {}", e),
            MediaError::Generic(s) => write!(f, "Media error: {}", s),
            MediaError::UnsupportedFormat(s) => write!(f, "Unsupported media format: {}", s),
        }
    }
}

impl StdError for MediaError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            MediaError::Image(e) => Some(e),
            MediaError::Ffmpeg(e) => Some(e),
            MediaError::Download(e) => Some(e),
            _ => None,
        }
    }
}

impl From<image::ImageError> for MediaError {
    fn from(err: image::ImageError) -> Self { MediaError::Image(err) }
}
impl From<ffmpeg_next::Error> for MediaError {
    fn from(err: ffmpeg_next::Error) -> Self { MediaError::Ffmpeg(err) }
}
impl From<reqwest::Error> for MediaError {
    fn from(err: reqwest::Error) -> Self { MediaError::Download(err) }
}

// --- AppError (Top-level error enum) ---
/// A top-level error type that can encompass any error within the engine.
#[must_use = "an application error should be handled or propagated"]
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Media(MediaError),
    Generic(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "Application Configuration Error: {}", e),
            AppError::Media(e) => write!(f, "Application Media Error: {}", e),
            AppError::Generic(s) => write!(f, "Application Error: {}", s),
        }
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Media(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self { AppError::Config(err) }
}
impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self { AppError::Media(err) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_surfaces_through_app_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let app: AppError = ConfigError::Io(io).into();
        assert!(matches!(app, AppError::Config(ConfigError::Io(_))));
        assert!(app.to_string().starts_with("Application Configuration Error"));
        assert!(app.source().is_some());
    }

    #[test]
    fn media_error_surfaces_through_app_error() {
        let app: AppError = MediaError::UnsupportedFormat("codec".into()).into();
        assert_eq!(
            app.to_string(),
            "Application Media Error: Unsupported media format: codec"
        );
    }

    #[test]
    fn fetch_error_names_the_missing_field() {
        let err = FetchError::MissingField("url");
        assert_eq!(err.to_string(), "Info response is missing 'url'");
        assert!(err.source().is_none());
    }
}
