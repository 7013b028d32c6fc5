//! Turns an info record into a `MediaDescriptor`.
//!
//! The content address is rooted at the info service's own origin under
//! `/pgapi/gallery/content/`. Still images ask the server for its pre-scaled
//! `/1080` variant; animated PNGs and videos are requested as-is so the
//! animation and encoding survive.

use log::{debug, warn};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::model::{InfoRecord, MediaDescriptor, MediaKind};

/// Path under the service origin that serves gallery content.
pub const CONTENT_PATH: &str = "/pgapi/gallery/content/";
/// Suffix selecting the server-side scaled, web-friendly image variant.
pub const SCALED_SUFFIX: &str = "/1080";
/// Suffix selecting the server-side transcoded video variant.
pub const BEST_FIT_SUFFIX: &str = "/bestFit";

const RASTER_EXTENSIONS: [&str; 9] =
    ["heic", "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif"];

/// Keyword marking a PNG as animated.
const APNG_KEYWORD: &str = "apng";

/// Characters escaped the way `encodeURIComponent` escapes them.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Static switches that influence address construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Use the `/bestFit` transcoded variant for videos.
    pub use_video_best_fit: bool,
}

/// Media kind from a file extension alone (case-insensitive, without the dot).
pub fn kind_from_extension(ext: &str, is_apng: bool) -> MediaKind {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" | "heic" => MediaKind::StillImage,
        "png" if is_apng => MediaKind::AnimatedImage,
        "png" => MediaKind::StillImage,
        "gif" => MediaKind::AnimatedImage,
        "mp4" | "webm" | "ogg" | "mkv" => MediaKind::Video,
        _ => MediaKind::Unknown,
    }
}

/// Keywords from `metadata.keywords`: strings only, `|`-bearing entries dropped,
/// trimmed and lower-cased, order preserved.
pub fn normalize_keywords(metadata: Option<&serde_json::Value>) -> Vec<String> {
    metadata
        .and_then(|m| m.get("keywords"))
        .and_then(|k| k.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|k| k.as_str())
                .filter(|k| !k.contains('|'))
                .map(|k| k.trim().to_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

/// Cleaned path segments for a record: directory path, directory name, file name.
pub fn path_segments(record: &InfoRecord) -> Vec<String> {
    let dir_path = record.directory.as_ref().and_then(|d| d.path.as_deref()).unwrap_or("");
    let dir_name = record.directory.as_ref().and_then(|d| d.name.as_deref()).unwrap_or("");
    let file_name = record.name.as_deref().unwrap_or("");

    let dir_path = dir_path.trim().replace('\\', "/");
    dir_path
        .trim_matches('/')
        .split('/')
        .chain([dir_name.trim(), file_name.trim()])
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "." && *s != "./")
        .map(str::to_string)
        .collect()
}

/// Resolves an info record fetched from `info_url` into a descriptor.
///
/// Returns `None` when the record has no usable file name or `info_url` has
/// no tuple origin. An unrecognised extension still yields a descriptor, with
/// `MediaKind::Unknown`; the cycle refuses to dispatch it.
pub fn resolve(
    info_url: &str,
    record: &InfoRecord,
    options: ResolveOptions,
) -> Option<MediaDescriptor> {
    let file_name = record.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;

    let origin = match Url::parse(info_url) {
        Ok(url) if url.origin().is_tuple() => url.origin().ascii_serialization(),
        Ok(_) | Err(_) => {
            warn!("Cannot build content address: info URL '{}' has no usable origin", info_url);
            return None;
        }
    };

    let encoded = path_segments(record)
        .iter()
        .map(|s| utf8_percent_encode(s, URI_COMPONENT).to_string())
        .collect::<Vec<_>>()
        .join("/");
    let base = format!("{}{}{}", origin, CONTENT_PATH, encoded);

    let keywords = normalize_keywords(record.metadata.as_ref());
    let is_apng = keywords.iter().any(|k| k == APNG_KEYWORD);
    let ext = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    let mut kind = kind_from_extension(ext, is_apng);

    // Any raster image goes through the server-side converter unless it is an
    // APNG, whose animation the converter would drop.
    let media_url = match kind {
        MediaKind::Video if options.use_video_best_fit => format!("{}{}", base, BEST_FIT_SUFFIX),
        MediaKind::Video => base,
        _ if is_raster_extension(ext) && !is_apng => format!("{}{}", base, SCALED_SUFFIX),
        _ => base,
    };

    if kind == MediaKind::Unknown && looks_like_converted_image(file_name, &media_url) {
        debug!(
            "No kind for extension '{}', treating '{}' as a converted still image",
            ext, file_name
        );
        kind = MediaKind::StillImage;
    }

    debug!("Resolved '{}' to {:?} at {}", file_name, kind, media_url);
    Some(MediaDescriptor {
        media_url,
        kind,
        display_name: Some(file_name.to_string()),
        keywords,
        metadata: record.metadata.clone(),
    })
}

/// Extensions the server can convert to its scaled `/1080` variant.
pub fn is_raster_extension(ext: &str) -> bool {
    RASTER_EXTENSIONS.iter().any(|r| r.eq_ignore_ascii_case(ext))
}

fn looks_like_converted_image(file_name: &str, media_url: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".heic")
        || media_url.to_ascii_lowercase().contains(".heic")
        || media_url.ends_with(SCALED_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DirectoryRef;
    use serde_json::json;

    const INFO: &str = "http://svc/item/42";

    fn record(name: &str, keywords: &[&str]) -> InfoRecord {
        InfoRecord {
            name: Some(name.to_string()),
            directory: Some(DirectoryRef {
                path: Some("/albums/2024/".into()),
                name: Some("trip".into()),
            }),
            metadata: Some(json!({ "keywords": keywords })),
        }
    }

    fn resolve_default(rec: &InfoRecord) -> MediaDescriptor {
        resolve(INFO, rec, ResolveOptions::default()).expect("descriptor")
    }

    #[test]
    fn supported_extensions_have_a_kind() {
        let extensions =
            ["jpg", "jpeg", "png", "gif", "heic", "mp4", "webm", "ogg", "mkv", "JPG", "Mp4"];
        for ext in extensions {
            let d = resolve_default(&record(&format!("file.{}", ext), &[]));
            assert_ne!(d.kind, MediaKind::Unknown, "extension {}", ext);
        }
    }

    #[test]
    fn unsupported_extensions_are_unknown() {
        for ext in ["txt", "pdf", "mov"] {
            let d = resolve_default(&record(&format!("file.{}", ext), &[]));
            assert_eq!(d.kind, MediaKind::Unknown, "extension {}", ext);
            assert!(!d.media_url.ends_with(SCALED_SUFFIX));
        }
    }

    #[test]
    fn other_raster_formats_are_scaled_stills() {
        for ext in ["webp", "bmp", "tiff", "tif", "TIF"] {
            let d = resolve_default(&record(&format!("pic.{}", ext), &[]));
            assert_eq!(d.kind, MediaKind::StillImage, "extension {}", ext);
            assert!(d.media_url.ends_with(&format!("/pic.{}/1080", ext)));
        }
    }

    #[test]
    fn apng_keyword_keeps_any_raster_unscaled() {
        let d = resolve_default(&record("anim.webp", &["apng"]));
        assert!(d.media_url.ends_with("/anim.webp"));
        // Without the scaled suffix nothing marks it as a still image.
        assert_eq!(d.kind, MediaKind::Unknown);
    }

    #[test]
    fn png_with_apng_keyword_is_animated_and_unscaled() {
        let d = resolve_default(&record("loop.png", &["nature", "APNG"]));
        assert_eq!(d.kind, MediaKind::AnimatedImage);
        assert!(!d.media_url.ends_with(SCALED_SUFFIX));
        assert_eq!(d.keywords, vec!["nature", "apng"]);
    }

    #[test]
    fn plain_png_is_still_and_scaled() {
        let d = resolve_default(&record("shot.png", &["nature"]));
        assert_eq!(d.kind, MediaKind::StillImage);
        assert!(d.media_url.ends_with("/shot.png/1080"));
    }

    #[test]
    fn video_never_gets_scaled_suffix() {
        let d = resolve_default(&record("clip.mp4", &["apng", "1080"]));
        assert_eq!(d.kind, MediaKind::Video);
        assert!(d.media_url.ends_with("/clip.mp4"));

        let options = ResolveOptions { use_video_best_fit: true };
        let best = resolve(INFO, &record("clip.webm", &[]), options).unwrap();
        assert!(best.media_url.ends_with("/clip.webm/bestFit"));
    }

    #[test]
    fn address_uses_service_origin_and_encoded_segments() {
        let rec = InfoRecord {
            name: Some("my photo #1.jpg".into()),
            directory: Some(DirectoryRef {
                path: Some("\\Family\\./Summer//".into()),
                name: Some("Día 1".into()),
            }),
            metadata: None,
        };
        let info = "http://gallery.local:8000/info/abc?x=1";
        let d = resolve(info, &rec, ResolveOptions::default()).unwrap();
        assert_eq!(
            d.media_url,
            "http://gallery.local:8000/pgapi/gallery/content/Family/Summer/D%C3%ADa%201/my%20photo%20%231.jpg/1080"
        );
    }

    #[test]
    fn keywords_drop_pipes_and_are_normalised() {
        let meta = json!({ "keywords": ["  Sunset ", "a|b", 7, "BEACH"] });
        assert_eq!(normalize_keywords(Some(&meta)), vec!["sunset", "beach"]);
        assert!(normalize_keywords(None).is_empty());
    }

    #[test]
    fn heic_hint_in_address_falls_back_to_still() {
        let rec = InfoRecord {
            name: Some("IMG_0001.HEIC.original".into()),
            directory: None,
            metadata: None,
        };
        let d = resolve_default(&rec);
        assert_eq!(d.kind, MediaKind::StillImage);
    }

    #[test]
    fn missing_name_or_bad_origin_is_absent() {
        let nameless = InfoRecord { name: Some("   ".into()), ..InfoRecord::default() };
        assert!(resolve(INFO, &nameless, ResolveOptions::default()).is_none());
        assert!(resolve(INFO, &InfoRecord::default(), ResolveOptions::default()).is_none());
        assert!(resolve("not-a-url", &record("a.jpg", &[]), ResolveOptions::default()).is_none());
    }

    #[test]
    fn heic_end_to_end_address() {
        let rec = InfoRecord { name: Some("photo.HEIC".into()), directory: None, metadata: None };
        let d = resolve_default(&rec);
        assert_eq!(d.kind, MediaKind::StillImage);
        assert_eq!(d.media_url, "http://svc/pgapi/gallery/content/photo.HEIC/1080");
        assert!(d.keywords.is_empty());
    }
}
