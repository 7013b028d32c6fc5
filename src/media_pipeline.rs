//! Handles media fetching and decoding for the image surfaces.
//!
//! This module is responsible for:
//! - Downloading image bytes from a resolved content address (no retries; a
//!   failed load goes through the renderer's degraded swap).
//! - Decoding stills and animations (GIF, APNG, animated WebP) into RGBA frames
//!   the window can upload as textures.

use async_trait::async_trait;
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, Frame, ImageFormat};
use log::{debug, error, trace};
use reqwest::Client as ReqwestClient;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::errors::MediaError;

static NEXT_PICTURE_ID: AtomicU64 = AtomicU64::new(1);

/// One RGBA frame of a picture and how long it stays up.
#[derive(Debug)]
pub struct PictureFrame {
    pub rgba: Vec<u8>,
    pub delay: Duration,
}

/// A decoded image. Stills have exactly one frame.
#[derive(Debug)]
pub struct Picture {
    /// Process-unique id, used by the window as a texture cache key.
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub frames: Vec<PictureFrame>,
}

impl Picture {
    pub fn new(width: u32, height: u32, frames: Vec<PictureFrame>) -> Self {
        Self { id: NEXT_PICTURE_ID.fetch_add(1, Ordering::Relaxed), width, height, frames }
    }

    /// A single-frame picture.
    pub fn still(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self::new(width, height, vec![PictureFrame { rgba, delay: Duration::ZERO }])
    }

    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    /// Frame to show `elapsed` after the animation started, looping forever.
    pub fn frame_index_at(&self, elapsed: Duration) -> usize {
        if !self.is_animated() {
            return 0;
        }
        // Browsers clamp very short GIF delays; do the same so 0ms frames still advance.
        let delays: Vec<u128> = self.frames.iter().map(|f| f.delay.as_millis().max(20)).collect();
        let total: u128 = delays.iter().sum();
        let mut t = elapsed.as_millis() % total;
        for (i, d) in delays.iter().enumerate() {
            if t < *d {
                return i;
            }
            t -= d;
        }
        0
    }
}

/// Source of decoded pictures for the crossfade renderer.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Arc<Picture>, MediaError>;
}

/// Loads pictures over HTTP and decodes them on the blocking pool.
#[derive(Clone, Debug)]
pub struct HttpImageLoader {
    client: ReqwestClient,
}

impl HttpImageLoader {
    pub fn new(client: ReqwestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<Arc<Picture>, MediaError> {
        debug!("Loading image: {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            error!("Request error fetching image '{}': {:?}", url, e);
            MediaError::Download(e)
        })?;
        let response = response.error_for_status().map_err(|e| {
            error!("HTTP error fetching image '{}': {}", url, e);
            MediaError::Download(e)
        })?;
        let bytes = response.bytes().await.map_err(MediaError::Download)?;
        trace!("Downloaded {} bytes from {}", bytes.len(), url);

        let picture = tokio::task::spawn_blocking(move || decode_picture(&bytes))
            .await
            .map_err(|e| MediaError::Generic(format!("Decode task for {} failed: {}", url, e)))??;
        debug!(
            "Decoded {}x{} picture with {} frame(s) from {}",
            picture.width,
            picture.height,
            picture.frames.len(),
            url
        );
        Ok(Arc::new(picture))
    }
}

/// Decodes encoded image bytes, keeping every frame of animated formats.
pub fn decode_picture(bytes: &[u8]) -> Result<Picture, MediaError> {
    let format = image::guess_format(bytes)?;
    match format {
        ImageFormat::Gif => {
            let decoder = GifDecoder::new(Cursor::new(bytes))?;
            frames_to_picture(decoder.into_frames().collect_frames()?)
        }
        ImageFormat::Png => {
            let decoder = PngDecoder::new(Cursor::new(bytes))?;
            if decoder.is_apng()? {
                frames_to_picture(decoder.apng()?.into_frames().collect_frames()?)
            } else {
                decode_still(bytes)
            }
        }
        ImageFormat::WebP => {
            let decoder = WebPDecoder::new(Cursor::new(bytes))?;
            if decoder.has_animation() {
                frames_to_picture(decoder.into_frames().collect_frames()?)
            } else {
                decode_still(bytes)
            }
        }
        _ => decode_still(bytes),
    }
}

fn decode_still(bytes: &[u8]) -> Result<Picture, MediaError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Picture::still(width, height, rgba.into_raw()))
}

fn frames_to_picture(frames: Vec<Frame>) -> Result<Picture, MediaError> {
    let (width, height) = frames
        .first()
        .map(|f| f.buffer().dimensions())
        .ok_or_else(|| MediaError::UnsupportedFormat("animation without frames".to_string()))?;
    let frames = frames
        .into_iter()
        .map(|f| PictureFrame {
            delay: Duration::from(f.delay()),
            rgba: f.into_buffer().into_raw(),
        })
        .collect();
    Ok(Picture::new(width, height, frames))
}
