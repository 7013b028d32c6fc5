//! Video playback surface.
//!
//! `FfmpegVideoSurface` opens the content URL with `ffmpeg-next` on a dedicated
//! decoder thread and publishes RGBA frames into the scene. One decoded stream
//! feeds both video layers: the background layer always loops, the foreground
//! layer loops only while the temporary loop is on and is hidden when it ends
//! naturally.

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as ScalingContext, flag::Flags};
use ffmpeg::util::frame::video::Video;
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::errors::MediaError;
use crate::scene::{SceneHandle, VideoFrame};

const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Controls the single video element of the display.
pub trait VideoSurface: Send {
    /// Starts playback of `url` from the beginning and makes the video layers
    /// visible. The receiver yields the stream duration in seconds once known
    /// (`NaN` when the container does not report one). Starting a new stream
    /// drops the sender of the previous one.
    fn start(&mut self, url: &str) -> Result<oneshot::Receiver<f64>, MediaError>;

    /// Makes the foreground restart at its natural end instead of stopping.
    fn set_temp_loop(&mut self, on: bool);

    /// Stops playback, rewinds, and hides both video layers.
    fn stop(&mut self);
}

struct Playback {
    url: String,
    stop: Arc<AtomicBool>,
    // Detached on drop: the thread notices the stop flag within one frame and
    // the stream generation keeps its late frames off screen.
    _thread: JoinHandle<()>,
}

/// `VideoSurface` decoding with ffmpeg into the shared scene.
pub struct FfmpegVideoSurface {
    scene: SceneHandle,
    temp_loop: Arc<AtomicBool>,
    playback: Option<Playback>,
    generation: u64,
}

impl FfmpegVideoSurface {
    pub fn new(scene: SceneHandle) -> Self {
        Self { scene, temp_loop: Arc::new(AtomicBool::new(false)), playback: None, generation: 0 }
    }

    fn halt_current(&mut self) {
        if let Some(playback) = self.playback.take() {
            debug!("Stopping decoder thread for {}", playback.url);
            playback.stop.store(true, Ordering::SeqCst);
        }
    }
}

impl VideoSurface for FfmpegVideoSurface {
    fn start(&mut self, url: &str) -> Result<oneshot::Receiver<f64>, MediaError> {
        self.halt_current();
        self.temp_loop.store(false, Ordering::SeqCst);
        self.generation += 1;
        let generation = self.generation;
        info!("Starting video playback of {} (stream {})", url, generation);

        self.scene.update(|s| {
            for layer in [&mut s.video_background, &mut s.video_foreground] {
                layer.stream_id = generation;
                layer.visible = true;
                layer.frame = None;
            }
        });

        let (duration_tx, duration_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let worker = DecodeWorker {
            url: url.to_string(),
            generation,
            scene: self.scene.clone(),
            stop: stop.clone(),
            temp_loop: self.temp_loop.clone(),
        };
        let thread = thread::Builder::new()
            .name(format!("video-decoder-{}", generation))
            .spawn(move || {
                let url = worker.url.clone();
                if let Err(e) = worker.run(duration_tx) {
                    error!("Video decoding for {} failed: {}", url, e);
                }
                debug!("Video decoding thread for {} finished.", url);
            })
            .map_err(|e| MediaError::Generic(format!("Decoder thread for {} failed: {}", url, e)))?;
        self.playback = Some(Playback { url: url.to_string(), stop, _thread: thread });
        Ok(duration_rx)
    }

    fn set_temp_loop(&mut self, on: bool) {
        debug!("Video temporary loop {}", if on { "on" } else { "off" });
        self.temp_loop.store(on, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.halt_current();
        self.temp_loop.store(false, Ordering::SeqCst);
        self.scene.update(|s| {
            for layer in [&mut s.video_background, &mut s.video_foreground] {
                layer.visible = false;
                layer.frame = None;
            }
        });
    }
}

impl Drop for FfmpegVideoSurface {
    fn drop(&mut self) {
        self.halt_current();
    }
}

struct DecodeWorker {
    url: String,
    generation: u64,
    scene: SceneHandle,
    stop: Arc<AtomicBool>,
    temp_loop: Arc<AtomicBool>,
}

impl DecodeWorker {
    fn run(self, duration_tx: oneshot::Sender<f64>) -> Result<(), MediaError> {
        // On an open failure the sender is dropped and the dwell falls back to
        // the unknown-duration branch.
        let mut ictx = ffmpeg::format::input(&self.url)?;
        let duration_secs = match ictx.duration() {
            d if d > 0 => d as f64 / ffmpeg::ffi::AV_TIME_BASE as f64,
            _ => f64::NAN,
        };
        debug!("Video {} reports duration {:.3}s", self.url, duration_secs);
        // The receiver is gone if playback was already superseded.
        let _ = duration_tx.send(duration_secs);

        let input_stream = ictx.streams().best(Type::Video).ok_or_else(|| {
            error!("FFmpeg: No video stream found for {}", self.url);
            MediaError::Ffmpeg(ffmpeg::Error::StreamNotFound)
        })?;
        let stream_index = input_stream.index();
        let frame_rate = match f64::from(input_stream.avg_frame_rate()) {
            fps if fps.is_finite() && fps > 0.0 => fps,
            _ => DEFAULT_FRAME_RATE,
        };
        let frame_interval = Duration::from_secs_f64(1.0 / frame_rate);

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())?;
        let mut decoder = context.decoder().video()?;
        let mut scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGBA,
            decoder.width(),
            decoder.height(),
            Flags::BILINEAR,
        )?;
        debug!(
            "Decoder for {} ready: {}x{} {:?} at {:.2} fps",
            self.url,
            decoder.width(),
            decoder.height(),
            decoder.format(),
            frame_rate
        );

        let mut pacer = FramePacer::new(frame_interval);
        let mut seq = 0u64;
        let mut foreground_live = true;
        let mut decoded = Video::empty();

        loop {
            for (stream, packet) in ictx.packets() {
                if self.stopped() {
                    return Ok(());
                }
                if stream.index() != stream_index {
                    continue;
                }
                decoder.send_packet(&packet)?;
                let ran_dry = drain_frames(
                    &self.stop,
                    || receive_frame(&mut decoder, &mut scaler, &mut decoded, &mut seq),
                    |frame| {
                        self.publish(frame, foreground_live);
                        pacer.wait();
                    },
                )?;
                if !ran_dry {
                    return Ok(());
                }
            }

            decoder.send_eof()?;
            let ran_dry = drain_frames(
                &self.stop,
                || receive_frame(&mut decoder, &mut scaler, &mut decoded, &mut seq),
                |frame| {
                    self.publish(frame, foreground_live);
                    pacer.wait();
                },
            )?;
            if !ran_dry || self.stopped() {
                return Ok(());
            }

            let action = end_of_stream(foreground_live, self.temp_loop.load(Ordering::SeqCst));
            match action {
                EndAction::HideForeground => {
                    info!("Video {} reached its end, hiding foreground", self.url);
                    self.set_foreground_visible(false);
                }
                EndAction::ReviveForeground => {
                    info!("Temporary loop on after {} ended, showing foreground again", self.url);
                    self.set_foreground_visible(true);
                }
                EndAction::Loop => trace!("Looping video {}", self.url),
            }
            foreground_live = action.foreground_live_after(foreground_live);
            ictx.seek(0, ..)?;
            decoder.flush();
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_foreground_visible(&self, visible: bool) {
        let generation = self.generation;
        self.scene.update(|s| {
            if s.video_foreground.stream_id == generation {
                s.video_foreground.visible = visible;
            }
        });
    }

    fn publish(&self, frame: VideoFrame, foreground: bool) {
        let generation = self.generation;
        let frame = Arc::new(frame);
        self.scene.update(|s| {
            if s.video_background.stream_id == generation {
                s.video_background.frame = Some(frame.clone());
            }
            if foreground && s.video_foreground.stream_id == generation {
                s.video_foreground.frame = Some(frame);
            }
        });
    }
}

/// Hands decoded frames from `next` to `emit` until the decoder has nothing
/// more to give. The stop flag is checked before every frame; returns
/// `Ok(false)` if playback was stopped part way.
fn drain_frames<T, E>(
    stop: &AtomicBool,
    mut next: impl FnMut() -> Result<Option<T>, E>,
    mut emit: impl FnMut(T),
) -> Result<bool, E> {
    loop {
        if stop.load(Ordering::SeqCst) {
            return Ok(false);
        }
        match next()? {
            Some(frame) => emit(frame),
            None => return Ok(true),
        }
    }
}

fn receive_frame(
    decoder: &mut ffmpeg::decoder::Video,
    scaler: &mut ScalingContext,
    decoded: &mut Video,
    seq: &mut u64,
) -> Result<Option<VideoFrame>, MediaError> {
    if decoder.receive_frame(decoded).is_err() {
        return Ok(None);
    }
    *seq += 1;
    convert_frame(scaler, decoded, *seq).map(Some)
}

/// What the decoder does with the foreground layer when the stream runs out.
/// The background layer restarts in every case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EndAction {
    /// Leave the foreground as it is, live or hidden.
    Loop,
    /// Natural end without a temporary loop: stop feeding and hide it.
    HideForeground,
    /// The temporary loop came on after the foreground was already hidden.
    ReviveForeground,
}

impl EndAction {
    fn foreground_live_after(self, was_live: bool) -> bool {
        match self {
            EndAction::HideForeground => false,
            EndAction::ReviveForeground => true,
            EndAction::Loop => was_live,
        }
    }
}

/// Decides the foreground's fate at end of stream. The temporary loop flag is
/// read on every pass, so a loop requested after the first end still applies.
fn end_of_stream(foreground_live: bool, temp_loop: bool) -> EndAction {
    match (foreground_live, temp_loop) {
        (true, false) => EndAction::HideForeground,
        (false, true) => EndAction::ReviveForeground,
        _ => EndAction::Loop,
    }
}

fn convert_frame(
    scaler: &mut ScalingContext,
    decoded: &Video,
    seq: u64,
) -> Result<VideoFrame, MediaError> {
    let mut rgba = Video::empty();
    scaler.run(decoded, &mut rgba).map_err(|e| {
        warn!("FFmpeg frame scaling failed: {}", e);
        MediaError::Ffmpeg(e)
    })?;
    let (width, height) = (rgba.width(), rgba.height());
    let rgba = pack_rows(rgba.data(0), rgba.stride(0), width as usize * 4, height as usize);
    Ok(VideoFrame { seq, width, height, rgba })
}

/// Copies `height` rows of `row_bytes` out of a plane whose rows are `stride`
/// bytes apart.
fn pack_rows(plane: &[u8], stride: usize, row_bytes: usize, height: usize) -> Vec<u8> {
    if stride == row_bytes {
        return plane[..row_bytes * height].to_vec();
    }
    let mut out = Vec::with_capacity(row_bytes * height);
    for row in plane.chunks(stride).take(height) {
        out.extend_from_slice(&row[..row_bytes]);
    }
    out
}

/// Sleeps so that frames go out at a fixed interval, without drifting when
/// decoding is slow.
struct FramePacer {
    interval: Duration,
    next: Instant,
}

impl FramePacer {
    fn new(interval: Duration) -> Self {
        Self { interval, next: Instant::now() }
    }

    fn wait(&mut self) {
        self.next += self.interval;
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        } else {
            // Running late; restart the schedule instead of bursting.
            self.next = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_rows_strips_padding() {
        // Two rows of one RGBA pixel, each padded to 8 bytes.
        let plane = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0];
        assert_eq!(pack_rows(&plane, 8, 4, 2), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn pack_rows_without_padding_is_a_copy() {
        let plane = [9u8; 16];
        assert_eq!(pack_rows(&plane, 8, 8, 2).len(), 16);
    }

    #[test]
    fn drain_stops_before_the_next_frame_once_flagged() {
        let stop = AtomicBool::new(false);
        let mut received = 0;
        let mut emitted = Vec::new();
        let ran_dry = drain_frames(
            &stop,
            || {
                received += 1;
                Ok::<_, MediaError>(Some(received))
            },
            |frame| {
                emitted.push(frame);
                if frame == 2 {
                    stop.store(true, Ordering::SeqCst);
                }
            },
        )
        .unwrap();
        assert!(!ran_dry);
        assert_eq!(emitted, vec![1, 2]);
        assert_eq!(received, 2);
    }

    #[test]
    fn drain_runs_dry_when_not_stopped() {
        let stop = AtomicBool::new(false);
        let mut pending = vec![3, 2, 1];
        let mut emitted = Vec::new();
        let next = || Ok::<_, MediaError>(pending.pop());
        let ran_dry = drain_frames(&stop, next, |f| emitted.push(f)).unwrap();
        assert!(ran_dry);
        assert_eq!(emitted, vec![1, 2, 3]);
    }

    #[test]
    fn natural_end_hides_foreground_without_temp_loop() {
        let action = end_of_stream(true, false);
        assert_eq!(action, EndAction::HideForeground);
        assert!(!action.foreground_live_after(true));
    }

    #[test]
    fn temp_loop_keeps_foreground_running() {
        let action = end_of_stream(true, true);
        assert_eq!(action, EndAction::Loop);
        assert!(action.foreground_live_after(true));
    }

    #[test]
    fn hidden_foreground_stays_hidden_while_background_loops() {
        let action = end_of_stream(false, false);
        assert_eq!(action, EndAction::Loop);
        assert!(!action.foreground_live_after(false));
    }

    #[test]
    fn late_temp_loop_revives_hidden_foreground() {
        let action = end_of_stream(false, true);
        assert_eq!(action, EndAction::ReviveForeground);
        assert!(action.foreground_live_after(false));
    }

    #[test]
    fn pacer_catches_up_when_late() {
        let mut pacer = FramePacer::new(Duration::from_millis(1));
        pacer.next = Instant::now() - Duration::from_secs(1);
        let before = Instant::now();
        pacer.wait();
        assert!(before.elapsed() < Duration::from_millis(500));
    }
}
