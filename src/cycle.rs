//! The presentation cycle.
//!
//! `AcquireNext → Resolve → Dispatch → Dwell → AcquireNext`, forever. Every
//! iteration ends in a `CycleOutcome`; failures only cost a penalty delay.

use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;

use crate::dwell::play_video;
use crate::errors::AppError;
use crate::info_client::{acquire_descriptor, InfoSource};
use crate::model::{CycleOutcome, CycleState, MediaKind};
use crate::overlay::{refresh_overlay, Overlay, OverlaySettings};
use crate::renderer::CrossfadeRenderer;
use crate::resolver::ResolveOptions;
use crate::video::VideoSurface;

/// Wait after an iteration that showed nothing.
pub const PENALTY_DELAY: Duration = Duration::from_millis(3000);
pub const ANIMATION_DISPLAY: Duration = Duration::from_millis(10_000);
pub const STATIC_DISPLAY: Duration = Duration::from_millis(11_000);

pub struct CycleEngine {
    source: Arc<dyn InfoSource>,
    info_url: String,
    options: ResolveOptions,
    renderer: CrossfadeRenderer,
    video: Box<dyn VideoSurface>,
    overlay: Arc<dyn Overlay>,
    settings: Arc<OverlaySettings>,
}

impl CycleEngine {
    pub fn new(
        source: Arc<dyn InfoSource>,
        info_url: impl Into<String>,
        options: ResolveOptions,
        renderer: CrossfadeRenderer,
        video: Box<dyn VideoSurface>,
        overlay: Arc<dyn Overlay>,
        settings: Arc<OverlaySettings>,
    ) -> Self {
        Self { source, info_url: info_url.into(), options, renderer, video, overlay, settings }
    }

    /// Runs the cycle until the task is dropped.
    pub async fn run(mut self, mut state: CycleState) {
        info!("Presentation cycle started against {}", self.info_url);
        loop {
            let outcome = self.run_once(&mut state).await;
            info!("{} end.", outcome);
        }
    }

    /// One full iteration including its dwell or penalty wait.
    pub async fn run_once(&mut self, state: &mut CycleState) -> CycleOutcome {
        match self.iterate(state).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Cycle iteration failed: {}", e);
                tokio::time::sleep(PENALTY_DELAY).await;
                CycleOutcome::Error
            }
        }
    }

    async fn iterate(&mut self, state: &mut CycleState) -> Result<CycleOutcome, AppError> {
        let descriptor = match state.prefetch.take_ready().await {
            Some(d) => Some(d),
            None => acquire_descriptor(self.source.as_ref(), &self.info_url, self.options).await,
        };
        let Some(descriptor) = descriptor else {
            tokio::time::sleep(PENALTY_DELAY).await;
            return Ok(CycleOutcome::NoData);
        };
        if !descriptor.kind.is_dispatchable() {
            debug!("No usable media type for {}", descriptor.media_url);
            tokio::time::sleep(PENALTY_DELAY).await;
            return Ok(CycleOutcome::NoType);
        }

        let kind = descriptor.kind;
        match kind {
            MediaKind::Video => {
                self.renderer.hide_images();
                let url = descriptor.media_url.clone();
                state.current = Some(descriptor);
                self.refresh_overlay(state);
                play_video(self.video.as_mut(), &url, &mut state.video_temp_loop).await?;
            }
            _ => {
                let is_animated = kind == MediaKind::AnimatedImage;
                self.renderer
                    .show_still(&descriptor.media_url, is_animated, &mut state.active_set)
                    .await;
                state.prefetch.start(self.source.clone(), self.info_url.clone(), self.options);
                state.current = Some(descriptor);
                self.refresh_overlay(state);
                let display = if is_animated { ANIMATION_DISPLAY } else { STATIC_DISPLAY };
                tokio::time::sleep(display).await;
            }
        }
        Ok(CycleOutcome::Shown(kind))
    }

    fn refresh_overlay(&self, state: &CycleState) {
        refresh_overlay(self.overlay.as_ref(), &self.settings, state.current.as_ref());
    }
}
