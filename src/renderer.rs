//! Double-buffered crossfade renderer for still and animated images.
//!
//! Two surface sets (A and B) each hold a cover and a contain layer. A static
//! image is loaded into the inactive set and then both sets flip visibility in a
//! single scene update, which the window animates as a crossfade. Animated
//! images replace the active set in place.

use log::{debug, error, info, trace};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::media_pipeline::{ImageLoader, Picture};
use crate::model::SurfaceSlot;
use crate::scene::{Layer, PanAxis, PanPosition, Scene, SceneHandle, SurfaceId};

/// How long a pan takes from one edge to the other; matches the still dwell.
pub const PAN_DURATION: Duration = Duration::from_millis(11_000);
const PAN_TICK: Duration = Duration::from_millis(33);

/// How a `show_still` call changed the screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    /// New set faded in, old set faded out, roles swapped.
    Crossfade,
    /// Load failed; sets swapped without fading and without content.
    Immediate,
    /// Animated content assigned to the active set.
    InPlace,
}

pub struct CrossfadeRenderer {
    scene: SceneHandle,
    loader: Arc<dyn ImageLoader>,
    pans: HashMap<SurfaceId, JoinHandle<()>>,
    pan_duration: Duration,
}

impl CrossfadeRenderer {
    pub fn new(scene: SceneHandle, loader: Arc<dyn ImageLoader>) -> Self {
        Self { scene, loader, pans: HashMap::new(), pan_duration: PAN_DURATION }
    }

    /// Shows an image, swapping `active` when a crossfade happens.
    pub async fn show_still(
        &mut self,
        url: &str,
        is_animated: bool,
        active: &mut SurfaceSlot,
    ) -> TransitionKind {
        if is_animated {
            self.show_animated(url, *active).await
        } else {
            self.show_static(url, active).await
        }
    }

    async fn show_animated(&mut self, url: &str, active: SurfaceSlot) -> TransitionKind {
        let picture = match self.loader.load(url).await {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Failed to load animated image {}: {}", url, e);
                None
            }
        };
        self.cancel_pans_of(active);
        self.scene.update(|s| {
            let set = s.set_mut(active);
            for surface in [&mut set.cover, &mut set.contain] {
                surface.source_url = Some(url.to_string());
                surface.picture = picture.clone();
                surface.visible = true;
                surface.fade = true;
                surface.pan = None;
            }
            hide_video(s);
        });
        info!("Showing animated image {} in set {:?}", url, active);
        TransitionKind::InPlace
    }

    async fn show_static(&mut self, url: &str, active: &mut SurfaceSlot) -> TransitionKind {
        let previous = *active;
        let next = previous.other();
        debug!("Preloading {} into set {:?}", url, next);

        let loaded = self.loader.load(url).await;
        let (picture, kind) = match loaded {
            Ok(p) => (Some(p), TransitionKind::Crossfade),
            Err(e) => {
                error!("Failed to load image {}: {}. Swapping without fade.", url, e);
                (None, TransitionKind::Immediate)
            }
        };
        let fade = kind == TransitionKind::Crossfade;

        self.scene.update(|s| {
            let incoming = s.set_mut(next);
            for surface in [&mut incoming.cover, &mut incoming.contain] {
                surface.source_url = Some(url.to_string());
                surface.picture = picture.clone();
                surface.visible = true;
                surface.fade = fade;
                surface.pan = None;
            }
            let outgoing = s.set_mut(previous);
            for surface in [&mut outgoing.cover, &mut outgoing.contain] {
                surface.visible = false;
                surface.fade = fade;
            }
            hide_video(s);
        });
        *active = next;

        self.cancel_pans_of(previous);
        if let Some(picture) = picture {
            self.start_pan(SurfaceId::new(next, Layer::Cover), &picture);
        }
        info!("Showing {} in set {:?} ({:?})", url, next, kind);
        kind
    }

    /// Hides every image surface and stops all pans, e.g. before a video.
    pub fn hide_images(&mut self) {
        self.cancel_all_pans();
        self.scene.update(|s| {
            for id in SurfaceId::all() {
                let surface = s.surface_mut(id);
                surface.visible = false;
                surface.pan = None;
            }
        });
    }

    /// Surfaces that currently have a running pan task.
    pub fn active_pans(&self) -> Vec<SurfaceId> {
        self.pans.iter().filter(|(_, task)| !task.is_finished()).map(|(id, _)| *id).collect()
    }

    fn start_pan(&mut self, id: SurfaceId, picture: &Picture) {
        let axis = PanAxis::for_size(picture.width, picture.height);
        trace!("Starting {:?} pan on {:?}", axis, id);
        let scene = self.scene.clone();
        let duration = self.pan_duration;
        let task = tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            let mut ticker = tokio::time::interval(PAN_TICK);
            loop {
                ticker.tick().await;
                let t = (started.elapsed().as_secs_f32() / duration.as_secs_f32()).min(1.0);
                scene.update(|s| s.surface_mut(id).pan = Some(PanPosition::at(axis, t)));
                if t >= 1.0 {
                    break;
                }
            }
        });
        if let Some(old) = self.pans.insert(id, task) {
            old.abort();
        }
    }

    fn cancel_pans_of(&mut self, slot: SurfaceSlot) {
        for layer in [Layer::Cover, Layer::Contain] {
            if let Some(task) = self.pans.remove(&SurfaceId::new(slot, layer)) {
                trace!("Cancelling pan on {:?}/{:?}", slot, layer);
                task.abort();
            }
        }
    }

    fn cancel_all_pans(&mut self) {
        for (_, task) in self.pans.drain() {
            task.abort();
        }
    }
}

impl Drop for CrossfadeRenderer {
    fn drop(&mut self) {
        self.cancel_all_pans();
    }
}

fn hide_video(s: &mut Scene) {
    s.video_background.visible = false;
    s.video_foreground.visible = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MediaError;
    use async_trait::async_trait;

    struct SizedLoader {
        width: u32,
        height: u32,
    }

    #[async_trait]
    impl ImageLoader for SizedLoader {
        async fn load(&self, url: &str) -> Result<Arc<Picture>, MediaError> {
            if url.contains("broken") {
                return Err(MediaError::Generic("404".into()));
            }
            let rgba = vec![0; (self.width * self.height * 4) as usize];
            Ok(Arc::new(Picture::still(self.width, self.height, rgba)))
        }
    }

    fn renderer(width: u32, height: u32) -> (CrossfadeRenderer, SceneHandle) {
        let scene = SceneHandle::new();
        (CrossfadeRenderer::new(scene.clone(), Arc::new(SizedLoader { width, height })), scene)
    }

    #[tokio::test(start_paused = true)]
    async fn static_images_alternate_sets() {
        let (mut r, scene) = renderer(4, 2);
        let mut active = SurfaceSlot::A;

        let transition = r.show_still("http://svc/1.jpg", false, &mut active).await;
        assert_eq!(transition, TransitionKind::Crossfade);
        assert_eq!(active, SurfaceSlot::B);
        assert_eq!(scene.snapshot().visible_sets(), vec![SurfaceSlot::B]);

        r.show_still("http://svc/2.jpg", false, &mut active).await;
        assert_eq!(active, SurfaceSlot::A);
        let snap = scene.snapshot();
        assert_eq!(snap.visible_sets(), vec![SurfaceSlot::A]);
        let contain_url = snap.set(SurfaceSlot::A).contain.source_url.as_deref();
        assert_eq!(contain_url, Some("http://svc/2.jpg"));
        assert!(snap.set(SurfaceSlot::B).cover.fade);
    }

    #[tokio::test(start_paused = true)]
    async fn pan_follows_new_cover_only() {
        let (mut r, scene) = renderer(4, 2);
        let mut active = SurfaceSlot::A;
        r.show_still("http://svc/1.jpg", false, &mut active).await;
        assert_eq!(r.active_pans(), vec![SurfaceId::new(SurfaceSlot::B, Layer::Cover)]);

        r.show_still("http://svc/2.jpg", false, &mut active).await;
        assert_eq!(r.active_pans(), vec![SurfaceId::new(SurfaceSlot::A, Layer::Cover)]);

        tokio::time::sleep(PAN_DURATION + Duration::from_millis(100)).await;
        let pan = scene.snapshot().set(SurfaceSlot::A).cover.pan.expect("pan position");
        assert_eq!(pan.axis, PanAxis::Horizontal);
        assert_eq!(pan.percent, 100.0);
        assert!(r.active_pans().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn portrait_pans_vertically() {
        let (mut r, scene) = renderer(2, 4);
        let mut active = SurfaceSlot::A;
        r.show_still("http://svc/p.jpg", false, &mut active).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let pan = scene.snapshot().set(SurfaceSlot::B).cover.pan.expect("pan position");
        assert_eq!(pan.axis, PanAxis::Vertical);
        assert!(pan.percent < 100.0 && pan.percent > 90.0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_load_still_swaps_without_fade() {
        let (mut r, scene) = renderer(4, 2);
        let mut active = SurfaceSlot::A;
        r.show_still("http://svc/1.jpg", false, &mut active).await;
        let kind = r.show_still("http://svc/broken.jpg", false, &mut active).await;
        assert_eq!(kind, TransitionKind::Immediate);
        assert_eq!(active, SurfaceSlot::A);
        let snap = scene.snapshot();
        let set = snap.set(SurfaceSlot::A);
        assert!(set.cover.visible && !set.cover.fade && set.cover.picture.is_none());
        assert!(!snap.set(SurfaceSlot::B).contain.visible);
        assert!(r.active_pans().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn animated_replaces_active_set_in_place() {
        let (mut r, scene) = renderer(4, 2);
        let mut active = SurfaceSlot::A;
        r.show_still("http://svc/1.jpg", false, &mut active).await;
        scene.update(|s| s.video_foreground.visible = true);

        let transition = r.show_still("http://svc/a.gif", true, &mut active).await;
        assert_eq!(transition, TransitionKind::InPlace);
        assert_eq!(active, SurfaceSlot::B);
        let snap = scene.snapshot();
        assert_eq!(snap.set(SurfaceSlot::B).cover.source_url.as_deref(), Some("http://svc/a.gif"));
        assert_eq!(snap.visible_sets(), vec![SurfaceSlot::B]);
        assert!(!snap.video_foreground.visible);
        assert!(r.active_pans().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hide_images_clears_everything() {
        let (mut r, scene) = renderer(4, 2);
        let mut active = SurfaceSlot::A;
        r.show_still("http://svc/1.jpg", false, &mut active).await;
        r.hide_images();
        assert!(scene.snapshot().visible_sets().is_empty());
        assert!(r.active_pans().is_empty());
    }
}
