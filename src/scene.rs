//! The display model shared between the engine and the window.
//!
//! The engine mutates a `Scene` through a `SceneHandle`; the egui app only
//! reads published snapshots. Image surface sets belong to the crossfade
//! renderer, video layers to the video surface and the overlay slot to the
//! overlay. Nobody else writes those parts.

use std::sync::Arc;
use tokio::sync::watch;

use crate::media_pipeline::Picture;
use crate::model::SurfaceSlot;
use crate::overlay::OverlayContent;

/// Which of the two layers of a surface set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Aspect-fill background, panned while a still image is shown.
    Cover,
    /// Aspect-fit foreground.
    Contain,
}

/// Identity of one image surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId {
    pub slot: SurfaceSlot,
    pub layer: Layer,
}

impl SurfaceId {
    pub fn new(slot: SurfaceSlot, layer: Layer) -> Self {
        Self { slot, layer }
    }

    pub fn all() -> [SurfaceId; 4] {
        [
            SurfaceId::new(SurfaceSlot::A, Layer::Cover),
            SurfaceId::new(SurfaceSlot::A, Layer::Contain),
            SurfaceId::new(SurfaceSlot::B, Layer::Cover),
            SurfaceId::new(SurfaceSlot::B, Layer::Contain),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanAxis {
    /// Left to right.
    Horizontal,
    /// Bottom to top.
    Vertical,
}

impl PanAxis {
    /// Landscape images pan horizontally, everything else vertically.
    pub fn for_size(width: u32, height: u32) -> PanAxis {
        if width > height { PanAxis::Horizontal } else { PanAxis::Vertical }
    }
}

/// CSS-style object position of a cover layer along one axis, in percent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PanPosition {
    pub axis: PanAxis,
    pub percent: f32,
}

impl PanPosition {
    /// Position at progress `t` in `0.0..=1.0`.
    pub fn at(axis: PanAxis, t: f32) -> PanPosition {
        let t = t.clamp(0.0, 1.0);
        let percent = match axis {
            PanAxis::Horizontal => 100.0 * t,
            PanAxis::Vertical => 100.0 * (1.0 - t),
        };
        PanPosition { axis, percent }
    }
}

/// State of one image surface.
#[derive(Clone, Debug, Default)]
pub struct SurfaceState {
    pub source_url: Option<String>,
    /// Decoded content; `None` while nothing could be loaded.
    pub picture: Option<Arc<Picture>>,
    pub visible: bool,
    /// Whether visibility changes are animated. Off for the degraded swap
    /// after a failed load.
    pub fade: bool,
    pub pan: Option<PanPosition>,
}

#[derive(Clone, Debug, Default)]
pub struct SurfaceSetState {
    pub cover: SurfaceState,
    pub contain: SurfaceState,
}

/// One decoded RGBA video frame.
#[derive(Debug)]
pub struct VideoFrame {
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct VideoLayerState {
    /// Playback generation; frames from older streams are dropped.
    pub stream_id: u64,
    pub visible: bool,
    pub frame: Option<Arc<VideoFrame>>,
}

/// Everything the window needs to paint one frame.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub sets: [SurfaceSetState; 2],
    /// Looping, cover-fitted copy of the current video.
    pub video_background: VideoLayerState,
    /// The video itself, contain-fitted.
    pub video_foreground: VideoLayerState,
    pub overlay: Option<OverlayContent>,
}

impl Scene {
    fn index(slot: SurfaceSlot) -> usize {
        match slot {
            SurfaceSlot::A => 0,
            SurfaceSlot::B => 1,
        }
    }

    pub fn set(&self, slot: SurfaceSlot) -> &SurfaceSetState {
        &self.sets[Self::index(slot)]
    }

    pub fn set_mut(&mut self, slot: SurfaceSlot) -> &mut SurfaceSetState {
        &mut self.sets[Self::index(slot)]
    }

    pub fn surface(&self, id: SurfaceId) -> &SurfaceState {
        let set = self.set(id.slot);
        match id.layer {
            Layer::Cover => &set.cover,
            Layer::Contain => &set.contain,
        }
    }

    pub fn surface_mut(&mut self, id: SurfaceId) -> &mut SurfaceState {
        let set = self.set_mut(id.slot);
        match id.layer {
            Layer::Cover => &mut set.cover,
            Layer::Contain => &mut set.contain,
        }
    }

    /// Slots whose two layers are both visible.
    pub fn visible_sets(&self) -> Vec<SurfaceSlot> {
        [SurfaceSlot::A, SurfaceSlot::B]
            .into_iter()
            .filter(|slot| {
                let set = self.set(*slot);
                set.cover.visible && set.contain.visible
            })
            .collect()
    }
}

/// Cloneable write handle over the published scene.
#[derive(Clone, Debug)]
pub struct SceneHandle {
    tx: Arc<watch::Sender<Scene>>,
}

impl SceneHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Scene::default());
        Self { tx: Arc::new(tx) }
    }

    /// Applies `f` and publishes the result in one step, so readers never see
    /// a half-applied transition.
    pub fn update<F: FnOnce(&mut Scene)>(&self, f: F) {
        self.tx.send_modify(f);
    }

    pub fn snapshot(&self) -> Scene {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Scene> {
        self.tx.subscribe()
    }
}

impl Default for SceneHandle {
    fn default() -> Self {
        Self::new()
    }
}
