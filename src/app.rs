//! The egui window. Reads published scenes and paints them; never writes
//! surface state.

use egui::{pos2, vec2, Color32, Context, Id, Key, Rect, TextureHandle, TextureOptions};
use log::{debug, info, trace};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::media_pipeline::Picture;
use crate::overlay::{draw_overlay, OverlaySettings, SceneOverlay};
use crate::scene::{Layer, PanAxis, PanPosition, Scene, SurfaceId, SurfaceState, VideoLayerState};

/// Crossfade length for surface visibility changes.
const FADE_SECONDS: f32 = 0.8;
const REPAINT_INTERVAL: Duration = Duration::from_millis(1000 / 30);
/// Tint for the aspect-fill backdrop layers.
const BACKDROP_TINT: u8 = 110;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum VideoLayer {
    Background,
    Foreground,
}

struct VideoTexture {
    stream_id: u64,
    seq: u64,
    handle: TextureHandle,
}

pub struct FrameApp {
    scene_rx: watch::Receiver<Scene>,
    settings: Arc<OverlaySettings>,
    overlay: Arc<SceneOverlay>,
    picture_textures: HashMap<(u64, usize), TextureHandle>,
    picture_started: HashMap<u64, Instant>,
    video_textures: HashMap<VideoLayer, VideoTexture>,
}

impl FrameApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        scene_rx: watch::Receiver<Scene>,
        settings: Arc<OverlaySettings>,
        overlay: Arc<SceneOverlay>,
    ) -> Self {
        info!("FrameApp created");
        cc.egui_ctx.set_visuals(egui::Visuals::dark());
        Self {
            scene_rx,
            settings,
            overlay,
            picture_textures: HashMap::new(),
            picture_started: HashMap::new(),
            video_textures: HashMap::new(),
        }
    }

    fn handle_keys(&mut self, ctx: &Context) {
        let (toggle_overlay, toggle_detailed, close) = ctx.input(|i| {
            (i.key_pressed(Key::O), i.key_pressed(Key::M), i.key_pressed(Key::Escape))
        });
        if toggle_overlay {
            let on = self.settings.toggle_overlay();
            info!("Overlay {}", if on { "enabled" } else { "disabled" });
        }
        if toggle_detailed {
            let on = self.settings.toggle_detailed_metadata();
            info!("Detailed metadata {}", if on { "enabled" } else { "disabled" });
        }
        if toggle_overlay || toggle_detailed {
            self.overlay.reapply(&self.settings);
        }
        if close {
            info!("Escape pressed, closing window");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    fn picture_texture(
        &mut self,
        ctx: &Context,
        picture: &Arc<Picture>,
        used: &mut HashSet<(u64, usize)>,
    ) -> Option<egui::TextureId> {
        let started = *self.picture_started.entry(picture.id).or_insert_with(Instant::now);
        let index = picture.frame_index_at(started.elapsed());
        let frame = picture.frames.get(index)?;
        let key = (picture.id, index);
        used.insert(key);
        let handle = self.picture_textures.entry(key).or_insert_with(|| {
            trace!("Uploading texture for picture {} frame {}", picture.id, index);
            let image = egui::ColorImage::from_rgba_unmultiplied(
                [picture.width as usize, picture.height as usize],
                &frame.rgba,
            );
            let name = format!("picture_{}_{}", picture.id, index);
            ctx.load_texture(name, image, TextureOptions::LINEAR)
        });
        Some(handle.id())
    }

    fn video_texture(
        &mut self,
        ctx: &Context,
        layer: VideoLayer,
        state: &VideoLayerState,
    ) -> Option<(egui::TextureId, egui::Vec2)> {
        let frame = state.frame.as_ref()?;
        let size = vec2(frame.width as f32, frame.height as f32);
        let dims = [frame.width as usize, frame.height as usize];
        let image = || egui::ColorImage::from_rgba_unmultiplied(dims, &frame.rgba);
        match self.video_textures.get_mut(&layer) {
            Some(tex) if tex.stream_id == state.stream_id && tex.seq == frame.seq => {}
            Some(tex) => {
                tex.handle.set(image(), TextureOptions::LINEAR);
                tex.stream_id = state.stream_id;
                tex.seq = frame.seq;
            }
            None => {
                debug!("Creating video texture for {:?}", layer);
                let handle =
                    ctx.load_texture(format!("video_{:?}", layer), image(), TextureOptions::LINEAR);
                self.video_textures.insert(
                    layer,
                    VideoTexture { stream_id: state.stream_id, seq: frame.seq, handle },
                );
            }
        }
        self.video_textures.get(&layer).map(|t| (t.handle.id(), size))
    }

    fn surface_opacity(ctx: &Context, id: SurfaceId, surface: &SurfaceState) -> f32 {
        let fade = if surface.fade { FADE_SECONDS } else { 0.0 };
        ctx.animate_bool_with_time(Id::new(("surface", id.slot, id.layer)), surface.visible, fade)
    }

    fn paint_surface(
        &mut self,
        ctx: &Context,
        painter: &egui::Painter,
        screen: Rect,
        id: SurfaceId,
        surface: &SurfaceState,
        used: &mut HashSet<(u64, usize)>,
    ) {
        let opacity = Self::surface_opacity(ctx, id, surface);
        if opacity <= 0.0 {
            return;
        }
        let Some(picture) = surface.picture.as_ref() else {
            return;
        };
        let Some(texture) = self.picture_texture(ctx, picture, used) else {
            return;
        };
        let media = vec2(picture.width as f32, picture.height as f32);
        match id.layer {
            Layer::Cover => {
                let tint = Color32::from_gray(BACKDROP_TINT).gamma_multiply(opacity);
                painter.image(texture, screen, cover_uv(media, screen, surface.pan), tint);
            }
            Layer::Contain => {
                let full_uv = Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0));
                let rect = calculate_draw_rect(media.x, media.y, screen);
                painter.image(texture, rect, full_uv, Color32::WHITE.gamma_multiply(opacity));
            }
        }
    }

    fn paint_video(
        &mut self,
        ctx: &Context,
        painter: &egui::Painter,
        screen: Rect,
        layer: VideoLayer,
        state: &VideoLayerState,
    ) {
        let opacity =
            ctx.animate_bool_with_time(Id::new(("video", layer)), state.visible, FADE_SECONDS);
        if opacity <= 0.0 {
            return;
        }
        let Some((texture, size)) = self.video_texture(ctx, layer, state) else {
            return;
        };
        match layer {
            VideoLayer::Background => {
                let tint = Color32::from_gray(BACKDROP_TINT).gamma_multiply(opacity);
                painter.image(texture, screen, cover_uv(size, screen, None), tint);
            }
            VideoLayer::Foreground => {
                let full_uv = Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0));
                let rect = calculate_draw_rect(size.x, size.y, screen);
                painter.image(texture, rect, full_uv, Color32::WHITE.gamma_multiply(opacity));
            }
        }
    }
}

impl eframe::App for FrameApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.handle_keys(ctx);
        let scene = self.scene_rx.borrow_and_update().clone();
        let mut used = HashSet::new();

        let panel = egui::CentralPanel::default().frame(egui::Frame::none().fill(Color32::BLACK));
        panel.show(ctx, |ui| {
            let screen = ui.max_rect();
            let painter = ui.painter().clone();

            let background = &scene.video_background;
            self.paint_video(ctx, &painter, screen, VideoLayer::Background, background);
            for layer in [Layer::Cover, Layer::Contain] {
                for id in SurfaceId::all().into_iter().filter(|id| id.layer == layer) {
                    self.paint_surface(ctx, &painter, screen, id, scene.surface(id), &mut used);
                }
            }
            let foreground = &scene.video_foreground;
            self.paint_video(ctx, &painter, screen, VideoLayer::Foreground, foreground);

            if let Some(content) = &scene.overlay {
                draw_overlay(ctx, screen, content);
            }
        });

        // Only keep textures for frames painted this pass.
        self.picture_textures.retain(|key, _| used.contains(key));
        self.picture_started.retain(|id, _| used.iter().any(|(pid, _)| pid == id));

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("FrameApp on_exit called.");
    }
}

/// Largest rect with the media's aspect ratio that fits `available_rect`, centred.
fn calculate_draw_rect(media_width: f32, media_height: f32, available_rect: Rect) -> Rect {
    let aspect_ratio = media_width / media_height;
    let mut draw_width = available_rect.width();
    let mut draw_height = available_rect.width() / aspect_ratio;
    if draw_height > available_rect.height() {
        draw_height = available_rect.height();
        draw_width = available_rect.height() * aspect_ratio;
    }
    Rect::from_center_size(available_rect.center(), vec2(draw_width, draw_height))
}

/// UV window that makes the media fill `screen` (cropping the overflow), placed
/// by the pan position or centred.
fn cover_uv(media: egui::Vec2, screen: Rect, pan: Option<PanPosition>) -> Rect {
    let scale = (screen.width() / media.x).max(screen.height() / media.y);
    let frac_x = (screen.width() / (media.x * scale)).min(1.0);
    let frac_y = (screen.height() / (media.y * scale)).min(1.0);
    let (mut px, mut py) = (0.5, 0.5);
    if let Some(pan) = pan {
        match pan.axis {
            PanAxis::Horizontal => px = pan.percent / 100.0,
            PanAxis::Vertical => py = pan.percent / 100.0,
        }
    }
    Rect::from_min_size(pos2((1.0 - frac_x) * px, (1.0 - frac_y) * py), vec2(frac_x, frac_y))
}
