//! Builds and draws the supplementary info overlay.
//!
//! The cycle decides *whether* the overlay is shown (from `OverlaySettings`)
//! and hands it the descriptor actually on screen; this module turns that
//! descriptor into display lines and paints them on the right edge of the
//! window.

use chrono::{Local, TimeZone};
use egui::{Align2, Color32, FontId, RichText};
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::model::MediaDescriptor;
use crate::scene::SceneHandle;

/// The two user-toggleable overlay settings, shared between the window
/// (writer) and the cycle (reader).
#[derive(Debug, Default)]
pub struct OverlaySettings {
    show_overlay: AtomicBool,
    show_detailed_metadata: AtomicBool,
}

impl OverlaySettings {
    pub fn new(show_overlay: bool, show_detailed_metadata: bool) -> Self {
        Self {
            show_overlay: AtomicBool::new(show_overlay),
            show_detailed_metadata: AtomicBool::new(show_detailed_metadata),
        }
    }

    pub fn show_overlay(&self) -> bool {
        self.show_overlay.load(Ordering::Relaxed)
    }

    pub fn show_detailed_metadata(&self) -> bool {
        self.show_detailed_metadata.load(Ordering::Relaxed)
    }

    /// Flips `show_overlay` and returns the new value.
    pub fn toggle_overlay(&self) -> bool {
        !self.show_overlay.fetch_xor(true, Ordering::Relaxed)
    }

    /// Flips `show_detailed_metadata` and returns the new value.
    pub fn toggle_detailed_metadata(&self) -> bool {
        !self.show_detailed_metadata.fetch_xor(true, Ordering::Relaxed)
    }
}

/// Entry points of the overlay collaborator.
pub trait Overlay: Send + Sync {
    fn show(&self, descriptor: &MediaDescriptor, detailed: bool);
    fn hide(&self);

    /// Told about the item on screen whether or not the overlay is shown.
    fn set_current(&self, _descriptor: Option<&MediaDescriptor>) {}
}

/// Applies the settings to the overlay for the item currently on screen.
pub fn refresh_overlay(
    overlay: &dyn Overlay,
    settings: &OverlaySettings,
    current: Option<&MediaDescriptor>,
) {
    overlay.set_current(current);
    match current {
        Some(descriptor) if settings.show_overlay() => {
            overlay.show(descriptor, settings.show_detailed_metadata())
        }
        _ => overlay.hide(),
    }
}

/// Text content of the overlay panel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayContent {
    pub title: String,
    pub keywords: Option<String>,
    /// Date, dimensions and file size; shown whenever available.
    pub basic: Vec<String>,
    /// GPS position and raw metadata; only with detailed metadata enabled.
    pub detailed: Vec<String>,
}

impl OverlayContent {
    pub fn from_descriptor(descriptor: &MediaDescriptor, detailed: bool) -> Self {
        let meta = descriptor.metadata.as_ref();
        let mut basic = Vec::new();
        let creation_date = meta.and_then(|m| m.get("creationDate"));
        if let Some(date) = creation_date.and_then(format_creation_date) {
            basic.push(format!("Date: {}", date));
        }
        if let Some(size) = meta.and_then(|m| m.get("size")) {
            let width = size.get("width").and_then(|v| v.as_u64());
            let height = size.get("height").and_then(|v| v.as_u64());
            if let (Some(w), Some(h)) = (width, height) {
                basic.push(format!("Size: {} × {}", w, h));
            }
        }
        if let Some(bytes) = meta.and_then(|m| m.get("fileSize")).and_then(|v| v.as_u64()) {
            basic.push(format!("File: {}", human_size(bytes)));
        }

        let mut detail_lines = Vec::new();
        if detailed {
            if let Some(gps) = meta.and_then(gps_text) {
                detail_lines.push(format!("GPS: {}", gps));
            }
            if let Some(m) = meta {
                if let Ok(raw) = serde_json::to_string_pretty(m) {
                    detail_lines.push(raw);
                }
            }
        }

        let keywords = (!descriptor.keywords.is_empty()).then(|| descriptor.keywords.join(" ; "));
        Self {
            title: descriptor.display_name.clone().unwrap_or_default(),
            keywords,
            basic,
            detailed: detail_lines,
        }
    }
}

/// Formats `creationDate` (epoch milliseconds, as number or numeric string) in
/// local time. Non-numeric strings are shown as given.
pub fn format_creation_date(value: &serde_json::Value) -> Option<String> {
    let millis = match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => match s.trim().parse::<i64>() {
            Ok(ms) => Some(ms),
            Err(_) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Err(_) => None,
        },
        _ => None,
    }?;
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// `positionData.GPSData` as `"lat, lon"`.
pub fn gps_text(metadata: &serde_json::Value) -> Option<String> {
    let gps = metadata.get("positionData")?.get("GPSData")?;
    let lat = gps.get("latitude")?.as_f64()?;
    let lon = gps.get("longitude")?.as_f64()?;
    Some(format!("{}, {}", lat, lon))
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 { format!("{} B", bytes) } else { format!("{:.1} {}", value, UNITS[unit]) }
}

/// Overlay that publishes its content into the scene for the window to draw.
#[derive(Debug)]
pub struct SceneOverlay {
    scene: SceneHandle,
    current: Mutex<Option<MediaDescriptor>>,
}

impl SceneOverlay {
    pub fn new(scene: SceneHandle) -> Self {
        Self { scene, current: Mutex::new(None) }
    }

    /// Re-applies changed settings to the item on screen.
    pub fn reapply(&self, settings: &OverlaySettings) {
        let current = match self.current.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        refresh_overlay(self, settings, current.as_ref());
    }
}

impl Overlay for SceneOverlay {
    fn show(&self, descriptor: &MediaDescriptor, detailed: bool) {
        debug!("Showing overlay for {:?} (detailed: {})", descriptor.display_name, detailed);
        let content = OverlayContent::from_descriptor(descriptor, detailed);
        self.scene.update(|s| s.overlay = Some(content));
    }

    fn hide(&self) {
        trace!("Hiding overlay");
        self.scene.update(|s| s.overlay = None);
    }

    fn set_current(&self, descriptor: Option<&MediaDescriptor>) {
        let mut guard = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = descriptor.cloned();
    }
}

/// Draws the overlay as a translucent column on the right third of the screen.
pub fn draw_overlay(ctx: &egui::Context, screen: egui::Rect, content: &OverlayContent) {
    let width = (screen.width() / 3.0).min(480.0);
    egui::Area::new(egui::Id::new("info_overlay"))
        .anchor(Align2::RIGHT_TOP, egui::vec2(0.0, 0.0))
        .interactable(false)
        .show(ctx, |ui| {
            egui::Frame::none()
                .fill(Color32::from_rgba_unmultiplied(12, 12, 16, 128))
                .inner_margin(egui::Margin::symmetric(14.0, 12.0))
                .show(ui, |ui| {
                    ui.set_width(width);
                    ui.set_min_height(screen.height() - 24.0);
                    ui.label(
                        RichText::new(&content.title)
                            .font(FontId::proportional(20.0))
                            .strong()
                            .color(Color32::WHITE),
                    );
                    ui.add_space(10.0);
                    for line in &content.basic {
                        let text = RichText::new(line).font(FontId::proportional(15.0));
                        ui.label(text.color(Color32::WHITE));
                    }
                    if let Some(keywords) = &content.keywords {
                        ui.add_space(8.0);
                        let text = RichText::new(keywords).font(FontId::proportional(16.0));
                        ui.label(text.color(Color32::LIGHT_GRAY));
                    }
                    for line in &content.detailed {
                        ui.add_space(6.0);
                        let text = RichText::new(line).font(FontId::monospace(12.0));
                        ui.label(text.color(Color32::GRAY));
                    }
                });
        });
}
