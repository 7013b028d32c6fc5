//! Defines the core data structures used by the presentation cycle.
//!
//! This includes the JSON shapes returned by the info service, the resolved
//! `MediaDescriptor` handed to the renderer, and the `CycleState` owned by the
//! cycle state machine.

use serde::Deserialize;
use std::fmt;

use crate::prefetch::PrefetchSlot;

/// Response of the step-1 info endpoint: a pointer to the per-item descriptor.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct InfoPointer {
    #[serde(default)]
    pub url: Option<String>,
}

/// Response of the per-item endpoint.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct InfoEnvelope {
    #[serde(default)]
    pub result: Option<InfoRecord>,
}

/// One gallery item as described by the info service.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct InfoRecord {
    /// File name including extension, e.g. `IMG_0042.HEIC`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub directory: Option<DirectoryRef>,
    /// Free-form metadata (`keywords`, `creationDate`, `size`, `fileSize`, `positionData`).
    /// Kept as raw JSON and passed through to the overlay untouched.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Location of an item inside the gallery tree.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct DirectoryRef {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Media category inferred from the file extension (and the `apng` keyword).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    StillImage,
    AnimatedImage,
    Video,
    Unknown,
}

impl MediaKind {
    /// Only known kinds may be dispatched to rendering.
    pub fn is_dispatchable(self) -> bool {
        self != MediaKind::Unknown
    }
}

/// The resolved, type-tagged, address-bearing description of one media item.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaDescriptor {
    pub media_url: String,
    pub kind: MediaKind,
    pub display_name: Option<String>,
    /// Lower-cased, trimmed; entries containing `|` are dropped. Order is display order.
    pub keywords: Vec<String>,
    pub metadata: Option<serde_json::Value>,
}

/// One of the two symmetric render surface sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SurfaceSlot {
    #[default]
    A,
    B,
}

impl SurfaceSlot {
    pub fn other(self) -> SurfaceSlot {
        match self {
            SurfaceSlot::A => SurfaceSlot::B,
            SurfaceSlot::B => SurfaceSlot::A,
        }
    }
}

/// Process-wide cycle state. Created once at startup and owned by the cycle;
/// components receive it (or the field they need) by explicit borrow.
#[derive(Debug, Default)]
pub struct CycleState {
    /// The item actually on screen, for the overlay.
    pub current: Option<MediaDescriptor>,
    pub prefetch: PrefetchSlot,
    /// Surface set currently visible for still images.
    pub active_set: SurfaceSlot,
    /// True while a short or unknown-length video is being looped to its floor.
    pub video_temp_loop: bool,
}

/// Result of one cycle iteration, reported to the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Shown(MediaKind),
    NoData,
    NoType,
    Error,
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Shown(kind) => write!(f, "ok ({:?})", kind),
            CycleOutcome::NoData => write!(f, "no-data"),
            CycleOutcome::NoType => write!(f, "no-type"),
            CycleOutcome::Error => write!(f, "error"),
        }
    }
}
