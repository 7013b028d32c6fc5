//! `ambient_rs`: an ambient photo and video frame fed by a gallery info service.
//!
//! The presentation engine (`cycle`) runs as a tokio task and publishes what
//! should be on screen into a `scene::Scene`; the egui window in `app` paints
//! it.

pub mod app;
pub mod config;
pub mod cycle;
pub mod dwell;
pub mod errors;
pub mod info_client;
pub mod media_pipeline;
pub mod model;
pub mod overlay;
pub mod prefetch;
pub mod renderer;
pub mod resolver;
pub mod retry;
pub mod scene;
pub mod video;
