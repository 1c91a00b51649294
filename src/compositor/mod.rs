//! Compositor abstraction: one query surface over Hyprland and Niri.
//!
//! The active backend is chosen once per detection cycle by
//! [`factory::create_backend`]. Everything downstream (resolver, registry,
//! context tracker) talks to `dyn CompositorBackend` and never branches on
//! the kind again.
//!
//! Backend values are plain cached state. Live IPC happens in the feed
//! tasks spawned by [`factory::spawn_feed`], which replace the whole
//! backend value whenever the compositor reports a relevant change.

pub mod detect;
pub mod factory;
pub mod hyprland;
pub mod niri;
pub mod noop;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use detect::{Detection, Detector, EnvSignals};
pub use factory::{BackendUpdate, UpdateKind, create_backend, spawn_feed};

/// Which compositor backend is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositorKind {
    /// Instance signature + named event bus.
    Hyprland,
    /// Socket path + JSON request/reply.
    Niri,
    Unknown,
}

impl CompositorKind {
    /// Human-readable label published alongside the kind.
    pub fn label(self) -> &'static str {
        match self {
            CompositorKind::Hyprland => "Hyprland",
            CompositorKind::Niri => "Niri",
            CompositorKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for CompositorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A display as enumerated by the platform display layer.
///
/// Focus is derived by the resolver and never stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screen {
    pub name: String,
    /// Toolkit-reported scale, if the display layer knows one.
    pub device_pixel_ratio: Option<f64>,
}

impl Screen {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_pixel_ratio: None,
        }
    }

    #[cfg(test)]
    pub fn with_device_pixel_ratio(mut self, ratio: f64) -> Self {
        self.device_pixel_ratio = Some(ratio);
        self
    }
}

/// The active workspace, rebuilt on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// `-1` when the backend reports no usable id.
    pub id: i64,
    pub name: String,
    pub monitor: String,
}

impl Workspace {
    /// Neutral value used when nothing is known.
    pub fn none() -> Self {
        Self {
            id: -1,
            name: String::new(),
            monitor: String::new(),
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::none()
    }
}

/// Query contract implemented once per [`CompositorKind`].
///
/// All methods are synchronous reads over already-cached state and must
/// return neutral values rather than fail.
pub trait CompositorBackend: Send {
    fn kind(&self) -> CompositorKind;

    /// Name of the monitor/output the compositor reports as focused.
    fn focused_output(&self) -> Option<&str>;

    /// Compositor-side scale for the named output.
    fn output_scale(&self, name: &str) -> Option<f64>;

    /// The focused workspace, or [`Workspace::none`].
    fn current_workspace(&self) -> Workspace;

    /// Raw application identifiers of every known window, unnormalized.
    fn window_app_ids(&self) -> Vec<&str>;

    /// Outputs known to the compositor, used as the daemon's screen list.
    fn outputs(&self) -> Vec<Screen>;
}

impl fmt::Debug for dyn CompositorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompositorBackend({})", self.kind())
    }
}

/// Errors from compositor IPC. Only feed tasks see these; queries never fail.
#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    #[error("socket not found for {0}")]
    NoSocket(CompositorKind),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("compositor replied with error: {0}")]
    Reply(String),
    #[error("event stream closed")]
    StreamClosed,
}
