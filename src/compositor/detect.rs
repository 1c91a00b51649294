//! Compositor detection from environment signals.
//!
//! Detection order:
//! 1. `HYPRLAND_INSTANCE_SIGNATURE` → Hyprland
//! 2. `NIRI_SOCKET` → Niri
//! 3. Neither → Unknown (warn, never fail)
//!
//! Empty values count as absent. When both are set Hyprland wins, and the
//! environment is reported as ambiguous.

use std::env;

use crate::callbacks::{CallbackId, Callbacks};

use super::CompositorKind;

pub const HYPRLAND_SIGNAL: &str = "HYPRLAND_INSTANCE_SIGNATURE";
pub const NIRI_SIGNAL: &str = "NIRI_SOCKET";

/// The two environment signals detection is based on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSignals {
    pub hyprland_signature: Option<String>,
    pub niri_socket: Option<String>,
}

impl EnvSignals {
    /// Read both signals from the process environment.
    pub fn from_env() -> Self {
        Self {
            hyprland_signature: env::var(HYPRLAND_SIGNAL).ok(),
            niri_socket: env::var(NIRI_SIGNAL).ok(),
        }
    }

    /// Hyprland instance signature, if present and non-empty.
    pub fn hyprland(&self) -> Option<&str> {
        non_empty(self.hyprland_signature.as_deref())
    }

    /// Niri socket path, if present and non-empty.
    pub fn niri(&self) -> Option<&str> {
        non_empty(self.niri_socket.as_deref())
    }

    /// Pure classification of these signals.
    pub fn classify(&self) -> CompositorKind {
        match (self.hyprland(), self.niri()) {
            (Some(_), None) => CompositorKind::Hyprland,
            (Some(_), Some(_)) => {
                tracing::warn!(
                    "both {HYPRLAND_SIGNAL} and {NIRI_SIGNAL} are set, preferring Hyprland"
                );
                CompositorKind::Hyprland
            }
            (None, Some(_)) => CompositorKind::Niri,
            (None, None) => CompositorKind::Unknown,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Result of one detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub kind: CompositorKind,
    pub label: &'static str,
    /// Whether the kind differs from the previous pass.
    pub changed: bool,
}

/// Holds the current classification and publishes every detection pass.
#[derive(Debug)]
pub struct Detector {
    kind: CompositorKind,
    signals: EnvSignals,
    listeners: Callbacks<Detection>,
}

impl Detector {
    pub fn new() -> Self {
        Self {
            kind: CompositorKind::Unknown,
            signals: EnvSignals::default(),
            listeners: Callbacks::new(),
        }
    }

    pub fn kind(&self) -> CompositorKind {
        self.kind
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }

    /// Signals seen by the most recent detection pass.
    pub fn signals(&self) -> &EnvSignals {
        &self.signals
    }

    pub fn subscribe<F>(&mut self, listener: F) -> CallbackId
    where
        F: Fn(&Detection) + Send + 'static,
    {
        self.listeners.register(listener)
    }

    pub fn unsubscribe(&mut self, id: CallbackId) -> bool {
        self.listeners.unregister(id)
    }

    /// Classify from the process environment.
    pub fn detect(&mut self) -> Detection {
        self.detect_with(EnvSignals::from_env())
    }

    /// Classify from explicit signals and publish the result.
    pub fn detect_with(&mut self, signals: EnvSignals) -> Detection {
        let kind = signals.classify();
        let changed = kind != self.kind;
        self.kind = kind;
        self.signals = signals;

        if kind == CompositorKind::Unknown {
            tracing::warn!("no supported compositor detected, using neutral defaults");
        } else {
            tracing::info!(compositor = %kind, changed, "compositor detected");
        }

        let detection = Detection {
            kind,
            label: kind.label(),
            changed,
        };
        self.listeners.notify(&detection);
        detection
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}
