//! Event normalization: one `(name, data)` stream for every backend.
//!
//! Hyprland events are republished verbatim. Niri has no generic named
//! feed here, so its window-list notifications become a single synthetic
//! `windowschanged` event with an empty payload. DPMS payloads are parsed
//! on the way through and handed back to the caller as [`PowerSignal`]s.

pub mod dpms;

use serde::{Deserialize, Serialize};

use crate::callbacks::{CallbackId, Callbacks};

pub use dpms::{DpmsState, PowerSignal};

/// Synthetic event name for Niri window-list changes.
pub const WINDOWS_CHANGED: &str = "windowschanged";

/// Pushed to subscribers when the detected compositor changes.
pub const COMPOSITOR_CHANGED: &str = "compositorchanged";

/// Hyprland event carrying `"<state>,<monitor>"`.
pub const DPMS_EVENT: &str = "dpms";

/// Event as delivered by a backend feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// Hyprland `NAME>>DATA` line.
    Named { name: String, data: String },
    /// Niri window list changed.
    WindowsChanged,
}

/// Normalized event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositorEvent {
    pub name: String,
    pub data: String,
}

impl CompositorEvent {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Map a raw backend event to its normalized form.
pub fn normalize(raw: RawEvent) -> (CompositorEvent, Option<PowerSignal>) {
    match raw {
        RawEvent::Named { name, data } => {
            let power = if name == DPMS_EVENT {
                dpms::parse(&data).map(|event| event.signal)
            } else {
                None
            };
            (CompositorEvent { name, data }, power)
        }
        RawEvent::WindowsChanged => (CompositorEvent::new(WINDOWS_CHANGED, ""), None),
    }
}

/// Normalizes raw events and fans them out to subscribers.
#[derive(Debug, Default)]
pub struct EventNormalizer {
    subscribers: Callbacks<CompositorEvent>,
}

impl EventNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> CallbackId
    where
        F: Fn(&CompositorEvent) + Send + 'static,
    {
        self.subscribers.register(listener)
    }

    pub fn unsubscribe(&mut self, id: CallbackId) -> bool {
        self.subscribers.unregister(id)
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Publish a raw event and return any power-state change it carried.
    pub fn dispatch(&self, raw: RawEvent) -> Option<PowerSignal> {
        let (event, power) = normalize(raw);
        tracing::trace!(name = %event.name, data = %event.data, "compositor event");
        self.subscribers.notify(&event);
        power
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn named(name: &str, data: &str) -> RawEvent {
        RawEvent::Named {
            name: name.into(),
            data: data.into(),
        }
    }

    #[test]
    fn named_events_pass_through_verbatim() {
        let (event, power) = normalize(named("workspace", "3"));
        assert_eq!(event, CompositorEvent::new("workspace", "3"));
        assert!(power.is_none());
    }

    #[test]
    fn windows_changed_is_synthetic_and_empty() {
        let (event, power) = normalize(RawEvent::WindowsChanged);
        assert_eq!(event.name, "windowschanged");
        assert_eq!(event.data, "");
        assert!(power.is_none());
    }

    #[test]
    fn dpms_event_yields_power_signal() {
        let (event, power) = normalize(named("dpms", "0,DP-1"));
        assert_eq!(event.data, "0,DP-1");
        assert_eq!(power, Some(PowerSignal::Off));

        let (_, power) = normalize(named("dpms", "1,DP-1"));
        assert_eq!(power, Some(PowerSignal::On));
    }

    #[test]
    fn malformed_dpms_is_still_published() {
        let (event, power) = normalize(named("dpms", "garbage"));
        assert_eq!(event.name, "dpms");
        assert!(power.is_none());
    }

    #[test]
    fn power_parsing_only_applies_to_dpms() {
        let (_, power) = normalize(named("activewindow", "0,DP-1"));
        assert!(power.is_none());
    }

    #[test]
    fn dispatch_notifies_subscribers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut normalizer = EventNormalizer::new();
        let sink = Arc::clone(&seen);
        let id = normalizer.subscribe(move |e| sink.lock().unwrap().push(e.name.clone()));

        normalizer.dispatch(named("openwindow", "0x1,2,kitty,kitty"));
        normalizer.dispatch(RawEvent::WindowsChanged);
        assert!(normalizer.unsubscribe(id));
        normalizer.dispatch(named("closewindow", "0x1"));

        assert_eq!(*seen.lock().unwrap(), vec!["openwindow", "windowschanged"]);
        assert_eq!(normalizer.subscriber_count(), 0);
    }
}
