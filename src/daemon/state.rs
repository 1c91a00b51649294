//! Daemon state: detector, active backend, tracker, event bus, connections.
//!
//! Owned exclusively by the daemon loop. Feed tasks and connection tasks
//! never touch it directly; they send messages that the loop applies here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::callbacks::CallbackId;
use crate::compositor::factory::FeedSender;
use crate::compositor::{
    BackendUpdate, CompositorBackend, CompositorKind, Detection, Detector, EnvSignals,
    UpdateKind, create_backend, spawn_feed,
};
use crate::context::session::{compositor_launch_time, is_new_instance};
use crate::context::{Clock, ContextSnapshot, ContextTracker, SystemClock, TrackerConfig};
use crate::events::{COMPOSITOR_CHANGED, EventNormalizer};
use crate::ipc::protocol::{CompositorStatus, Message, ScreenStatus};
use crate::registry;
use crate::resolver::ScreenResolver;

/// Unique identifier for a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// How the new-session flag is decided on first detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProbe {
    /// A compositor younger than this counts as a fresh session.
    pub threshold: Duration,
    /// Skip the probe and treat the session as new.
    pub force_new: bool,
}

impl Default for SessionProbe {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(120),
            force_new: false,
        }
    }
}

/// Listener ids registered for one subscribed connection.
#[derive(Debug, Clone, Copy)]
struct Subscription {
    events: CallbackId,
    detection: CallbackId,
}

#[derive(Debug)]
struct ConnectionEntry {
    push_tx: mpsc::UnboundedSender<Message>,
    subscription: Option<Subscription>,
}

#[derive(Debug)]
pub struct DaemonState<C: Clock = SystemClock> {
    detector: Detector,
    backend: Box<dyn CompositorBackend>,
    /// Bumped on every backend switch; stale feed updates are dropped.
    generation: u64,
    feed: Option<JoinHandle<()>>,
    backend_tx: mpsc::UnboundedSender<BackendUpdate>,
    tracker: ContextTracker<C>,
    normalizer: EventNormalizer,
    probe: SessionProbe,
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl<C: Clock> DaemonState<C> {
    pub fn new(
        tracker_config: TrackerConfig,
        probe: SessionProbe,
        clock: C,
        backend_tx: mpsc::UnboundedSender<BackendUpdate>,
    ) -> Self {
        Self {
            detector: Detector::new(),
            backend: create_backend(CompositorKind::Unknown),
            generation: 0,
            feed: None,
            backend_tx,
            tracker: ContextTracker::new(tracker_config, clock),
            normalizer: EventNormalizer::new(),
            probe,
            connections: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn kind(&self) -> CompositorKind {
        self.detector.kind()
    }

    #[cfg(test)]
    pub fn backend(&self) -> &dyn CompositorBackend {
        self.backend.as_ref()
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &ContextTracker<C> {
        &self.tracker
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Run a detection pass over the process environment; on a new
    /// classification or a new compositor instance, rebuild the backend
    /// and restart its feed.
    pub fn detect(&mut self) -> Detection {
        let previous = self.detector.signals().clone();
        let detection = self.detector.detect();
        self.after_detection(previous, detection)
    }

    #[cfg(test)]
    pub fn detect_with(&mut self, signals: EnvSignals) -> Detection {
        let previous = self.detector.signals().clone();
        let detection = self.detector.detect_with(signals);
        self.after_detection(previous, detection)
    }

    fn after_detection(&mut self, previous: EnvSignals, detection: Detection) -> Detection {
        let instance_changed = detection.kind != CompositorKind::Unknown
            && (previous.hyprland() != self.detector.signals().hyprland()
                || previous.niri() != self.detector.signals().niri());

        if detection.changed || instance_changed {
            self.switch_backend(detection.kind);
        }
        self.establish_session();
        detection
    }

    fn switch_backend(&mut self, kind: CompositorKind) {
        if let Some(feed) = self.feed.take() {
            feed.abort();
        }
        self.generation += 1;
        self.backend = create_backend(kind);
        let sender = FeedSender::new(self.generation, self.backend_tx.clone());
        self.feed = spawn_feed(kind, self.detector.signals(), sender);
        tracing::debug!(compositor = %kind, generation = self.generation, "backend switched");
    }

    fn establish_session(&mut self) {
        if self.tracker.session().is_established() {
            return;
        }
        if self.probe.force_new {
            self.tracker.establish_session(true);
            return;
        }
        let kind = self.detector.kind();
        if kind == CompositorKind::Unknown {
            return;
        }
        let is_new = compositor_launch_time(kind, self.detector.signals()).is_some_and(
            |launched| is_new_instance(launched, SystemTime::now(), self.probe.threshold),
        );
        self.tracker.establish_session(is_new);
    }

    /// Apply a feed update. Returns `false` when it was stale and dropped.
    pub fn apply_update(&mut self, update: BackendUpdate) -> bool {
        if update.generation != self.generation {
            tracing::trace!(
                generation = update.generation,
                current = self.generation,
                "dropping stale backend update"
            );
            return false;
        }
        match update.kind {
            UpdateKind::State(backend) => self.backend = backend,
            UpdateKind::Event(raw) => {
                if let Some(signal) = self.normalizer.dispatch(raw) {
                    self.tracker.observe_power(signal);
                }
            }
        }
        true
    }

    pub fn context(&self) -> ContextSnapshot {
        self.tracker.get_context(self.backend.as_ref())
    }

    pub fn record_launch(&mut self, app_id: &str) {
        self.tracker.record_launch(app_id);
    }

    pub fn status(&self) -> CompositorStatus {
        let screens = self.backend.outputs();
        let resolver = ScreenResolver::new(self.backend.as_ref(), &screens);
        let workspace = resolver.workspace();

        CompositorStatus {
            kind: self.detector.kind(),
            label: self.detector.label().to_string(),
            workspace: workspace.name,
            workspace_id: workspace.id,
            monitor: workspace.monitor,
            focused_screen: resolver.focused_screen().map(|s| s.name.clone()),
            screens: screens
                .iter()
                .map(|screen| ScreenStatus {
                    name: screen.name.clone(),
                    scale: resolver.screen_scale(screen),
                    focused: resolver.is_screen_focused(screen),
                })
                .collect(),
            running_apps: registry::running_app_ids(self.backend.as_ref())
                .into_iter()
                .collect(),
        }
    }

    // -- Connections --

    pub fn add_connection(&mut self, id: ConnectionId, push_tx: mpsc::UnboundedSender<Message>) {
        self.connections.insert(
            id,
            ConnectionEntry {
                push_tx,
                subscription: None,
            },
        );
    }

    /// Drop a connection along with its event subscription.
    pub fn remove_connection(&mut self, id: ConnectionId) {
        if let Some(sub) = self
            .connections
            .remove(&id)
            .and_then(|entry| entry.subscription)
        {
            self.release(sub);
        }
    }

    /// Forward compositor events, and classification changes as
    /// `compositorchanged`, to the connection's push channel.
    ///
    /// Idempotent per connection.
    pub fn subscribe(&mut self, id: ConnectionId) -> Result<(), &'static str> {
        let entry = self.connections.get_mut(&id).ok_or("not_connected")?;
        if entry.subscription.is_some() {
            return Ok(());
        }

        let event_tx = entry.push_tx.clone();
        let events = self.normalizer.subscribe(move |event| {
            let _ = event_tx.send(Message::Event {
                id: 0,
                name: event.name.clone(),
                data: event.data.clone(),
            });
        });

        let detection_tx = entry.push_tx.clone();
        let detection = self.detector.subscribe(move |detection| {
            if detection.changed {
                let _ = detection_tx.send(Message::Event {
                    id: 0,
                    name: COMPOSITOR_CHANGED.to_string(),
                    data: detection.label.to_string(),
                });
            }
        });

        entry.subscription = Some(Subscription { events, detection });
        Ok(())
    }

    pub fn unsubscribe(&mut self, id: ConnectionId) {
        if let Some(sub) = self
            .connections
            .get_mut(&id)
            .and_then(|entry| entry.subscription.take())
        {
            self.release(sub);
        }
    }

    fn release(&mut self, sub: Subscription) {
        self.normalizer.unsubscribe(sub.events);
        self.detector.unsubscribe(sub.detection);
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.normalizer.subscriber_count()
    }
}

impl<C: Clock> Drop for DaemonState<C> {
    fn drop(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::compositor::{hyprland, niri};
    use crate::context::clock::ManualClock;
    use crate::events::RawEvent;
    use chrono::{FixedOffset, TimeZone};

    pub(crate) fn clock() -> ManualClock {
        ManualClock::new(
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 3, 12, 9, 0, 0)
                .unwrap(),
        )
    }

    pub(crate) fn state() -> (
        DaemonState<ManualClock>,
        mpsc::UnboundedReceiver<BackendUpdate>,
        ManualClock,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = clock();
        let state = DaemonState::new(
            TrackerConfig::default(),
            SessionProbe::default(),
            clock.clone(),
            tx,
        );
        (state, rx, clock)
    }

    fn hyprland_signals(signature: &str) -> EnvSignals {
        EnvSignals {
            hyprland_signature: Some(signature.into()),
            niri_socket: None,
        }
    }

    fn dpms(data: &str) -> UpdateKind {
        UpdateKind::Event(RawEvent::Named {
            name: "dpms".into(),
            data: data.into(),
        })
    }

    #[test]
    fn starts_neutral() {
        let (state, _rx, _clock) = state();
        assert_eq!(state.kind(), CompositorKind::Unknown);
        let status = state.status();
        assert_eq!(status.label, "Unknown");
        assert_eq!(status.workspace_id, -1);
        assert!(status.screens.is_empty());
        assert!(status.focused_screen.is_none());
    }

    #[test]
    fn unknown_detection_keeps_session_open() {
        let (mut state, _rx, _clock) = state();
        state.detect_with(EnvSignals::default());
        assert_eq!(state.generation(), 0);
        assert!(!state.tracker().session().is_established());
    }

    #[test]
    fn forced_new_session() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let probe = SessionProbe {
            force_new: true,
            ..SessionProbe::default()
        };
        let mut state = DaemonState::new(TrackerConfig::default(), probe, clock(), tx);
        state.detect_with(EnvSignals::default());
        assert!(state.tracker().is_session_start());
    }

    #[tokio::test]
    async fn old_hyprland_instance_is_not_a_new_session() {
        let (mut state, _rx, _clock) = state();
        let detection = state.detect_with(hyprland_signals("abc_1000_1"));
        assert!(detection.changed);
        assert_eq!(state.kind(), CompositorKind::Hyprland);
        assert_eq!(state.generation(), 1);
        assert!(state.tracker().session().is_established());
        assert!(!state.tracker().is_session_start());
    }

    #[tokio::test]
    async fn fresh_hyprland_instance_is_a_new_session() {
        let now = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let (mut state, _rx, _clock) = state();
        state.detect_with(hyprland_signals(&format!("abc_{now}_1")));
        assert!(state.tracker().is_session_start());
    }

    #[tokio::test]
    async fn redetect_with_same_signals_keeps_backend() {
        let (mut state, _rx, _clock) = state();
        state.detect_with(hyprland_signals("abc_1000_1"));
        let detection = state.detect_with(hyprland_signals("abc_1000_1"));
        assert!(!detection.changed);
        assert_eq!(state.generation(), 1);
    }

    #[tokio::test]
    async fn classification_change_swaps_backend() {
        let dir = tempfile::tempdir().unwrap();
        let (mut state, _rx, _clock) = state();
        state.detect_with(EnvSignals::default());
        state.detect_with(EnvSignals {
            hyprland_signature: None,
            niri_socket: Some(dir.path().join("niri.sock").display().to_string()),
        });
        assert_eq!(state.kind(), CompositorKind::Niri);
        assert_eq!(state.backend().kind(), CompositorKind::Niri);
        assert_eq!(state.generation(), 1);
    }

    #[tokio::test]
    async fn stale_updates_are_dropped() {
        let (mut state, _rx, _clock) = state();
        state.detect_with(hyprland_signals("abc_1000_1"));

        let stale = BackendUpdate {
            generation: 0,
            kind: UpdateKind::State(Box::new(niri::tests::sample())),
        };
        assert!(!state.apply_update(stale));
        assert_eq!(state.backend().kind(), CompositorKind::Hyprland);

        let fresh = BackendUpdate {
            generation: 1,
            kind: UpdateKind::State(Box::new(hyprland::tests::sample())),
        };
        assert!(state.apply_update(fresh));
        assert_eq!(state.context().workspace, "web");
    }

    #[test]
    fn dpms_events_drive_resume() {
        let (mut state, _rx, clock) = state();
        state.apply_update(BackendUpdate {
            generation: 0,
            kind: dpms("0,DP-1"),
        });
        clock.advance_secs(60);
        state.apply_update(BackendUpdate {
            generation: 0,
            kind: dpms("1,DP-1"),
        });
        assert!(state.context().is_resume_from_idle);
    }

    #[test]
    fn status_resolves_screens() {
        let (mut state, _rx, _clock) = state();
        state.apply_update(BackendUpdate {
            generation: 0,
            kind: UpdateKind::State(Box::new(hyprland::tests::sample())),
        });
        let status = state.status();
        assert_eq!(status.focused_screen.as_deref(), Some("HDMI-A-1"));
        let dp1 = status.screens.iter().find(|s| s.name == "DP-1").unwrap();
        assert_eq!(dp1.scale, 1.5);
        assert!(!dp1.focused);
        assert_eq!(status.running_apps, vec!["firefox", "kitty"]);
    }

    #[test]
    fn subscription_pushes_events_until_removed() {
        let (mut state, _rx, _clock) = state();
        let conn = ConnectionId::new();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel();
        state.add_connection(conn, push_tx);

        state.subscribe(conn).unwrap();
        state.subscribe(conn).unwrap();
        assert_eq!(state.subscriber_count(), 1);

        state.apply_update(BackendUpdate {
            generation: 0,
            kind: UpdateKind::Event(RawEvent::WindowsChanged),
        });
        match push_rx.try_recv().unwrap() {
            Message::Event { id, name, data } => {
                assert_eq!(id, 0);
                assert_eq!(name, "windowschanged");
                assert_eq!(data, "");
            }
            other => panic!("expected event, got {other:?}"),
        }

        state.remove_connection(conn);
        assert_eq!(state.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_hear_classification_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut state, _rx, _clock) = state();
        let conn = ConnectionId::new();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel();
        state.add_connection(conn, push_tx);
        state.subscribe(conn).unwrap();

        state.detect_with(EnvSignals::default());
        assert!(push_rx.try_recv().is_err());

        let niri = EnvSignals {
            hyprland_signature: None,
            niri_socket: Some(dir.path().join("niri.sock").display().to_string()),
        };
        state.detect_with(niri);
        assert_eq!(
            push_rx.try_recv().unwrap(),
            Message::Event {
                id: 0,
                name: "compositorchanged".into(),
                data: "Niri".into(),
            }
        );

        state.unsubscribe(conn);
        state.detect_with(EnvSignals::default());
        assert!(push_rx.try_recv().is_err());
    }

    #[test]
    fn subscribe_requires_connection() {
        let (mut state, _rx, _clock) = state();
        assert_eq!(state.subscribe(ConnectionId::new()), Err("not_connected"));
    }
}
