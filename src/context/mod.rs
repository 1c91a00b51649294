//! Context tracker: time-windowed facts derived from compositor events.
//!
//! Tracks three pieces of state: whether this is a fresh compositor
//! session, the DPMS off/on history, and the last app the launcher
//! started. All windows are evaluated lazily at read time; nothing here
//! runs on a timer.
//!
//! DPMS transitions:
//!
//! ```text
//! Active ──off──▶ ScreenOff (was_off, on_time = None)
//!                    │
//!                    on
//!                    ▼
//!          RecentlyResumed (was_off, on_time = now)
//! ```
//!
//! `is_resume_from_idle` holds only in RecentlyResumed and inside the
//! resume window. `was_off` stays set until the next off signal re-arms it.

pub mod clock;
pub mod session;
pub mod snapshot;

use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Timelike};

use crate::compositor::CompositorBackend;
use crate::events::{DpmsState, PowerSignal};
use crate::registry;
use crate::resolver::ScreenResolver;

pub use clock::{Clock, SystemClock};
pub use session::SessionState;
pub use snapshot::ContextSnapshot;

/// Lengths of the tracker's time windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub sequence_window: Duration,
    pub session_start_window: Duration,
    pub resume_window: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sequence_window: Duration::from_secs(10 * 60),
            session_start_window: Duration::from_secs(5 * 60),
            resume_window: Duration::from_secs(5 * 60),
        }
    }
}

/// Last launch reported by the consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSequenceState {
    pub last_app: String,
    pub last_launch: Option<DateTime<FixedOffset>>,
}

/// `now - since < window`. Negative elapsed time counts as inside.
fn within(since: DateTime<FixedOffset>, now: DateTime<FixedOffset>, window: Duration) -> bool {
    match now.signed_duration_since(since).to_std() {
        Ok(elapsed) => elapsed < window,
        Err(_) => true,
    }
}

#[derive(Debug)]
pub struct ContextTracker<C: Clock = SystemClock> {
    clock: C,
    config: TrackerConfig,
    session: SessionState,
    dpms: DpmsState,
    launch: LaunchSequenceState,
}

impl<C: Clock> ContextTracker<C> {
    /// The session start time is the moment the tracker is created.
    pub fn new(config: TrackerConfig, clock: C) -> Self {
        let session = SessionState::new(clock.now());
        Self {
            clock,
            config,
            session,
            dpms: DpmsState::default(),
            launch: LaunchSequenceState::default(),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    #[cfg(test)]
    pub fn dpms(&self) -> &DpmsState {
        &self.dpms
    }

    /// Set the new-session flag once; returns `false` if already set.
    pub fn establish_session(&mut self, is_new: bool) -> bool {
        let applied = self.session.establish(is_new);
        if applied {
            tracing::info!(new_session = is_new, "session established");
        }
        applied
    }

    pub fn record_launch(&mut self, app_id: &str) {
        tracing::debug!(app_id, "launch recorded");
        self.launch = LaunchSequenceState {
            last_app: app_id.to_string(),
            last_launch: Some(self.clock.now()),
        };
    }

    pub fn observe_power(&mut self, signal: PowerSignal) {
        tracing::debug!(?signal, "dpms");
        self.dpms.apply(signal, self.clock.now());
    }

    pub fn is_within_sequence_window(&self) -> bool {
        if self.launch.last_app.is_empty() {
            return false;
        }
        self.launch
            .last_launch
            .is_some_and(|at| within(at, self.clock.now(), self.config.sequence_window))
    }

    pub fn is_session_start(&self) -> bool {
        self.session.is_new_session
            && within(
                self.session.session_start,
                self.clock.now(),
                self.config.session_start_window,
            )
    }

    pub fn is_resume_from_idle(&self) -> bool {
        if !self.dpms.was_off {
            return false;
        }
        self.dpms
            .on_time
            .is_some_and(|at| within(at, self.clock.now(), self.config.resume_window))
    }

    /// Assemble a snapshot from the clock, the backend and tracker state.
    pub fn get_context(&self, backend: &dyn CompositorBackend) -> ContextSnapshot {
        let now = self.clock.now();
        let resolver = ScreenResolver::new(backend, &[]);
        let last_app = if self.is_within_sequence_window() {
            self.launch.last_app.clone()
        } else {
            String::new()
        };

        ContextSnapshot {
            hour: now.hour(),
            day: now.weekday().num_days_from_monday(),
            workspace: resolver.current_workspace(),
            workspace_id: resolver.current_workspace_id(),
            monitor: resolver.current_monitor(),
            last_app,
            is_session_start: self.is_session_start(),
            is_resume_from_idle: self.is_resume_from_idle(),
            running_apps: registry::running_app_ids(backend),
        }
    }
}
