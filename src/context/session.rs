//! Session state and new-compositor-instance detection.
//!
//! A session counts as new when the compositor instance started shortly
//! before this process. Hyprland embeds its launch epoch in the instance
//! signature (`<hash>_<epoch>_<random>`); for Niri the socket file is
//! created at launch, so its modification time is used.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset};

use crate::compositor::{CompositorKind, EnvSignals};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub is_new_session: bool,
    pub session_start: DateTime<FixedOffset>,
    established: bool,
}

impl SessionState {
    pub fn new(session_start: DateTime<FixedOffset>) -> Self {
        Self {
            is_new_session: false,
            session_start,
            established: false,
        }
    }

    /// Record whether this is a new session. Only the first call counts.
    pub fn establish(&mut self, is_new: bool) -> bool {
        if self.established {
            return false;
        }
        self.established = true;
        self.is_new_session = is_new;
        true
    }

    pub fn is_established(&self) -> bool {
        self.established
    }
}

/// Launch epoch embedded in a Hyprland instance signature.
pub fn hyprland_launch_time(signature: &str) -> Option<SystemTime> {
    let secs: u64 = signature.split('_').nth(1)?.parse().ok()?;
    Some(UNIX_EPOCH + Duration::from_secs(secs))
}

/// Creation time of the Niri socket.
pub fn niri_launch_time(socket: &Path) -> Option<SystemTime> {
    std::fs::metadata(socket).and_then(|m| m.modified()).ok()
}

/// When the detected compositor instance started, if knowable.
pub fn compositor_launch_time(kind: CompositorKind, signals: &EnvSignals) -> Option<SystemTime> {
    match kind {
        CompositorKind::Hyprland => signals.hyprland().and_then(hyprland_launch_time),
        CompositorKind::Niri => signals.niri().map(Path::new).and_then(niri_launch_time),
        CompositorKind::Unknown => None,
    }
}

/// Whether a compositor launched at `launched` is new relative to `now`.
///
/// A launch time in the future (clock skew) counts as new.
pub fn is_new_instance(launched: SystemTime, now: SystemTime, threshold: Duration) -> bool {
    match now.duration_since(launched) {
        Ok(age) => age < threshold,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn signature_epoch() {
        assert_eq!(
            hyprland_launch_time("4d4f8d2f_1700000000_1234567"),
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
        assert_eq!(hyprland_launch_time("nounderscore"), None);
        assert_eq!(hyprland_launch_time("abc_notanumber_1"), None);
    }

    #[test]
    fn niri_socket_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("niri.wayland-1.42.sock");
        std::fs::write(&socket, b"").unwrap();
        let launched = niri_launch_time(&socket).unwrap();
        assert!(is_new_instance(
            launched,
            SystemTime::now(),
            Duration::from_secs(120)
        ));
        assert!(niri_launch_time(&dir.path().join("missing.sock")).is_none());
    }

    #[test]
    fn new_instance_threshold() {
        let launched = UNIX_EPOCH + Duration::from_secs(1_000);
        let threshold = Duration::from_secs(120);
        assert!(is_new_instance(launched, launched + Duration::from_secs(30), threshold));
        assert!(!is_new_instance(launched, launched + Duration::from_secs(600), threshold));
        assert!(is_new_instance(launched, launched - Duration::from_secs(5), threshold));
    }

    #[test]
    fn unknown_has_no_launch_time() {
        assert!(compositor_launch_time(CompositorKind::Unknown, &EnvSignals::default()).is_none());
    }

    #[test]
    fn establish_is_one_shot() {
        let start = FixedOffset::east_opt(0)
            .unwrap()
            .timestamp_opt(0, 0)
            .unwrap();
        let mut session = SessionState::new(start);
        assert!(session.establish(true));
        assert!(!session.establish(false));
        assert!(session.is_new_session);
        assert!(session.is_established());
    }
}
