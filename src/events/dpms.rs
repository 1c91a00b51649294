//! DPMS (display power) payload parsing and state.
//!
//! Payload format is `"<state>,<monitor>"` where state is `0` (off) or
//! `1` (on). Anything else is ignored.

use chrono::{DateTime, FixedOffset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSignal {
    Off,
    On,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpmsEvent {
    pub signal: PowerSignal,
    pub monitor: String,
}

/// Parse a DPMS payload. Returns `None` for malformed input.
pub fn parse(data: &str) -> Option<DpmsEvent> {
    let (state, monitor) = data.split_once(',')?;
    let signal = match state.trim() {
        "0" => PowerSignal::Off,
        "1" => PowerSignal::On,
        _ => return None,
    };
    Some(DpmsEvent {
        signal,
        monitor: monitor.trim().to_string(),
    })
}

/// Screen power history used for idle-resume detection.
///
/// `was_off` is sticky: it is only re-armed by the next off signal, never
/// cleared by a successful resume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DpmsState {
    pub was_off: bool,
    pub on_time: Option<DateTime<FixedOffset>>,
}

impl DpmsState {
    pub fn apply(&mut self, signal: PowerSignal, now: DateTime<FixedOffset>) {
        match signal {
            PowerSignal::Off => {
                self.was_off = true;
                self.on_time = None;
            }
            PowerSignal::On if self.was_off => {
                self.on_time = Some(now);
            }
            PowerSignal::On => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .timestamp_opt(1_700_000_000 + secs, 0)
            .unwrap()
    }

    #[test]
    fn parse_off_and_on() {
        assert_eq!(
            parse("0,DP-1"),
            Some(DpmsEvent {
                signal: PowerSignal::Off,
                monitor: "DP-1".into(),
            })
        );
        assert_eq!(parse("1,eDP-1").map(|e| e.signal), Some(PowerSignal::On));
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse("0").is_none());
        assert!(parse("").is_none());
        assert!(parse("2,DP-1").is_none());
        assert!(parse("off,DP-1").is_none());
    }

    #[test]
    fn off_arms_and_clears_on_time() {
        let mut state = DpmsState::default();
        state.apply(PowerSignal::Off, at(0));
        assert!(state.was_off);
        assert!(state.on_time.is_none());
    }

    #[test]
    fn on_after_off_records_time() {
        let mut state = DpmsState::default();
        state.apply(PowerSignal::Off, at(0));
        state.apply(PowerSignal::On, at(60));
        assert!(state.was_off);
        assert_eq!(state.on_time, Some(at(60)));
    }

    #[test]
    fn on_without_off_is_ignored() {
        let mut state = DpmsState::default();
        state.apply(PowerSignal::On, at(10));
        assert_eq!(state, DpmsState::default());
    }

    #[test]
    fn repeated_on_moves_on_time() {
        let mut state = DpmsState::default();
        state.apply(PowerSignal::Off, at(0));
        state.apply(PowerSignal::On, at(60));
        state.apply(PowerSignal::On, at(900));
        assert_eq!(state.on_time, Some(at(900)));
        assert!(state.was_off);
    }
}
