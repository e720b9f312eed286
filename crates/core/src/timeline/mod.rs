use serde::{Deserialize, Serialize};

use crate::ModeKind;

/// Longest frame delta the render side accepts; longer stalls are treated
/// as this so animations do not leap.
pub const MAX_FRAME_SECS: f32 = 0.1;

/// Render-side clock fed with per-frame deltas.
#[derive(Debug, Default, Clone)]
pub struct FrameClock {
    elapsed: f64,
    frames: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
        self.frames = 0;
    }

    /// Advances by `delta` seconds and returns the delta actually applied.
    pub fn advance(&mut self, delta: f32) -> f32 {
        let delta = if delta.is_finite() {
            delta.clamp(0.0, MAX_FRAME_SECS)
        } else {
            0.0
        };
        self.elapsed += delta as f64;
        self.frames += 1;
        delta
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledSwitch {
    pub at_secs: f64,
    pub mode: ModeKind,
}

impl ScheduledSwitch {
    pub fn new(at_secs: f64, mode: ModeKind) -> Self {
        Self { at_secs, mode }
    }
}

/// Timed list of mode switches, used by the demo host.
#[derive(Debug, Default)]
pub struct ModeSchedule {
    switches: Vec<ScheduledSwitch>,
    next: usize,
}

impl ModeSchedule {
    pub fn new(mut switches: Vec<ScheduledSwitch>) -> Self {
        switches.retain(|s| s.at_secs.is_finite());
        switches.sort_by(|a, b| a.at_secs.total_cmp(&b.at_secs));
        Self { switches, next: 0 }
    }

    /// Every mode in turn, `interval` seconds apart, starting at zero.
    pub fn cycle(modes: &[ModeKind], interval: f64) -> Self {
        let interval = if interval.is_finite() { interval.max(0.0) } else { 0.0 };
        Self::new(
            modes
                .iter()
                .enumerate()
                .map(|(i, mode)| ScheduledSwitch::new(i as f64 * interval, *mode))
                .collect(),
        )
    }

    /// Returns the latest switch that has come due since the last poll.
    pub fn poll(&mut self, clock: &FrameClock) -> Option<ModeKind> {
        let mut due = None;
        while let Some(switch) = self.switches.get(self.next) {
            if clock.elapsed() < switch.at_secs {
                break;
            }
            due = Some(switch.mode);
            self.next += 1;
        }
        due
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.switches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_hostile_deltas() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.advance(-1.0), 0.0);
        assert_eq!(clock.advance(f32::NAN), 0.0);
        assert_eq!(clock.advance(5.0), MAX_FRAME_SECS);
        assert_eq!(clock.frames(), 3);
        assert!((clock.elapsed() - MAX_FRAME_SECS as f64).abs() < 1e-9);
    }

    #[test]
    fn schedule_fires_in_order() {
        let mut schedule = ModeSchedule::new(vec![
            ScheduledSwitch::new(0.2, ModeKind::Helix),
            ScheduledSwitch::new(0.0, ModeKind::Blob),
        ]);
        let mut clock = FrameClock::new();

        assert_eq!(schedule.poll(&clock), Some(ModeKind::Blob));
        assert_eq!(schedule.poll(&clock), None);
        clock.advance(0.1);
        clock.advance(0.1);
        assert_eq!(schedule.poll(&clock), Some(ModeKind::Helix));
        assert!(schedule.is_finished());
    }

    #[test]
    fn late_poll_returns_latest_due_switch() {
        let mut schedule = ModeSchedule::cycle(&[ModeKind::Blob, ModeKind::Helix, ModeKind::Starfield], 0.05);
        let mut clock = FrameClock::new();
        clock.advance(0.1);
        assert_eq!(schedule.poll(&clock), Some(ModeKind::Starfield));
    }
}
