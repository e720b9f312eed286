//! Telemetry events for optional external logging.
//!
//! Emission goes through a bounded channel with `try_send`; when nobody is
//! draining it the event is counted as dropped and the producer moves on.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ModeKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    ModeSwitched {
        from: Option<ModeKind>,
        to: ModeKind,
        requested: ModeKind,
    },
    Heartbeat {
        timestamp: f64,
        bass: f32,
    },
    CapabilityFallback {
        mode: ModeKind,
        fallback: ModeKind,
    },
    CaptureUnavailable {
        reason: String,
    },
}

/// Cheap, cloneable producer handle.
#[derive(Debug, Clone)]
pub struct Telemetry {
    sender: Option<Sender<TelemetryEvent>>,
    dropped: Arc<AtomicU64>,
}

/// Creates a telemetry producer and the receiver the host drains.
pub fn telemetry_channel(capacity: usize) -> (Telemetry, Receiver<TelemetryEvent>) {
    let (sender, receiver) = bounded(capacity.max(1));
    (
        Telemetry {
            sender: Some(sender),
            dropped: Arc::new(AtomicU64::new(0)),
        },
        receiver,
    )
}

impl Telemetry {
    /// A producer that only traces events.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn emit(&self, event: TelemetryEvent) {
        debug!(?event, "telemetry");
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Events discarded because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_events_in_order() {
        let (telemetry, receiver) = telemetry_channel(8);
        telemetry.emit(TelemetryEvent::Heartbeat {
            timestamp: 1.0,
            bass: 0.9,
        });
        telemetry.emit(TelemetryEvent::CapabilityFallback {
            mode: ModeKind::Blob,
            fallback: ModeKind::BarMeter,
        });

        let events: Vec<_> = receiver.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TelemetryEvent::Heartbeat { .. }));
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (telemetry, receiver) = telemetry_channel(2);
        for i in 0..10 {
            telemetry.emit(TelemetryEvent::Heartbeat {
                timestamp: i as f64,
                bass: 0.5,
            });
        }
        assert_eq!(receiver.len(), 2);
        assert_eq!(telemetry.dropped(), 8);
    }

    #[test]
    fn disabled_telemetry_is_a_no_op() {
        let telemetry = Telemetry::disabled();
        telemetry.emit(TelemetryEvent::CaptureUnavailable {
            reason: "none".into(),
        });
        assert_eq!(telemetry.dropped(), 0);
    }

    #[test]
    fn events_serialise_with_tag() {
        let event = TelemetryEvent::ModeSwitched {
            from: None,
            to: ModeKind::Helix,
            requested: ModeKind::Helix,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"mode_switched\""));
        assert!(json.contains("\"helix\""));
    }
}
