//! Non-blocking handoff of the latest analysis snapshot to the render side.
//!
//! Two snapshot slots and an atomic "front" index. The writer fills the back
//! slot and then flips the index; the reader loads whichever slot is front.
//! Each slot is an [`ArcSwap`], so a reader that races a writer still walks
//! away with one complete snapshot, never a mix of two. Only the newest
//! snapshot matters, so nothing is queued.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use arc_swap::ArcSwap;

use crate::{EngineConfig, EnergyFrame, SmoothedState};

/// Immutable analysis snapshot published to the render side.
#[derive(Debug, Clone)]
pub struct PublishedState {
    pub frame: EnergyFrame,
    pub smoothed: SmoothedState,
    /// Whether the capture facility reports active playback.
    pub playing: bool,
    /// Smoothing reset epoch the snapshot was computed under.
    pub reset_epoch: u64,
    /// Publication counter; zero for the initial idle snapshot.
    pub sequence: u64,
}

impl PublishedState {
    /// Zero-energy snapshot shown before any audio arrives, or forever when
    /// no capture facility exists.
    pub fn idle(config: &EngineConfig) -> Self {
        Self {
            frame: EnergyFrame::idle(&config.audio),
            smoothed: SmoothedState::zeroed(config.beat.history_depth()),
            playing: false,
            reset_epoch: 0,
            sequence: 0,
        }
    }
}

struct Slots {
    slots: [ArcSwap<PublishedState>; 2],
    front: AtomicUsize,
    published: AtomicU64,
}

/// Creates a connected writer/reader pair seeded with `initial`.
pub fn state_bridge(initial: PublishedState) -> (BridgeWriter, BridgeReader) {
    let initial = Arc::new(initial);
    let shared = Arc::new(Slots {
        slots: [
            ArcSwap::new(initial.clone()),
            ArcSwap::new(initial),
        ],
        front: AtomicUsize::new(0),
        published: AtomicU64::new(0),
    });

    (
        BridgeWriter {
            shared: shared.clone(),
        },
        BridgeReader { shared },
    )
}

/// Producer half, owned by the analysis context. Not `Clone`: there is a
/// single producer.
pub struct BridgeWriter {
    shared: Arc<Slots>,
}

impl BridgeWriter {
    /// Publishes a snapshot and returns the publication count. Never waits
    /// on readers.
    pub fn publish(&self, mut state: PublishedState) -> u64 {
        let sequence = self.shared.published.load(Ordering::Relaxed) + 1;
        state.sequence = sequence;

        let back = 1 - self.shared.front.load(Ordering::Acquire);
        self.shared.slots[back].store(Arc::new(state));
        self.shared.front.store(back, Ordering::Release);
        self.shared.published.store(sequence, Ordering::Release);
        sequence
    }

    pub fn reader(&self) -> BridgeReader {
        BridgeReader {
            shared: self.shared.clone(),
        }
    }
}

/// Consumer half, cloned freely by render-side code.
#[derive(Clone)]
pub struct BridgeReader {
    shared: Arc<Slots>,
}

impl BridgeReader {
    /// The current front snapshot. Never blocks; returns the previous
    /// snapshot when no new one has been published.
    pub fn latest(&self) -> Arc<PublishedState> {
        let front = self.shared.front.load(Ordering::Acquire);
        self.shared.slots[front].load_full()
    }

    /// Number of snapshots published so far.
    pub fn published(&self) -> u64 {
        self.shared.published.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for BridgeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeWriter")
            .field("published", &self.shared.published.load(Ordering::Relaxed))
            .finish()
    }
}

impl std::fmt::Debug for BridgeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeReader")
            .field("published", &self.published())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn snapshot(config: &EngineConfig, level: f32) -> PublishedState {
        let mut state = PublishedState::idle(config);
        state.frame.overall = level;
        state.frame.bass = level;
        state.smoothed.overall = level;
        state.smoothed.bass = level;
        state
    }

    #[test]
    fn reader_sees_idle_state_before_first_publish() {
        let config = EngineConfig::default();
        let (_writer, reader) = state_bridge(PublishedState::idle(&config));

        let state = reader.latest();
        assert_eq!(state.sequence, 0);
        assert!(state.frame.is_silent());
        assert_eq!(reader.published(), 0);
    }

    #[test]
    fn latest_publish_wins() {
        let config = EngineConfig::default();
        let (writer, reader) = state_bridge(PublishedState::idle(&config));

        writer.publish(snapshot(&config, 0.2));
        writer.publish(snapshot(&config, 0.4));
        writer.publish(snapshot(&config, 0.6));

        let state = reader.latest();
        assert_eq!(state.sequence, 3);
        assert_eq!(state.frame.overall, 0.6);
    }

    #[test]
    fn held_snapshot_survives_later_publishes() {
        let config = EngineConfig::default();
        let (writer, reader) = state_bridge(PublishedState::idle(&config));

        writer.publish(snapshot(&config, 0.1));
        let held = reader.latest();
        for i in 0..10 {
            writer.publish(snapshot(&config, 0.2 + i as f32 * 0.05));
        }

        assert_eq!(held.frame.overall, 0.1);
        assert_eq!(held.smoothed.overall, 0.1);
    }

    #[test]
    fn concurrent_readers_never_see_torn_snapshots() {
        let config = EngineConfig::default();
        let (writer, reader) = state_bridge(PublishedState::idle(&config));

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let reader = reader.clone();
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        let state = reader.latest();
                        assert_eq!(state.frame.overall, state.smoothed.overall);
                        assert_eq!(state.frame.bass, state.smoothed.bass);
                    }
                })
            })
            .collect();

        for i in 0..5_000 {
            writer.publish(snapshot(&config, (i % 100) as f32 / 100.0));
        }

        for handle in readers {
            handle.join().unwrap();
        }
        assert_eq!(reader.published(), 5_000);
    }
}
