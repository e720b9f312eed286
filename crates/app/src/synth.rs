use std::f32::consts::TAU;

use spectrum_overlay_core::AudioBlock;

/// Deterministic stand-in for a capture facility: a kick drum on every beat
/// over a slow bass line, a mid melody and a hi-hat tone.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    sample_rate: f32,
    block_size: usize,
    beat_secs: f32,
    position: u64,
}

const MELODY_HZ: [f32; 4] = [330.0, 392.0, 440.0, 294.0];

impl SyntheticSource {
    pub fn new(sample_rate: u32, block_size: usize, tempo_bpm: f32) -> Self {
        let tempo = if tempo_bpm.is_finite() { tempo_bpm.clamp(30.0, 300.0) } else { 120.0 };
        Self {
            sample_rate: sample_rate.max(1) as f32,
            block_size: block_size.max(1),
            beat_secs: 60.0 / tempo,
            position: 0,
        }
    }

    pub fn block_secs(&self) -> f32 {
        self.block_size as f32 / self.sample_rate
    }

    pub fn next_block(&mut self) -> AudioBlock {
        let samples = (0..self.block_size)
            .map(|i| self.sample_at((self.position + i as u64) as f64 / self.sample_rate as f64))
            .collect();
        self.position += self.block_size as u64;
        AudioBlock::new(samples, true)
    }

    fn sample_at(&self, t: f64) -> f32 {
        let beat = (t / self.beat_secs as f64).floor();
        let since_beat = (t - beat * self.beat_secs as f64) as f32;
        let bar_beat = beat as usize % MELODY_HZ.len();
        let t = t as f32;

        let kick_env = (-since_beat * 18.0).exp();
        let kick = (TAU * (50.0 + 60.0 * kick_env) * since_beat).sin() * kick_env * 0.9;
        let bass = (TAU * 55.0 * t).sin() * 0.15;
        let melody = (TAU * MELODY_HZ[bar_beat] * t).sin() * 0.2;
        let hat_env = (-((since_beat - self.beat_secs * 0.5).abs()) * 40.0).exp();
        let hat = (TAU * 7_200.0 * t).sin() * hat_env * 0.12;

        (kick + bass + melody + hat).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_have_requested_size_and_range() {
        let mut source = SyntheticSource::new(48_000, 1024, 120.0);
        for _ in 0..10 {
            let block = source.next_block();
            assert_eq!(block.samples.len(), 1024);
            assert!(block.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        }
    }

    #[test]
    fn is_deterministic() {
        let mut a = SyntheticSource::new(48_000, 512, 128.0);
        let mut b = SyntheticSource::new(48_000, 512, 128.0);
        assert_eq!(a.next_block().samples, b.next_block().samples);
    }
}
