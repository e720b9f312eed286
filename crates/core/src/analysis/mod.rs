//! Energy extraction: windowed FFT of each audio block, reduced to three
//! normalised bands, an `overall` mix, a log-spaced spectrum and a fixed
//! length waveform snapshot.

use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{AudioConfig, BandConfig, Result};

/// Lowest frequency represented in the log-spaced spectrum.
const SPECTRUM_MIN_HZ: f32 = 30.0;

/// The three band energies plus their weighted mix, all in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandEnergies {
    pub overall: f32,
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
}

impl BandEnergies {
    pub const ZERO: Self = Self {
        overall: 0.0,
        bass: 0.0,
        mid: 0.0,
        high: 0.0,
    };

    /// Replaces non-finite values with zero and clamps the rest to `[0, 1]`.
    pub fn sanitized(self) -> Self {
        Self {
            overall: unit(self.overall),
            bass: unit(self.bass),
            mid: unit(self.mid),
            high: unit(self.high),
        }
    }

    pub fn band(&self, index: usize) -> f32 {
        match index {
            0 => self.bass,
            1 => self.mid,
            _ => self.high,
        }
    }
}

/// Output of one analysis tick. Superseded, never mutated, by the next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyFrame {
    pub overall: f32,
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    /// Fixed-length waveform snapshot in `[-1, 1]`.
    pub waveform: Arc<[f32]>,
    /// Log-spaced magnitude spectrum normalised to `[0, 1]`.
    pub spectrum: Arc<[f32]>,
    /// Seconds of audio processed up to the middle of this block.
    pub timestamp: f64,
    pub sequence: u64,
}

impl EnergyFrame {
    /// An all-zero frame, used for silence and malformed blocks.
    pub fn silent(waveform_len: usize, spectrum_bins: usize, timestamp: f64, sequence: u64) -> Self {
        Self {
            overall: 0.0,
            bass: 0.0,
            mid: 0.0,
            high: 0.0,
            waveform: vec![0.0; waveform_len].into(),
            spectrum: vec![0.0; spectrum_bins].into(),
            timestamp,
            sequence,
        }
    }

    /// The frame published before any audio arrives.
    pub fn idle(audio: &AudioConfig) -> Self {
        Self::silent(audio.waveform_len(), audio.spectrum_bins(), 0.0, 0)
    }

    pub fn energies(&self) -> BandEnergies {
        BandEnergies {
            overall: self.overall,
            bass: self.bass,
            mid: self.mid,
            high: self.high,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.overall <= f32::EPSILON
    }
}

/// Turns raw sample blocks into [`EnergyFrame`]s.
///
/// Each band is normalised against its own running loudness ceiling: the
/// ceiling jumps up to any louder block and otherwise decays with a fixed
/// half-life, so quiet and loud passages both land in a usable range.
pub struct EnergyExtractor {
    sample_rate: u32,
    bands: BandConfig,
    waveform_len: usize,
    spectrum_bins: usize,
    processed_samples: u64,
    sequence: u64,
    band_ceilings: [f32; 3],
    spectrum_ceiling: f32,
    clean: Vec<f32>,
    magnitudes: Vec<f32>,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl EnergyExtractor {
    pub fn new(audio: &AudioConfig, bands: BandConfig) -> Self {
        Self {
            sample_rate: audio.sample_rate.max(1),
            bands,
            waveform_len: audio.waveform_len(),
            spectrum_bins: audio.spectrum_bins(),
            processed_samples: 0,
            sequence: 0,
            band_ceilings: [0.0; 3],
            spectrum_ceiling: 0.0,
            clean: Vec::new(),
            magnitudes: Vec::new(),
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn waveform_len(&self) -> usize {
        self.waveform_len
    }

    pub fn spectrum_bins(&self) -> usize {
        self.spectrum_bins
    }

    /// Clears timing and loudness history while preserving configuration.
    pub fn reset(&mut self) {
        self.processed_samples = 0;
        self.sequence = 0;
        self.band_ceilings = [0.0; 3];
        self.spectrum_ceiling = 0.0;
    }

    /// Consumes one block. Never fails: silence, short blocks and FFT errors
    /// all produce an all-zero frame.
    pub fn process_block(&mut self, samples: &[f32]) -> EnergyFrame {
        let block_size = samples.len();
        let sample_rate = self.sample_rate as f64;
        let timestamp = (self.processed_samples as f64 + block_size as f64 * 0.5) / sample_rate;
        self.processed_samples += block_size as u64;
        self.sequence += 1;

        if block_size < 2 {
            trace!(block_size, "short audio block treated as silence");
            return EnergyFrame::silent(self.waveform_len, self.spectrum_bins, timestamp, self.sequence);
        }

        self.clean.clear();
        self.clean.extend(samples.iter().map(|&sample| {
            if sample.is_finite() {
                sample.clamp(-1.0, 1.0)
            } else {
                0.0
            }
        }));

        let block_secs = block_size as f32 / self.sample_rate as f32;
        let decay = ceiling_decay(block_secs, self.bands.ceiling_half_life_secs);
        let waveform = resample(&self.clean, self.waveform_len);

        if compute_rms(&self.clean) < self.bands.noise_floor {
            self.decay_ceilings(decay);
            let mut frame = EnergyFrame::silent(self.waveform_len, self.spectrum_bins, timestamp, self.sequence);
            frame.waveform = waveform.into();
            return frame;
        }

        if let Err(err) = self.transform() {
            warn!(%err, block_size, "spectrum transform failed, emitting silent frame");
            return EnergyFrame::silent(self.waveform_len, self.spectrum_bins, timestamp, self.sequence);
        }

        let bin_hz = self.sample_rate as f32 / block_size as f32;
        let nyquist = self.sample_rate as f32 * 0.5;
        let ranges = [
            (self.bands.bass_min_hz, self.bands.bass_max_hz),
            (self.bands.bass_max_hz, self.bands.mid_max_hz),
            (self.bands.mid_max_hz, self.bands.high_max_hz.min(nyquist)),
        ];

        let mut energies = [0.0_f32; 3];
        for (band, (low, high)) in ranges.iter().enumerate() {
            let raw = band_magnitude(&self.magnitudes, *low, *high, bin_hz);
            let ceiling = (self.band_ceilings[band] * decay)
                .max(raw)
                .max(self.bands.min_ceiling.max(1.0e-6));
            self.band_ceilings[band] = ceiling;
            energies[band] = if raw < self.bands.noise_floor {
                0.0
            } else {
                unit(raw / ceiling)
            };
        }

        let weights = self.bands.overall_weights.map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 });
        let weight_sum: f32 = weights.iter().sum();
        let overall = if weight_sum > f32::EPSILON {
            unit(energies.iter().zip(weights).map(|(e, w)| e * w).sum::<f32>() / weight_sum)
        } else {
            unit(energies.iter().sum::<f32>() / 3.0)
        };

        let spectrum = self.log_spectrum(bin_hz, nyquist, decay);

        EnergyFrame {
            overall,
            bass: energies[0],
            mid: energies[1],
            high: energies[2],
            waveform: waveform.into(),
            spectrum: spectrum.into(),
            timestamp,
            sequence: self.sequence,
        }
    }

    fn decay_ceilings(&mut self, decay: f32) {
        for ceiling in &mut self.band_ceilings {
            *ceiling *= decay;
        }
        self.spectrum_ceiling *= decay;
    }

    fn log_spectrum(&mut self, bin_hz: f32, nyquist: f32, decay: f32) -> Vec<f32> {
        let bins = self.spectrum_bins;
        let low = SPECTRUM_MIN_HZ;
        let high = self.bands.high_max_hz.min(nyquist).max(low * 2.0);
        let ratio = high / low;

        let mut raw = Vec::with_capacity(bins);
        for k in 0..bins {
            let start_hz = low * ratio.powf(k as f32 / bins as f32);
            let end_hz = low * ratio.powf((k + 1) as f32 / bins as f32);
            let start = (start_hz / bin_hz) as usize;
            let end = ((end_hz / bin_hz) as usize).max(start + 1).min(self.magnitudes.len());
            let peak = if start < end {
                self.magnitudes[start..end].iter().copied().fold(0.0_f32, f32::max)
            } else {
                0.0
            };
            raw.push(peak);
        }

        let loudest = raw.iter().copied().fold(0.0_f32, f32::max);
        self.spectrum_ceiling = (self.spectrum_ceiling * decay)
            .max(loudest)
            .max(self.bands.min_ceiling.max(1.0e-6));
        let ceiling = self.spectrum_ceiling;
        raw.into_iter()
            .map(|value| {
                if value < self.bands.noise_floor {
                    0.0
                } else {
                    unit(value / ceiling)
                }
            })
            .collect()
    }

    fn transform(&mut self) -> Result<()> {
        let len = self.clean.len();
        let fft = prepare_fft(&mut self.fft_planner, &mut self.fft, len);

        for (index, value) in self.clean.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let norm = 2.0 / len as f32;
        self.magnitudes.clear();
        self.magnitudes
            .extend(fft.spectrum.iter().map(|bin| bin.norm() * norm));
        Ok(())
    }
}

fn prepare_fft<'a>(
    planner: &mut RealFftPlanner<f32>,
    slot: &'a mut Option<FftResources>,
    size: usize,
) -> &'a mut FftResources {
    let rebuild = slot.as_ref().map(|fft| fft.size != size).unwrap_or(true);

    if rebuild {
        let plan = planner.plan_fft_forward(size);
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let input = plan.make_input_vec();
        *slot = None;
        return slot.insert(FftResources {
            size,
            plan,
            scratch,
            spectrum,
            input,
        });
    }

    match slot {
        Some(fft) => fft,
        None => unreachable!("fft resources exist when no rebuild is needed"),
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for EnergyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnergyExtractor")
            .field("sample_rate", &self.sample_rate)
            .field("waveform_len", &self.waveform_len)
            .field("spectrum_bins", &self.spectrum_bins)
            .field("processed_samples", &self.processed_samples)
            .field("sequence", &self.sequence)
            .field("band_ceilings", &self.band_ceilings)
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

/// Clamps to `[0, 1]`, mapping NaN and infinities to zero.
pub(crate) fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn ceiling_decay(block_secs: f32, half_life_secs: f32) -> f32 {
    let half_life = if half_life_secs.is_finite() {
        half_life_secs.clamp(0.05, 120.0)
    } else {
        6.0
    };
    0.5_f32.powf(block_secs / half_life)
}

/// L2 norm of the magnitude bins covering `[low_hz, high_hz]`, DC excluded.
fn band_magnitude(magnitudes: &[f32], low_hz: f32, high_hz: f32, bin_hz: f32) -> f32 {
    if !(high_hz > low_hz) || magnitudes.is_empty() {
        return 0.0;
    }
    let start = ((low_hz / bin_hz).ceil() as usize).max(1);
    let end = ((high_hz / bin_hz).floor() as usize + 1).min(magnitudes.len());
    if start >= end {
        return 0.0;
    }
    magnitudes[start..end]
        .iter()
        .map(|m| m * m)
        .sum::<f32>()
        .sqrt()
}

fn resample(samples: &[f32], len: usize) -> Vec<f32> {
    if samples.is_empty() {
        return vec![0.0; len];
    }
    if samples.len() == 1 || len == 1 {
        return vec![samples[0]; len];
    }
    let step = (samples.len() - 1) as f32 / (len - 1) as f32;
    (0..len)
        .map(|i| {
            let position = i as f32 * step;
            let index = position.floor() as usize;
            let next = (index + 1).min(samples.len() - 1);
            let t = position - index as f32;
            samples[index] + (samples[next] - samples[index]) * t
        })
        .collect()
}

fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
