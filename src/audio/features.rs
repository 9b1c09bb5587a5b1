use super::mel::{dct_ortho_matrix, MelFilterbank};
use super::{Waveform, TARGET_SAMPLE_RATE};
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;
use thiserror::Error;

pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;
pub const N_MELS: usize = 128;
pub const N_MFCC: usize = 13;
/// 13 MFCC means, spectral centroid mean, spectral bandwidth mean.
pub const FEATURE_LENGTH: usize = N_MFCC + 2;

const AMIN: f64 = 1e-10;
const TOP_DB: f64 = 80.0;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Cannot extract features from an empty signal")]
    EmptySignal,
    #[error("Expected audio sampled at {expected} Hz, got {actual} Hz")]
    SampleRate { expected: u32, actual: u32 },
    #[error("FFT failed: {0}")]
    Fft(String),
}

/// Per-clip summary fed to the classifier. Field order is the order of
/// [`FeatureVector::to_vec`] and must not change.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    pub mfcc: [f64; N_MFCC],
    pub spectral_centroid: f64,
    pub spectral_bandwidth: f64,
}

impl FeatureVector {
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(FEATURE_LENGTH);
        out.extend_from_slice(&self.mfcc);
        out.push(self.spectral_centroid);
        out.push(self.spectral_bandwidth);
        out
    }
}

/// Holds the FFT plan, window and filterbank so they are built once and
/// shared across requests.
pub struct FeatureExtractor {
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    filterbank: MelFilterbank,
    dct: Vec<Vec<f64>>,
    bin_frequencies: Vec<f64>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(N_FFT);
        // Periodic Hann.
        let window = (0..N_FFT)
            .map(|n| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / N_FFT as f64).cos())
            .collect();
        let bin_frequencies = (0..N_FFT / 2 + 1)
            .map(|k| k as f64 * TARGET_SAMPLE_RATE as f64 / N_FFT as f64)
            .collect();
        FeatureExtractor {
            fft,
            window,
            filterbank: MelFilterbank::new(TARGET_SAMPLE_RATE, N_FFT, N_MELS),
            dct: dct_ortho_matrix(N_MFCC, N_MELS),
            bin_frequencies,
        }
    }

    pub fn extract(&self, waveform: &Waveform) -> Result<FeatureVector, FeatureError> {
        if waveform.sample_rate() != TARGET_SAMPLE_RATE {
            return Err(FeatureError::SampleRate {
                expected: TARGET_SAMPLE_RATE,
                actual: waveform.sample_rate(),
            });
        }
        if waveform.is_empty() {
            return Err(FeatureError::EmptySignal);
        }

        let samples = waveform.samples();
        let pad = N_FFT / 2;
        let mut padded = vec![0.0f64; samples.len() + 2 * pad];
        for (dst, &src) in padded[pad..].iter_mut().zip(samples) {
            *dst = src as f64;
        }
        let n_frames = 1 + samples.len() / HOP_LENGTH;

        let mut input = self.fft.make_input_vec();
        let mut spectrum: Vec<Complex<f64>> = self.fft.make_output_vec();
        let mut scratch = self.fft.make_scratch_vec();
        let n_bins = spectrum.len();
        let mut magnitude = vec![0.0f64; n_bins];
        let mut power = vec![0.0f64; n_bins];

        // Mel energies are kept for every frame because the dB floor depends
        // on the loudest cell of the whole clip.
        let mut mel_frames = vec![0.0f64; n_frames * N_MELS];
        let mut centroid_sum = 0.0;
        let mut bandwidth_sum = 0.0;

        for frame in 0..n_frames {
            let start = frame * HOP_LENGTH;
            for ((dst, &x), &w) in input
                .iter_mut()
                .zip(&padded[start..start + N_FFT])
                .zip(&self.window)
            {
                *dst = x * w;
            }
            self.fft
                .process_with_scratch(&mut input, &mut spectrum, &mut scratch)
                .map_err(|e| FeatureError::Fft(e.to_string()))?;

            for (k, c) in spectrum.iter().enumerate() {
                magnitude[k] = c.norm();
                power[k] = c.norm_sqr();
            }

            self.filterbank
                .apply(&power, &mut mel_frames[frame * N_MELS..(frame + 1) * N_MELS]);

            let (centroid, bandwidth) = self.spectral_shape(&magnitude);
            centroid_sum += centroid;
            bandwidth_sum += bandwidth;
        }

        power_to_db(&mut mel_frames);

        let mut mfcc_sum = [0.0f64; N_MFCC];
        for frame in mel_frames.chunks_exact(N_MELS) {
            for (coefficient, row) in mfcc_sum.iter_mut().zip(&self.dct) {
                *coefficient += row.iter().zip(frame).map(|(a, b)| a * b).sum::<f64>();
            }
        }

        let frames = n_frames as f64;
        Ok(FeatureVector {
            mfcc: mfcc_sum.map(|s| s / frames),
            spectral_centroid: centroid_sum / frames,
            spectral_bandwidth: bandwidth_sum / frames,
        })
    }

    /// Centroid and second-order bandwidth of one magnitude frame. A frame
    /// with no energy reports zero for both.
    fn spectral_shape(&self, magnitude: &[f64]) -> (f64, f64) {
        let total: f64 = magnitude.iter().sum();
        if total <= f64::MIN_POSITIVE {
            return (0.0, 0.0);
        }
        let centroid = magnitude
            .iter()
            .zip(&self.bin_frequencies)
            .map(|(m, f)| m * f)
            .sum::<f64>()
            / total;
        let spread = magnitude
            .iter()
            .zip(&self.bin_frequencies)
            .map(|(m, f)| m * (f - centroid).powi(2))
            .sum::<f64>()
            / total;
        (centroid, spread.sqrt())
    }
}

/// In-place conversion to decibels, clipped to `TOP_DB` below the peak.
fn power_to_db(values: &mut [f64]) {
    let mut peak = f64::NEG_INFINITY;
    for v in values.iter_mut() {
        *v = 10.0 * v.max(AMIN).log10();
        peak = peak.max(*v);
    }
    let floor = peak - TOP_DB;
    for v in values.iter_mut() {
        *v = v.max(floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, seconds: f64) -> Waveform {
        let n = (seconds * TARGET_SAMPLE_RATE as f64) as usize;
        let fade = N_FFT;
        let samples = (0..n)
            .map(|i| {
                let envelope = if i < fade {
                    i as f64 / fade as f64
                } else if i >= n - fade {
                    (n - i) as f64 / fade as f64
                } else {
                    1.0
                };
                let t = i as f64 / TARGET_SAMPLE_RATE as f64;
                (0.5 * envelope * (2.0 * std::f64::consts::PI * freq * t).sin()) as f32
            })
            .collect();
        Waveform::new(samples, TARGET_SAMPLE_RATE)
    }

    #[test]
    fn vector_has_fifteen_values_in_order() {
        let features = FeatureExtractor::new().extract(&sine(440.0, 1.0)).unwrap();
        let values = features.to_vec();
        assert_eq!(values.len(), FEATURE_LENGTH);
        assert_eq!(values[..N_MFCC], features.mfcc);
        assert_eq!(values[13], features.spectral_centroid);
        assert_eq!(values[14], features.spectral_bandwidth);
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn pure_tone_centroid_sits_on_the_tone() {
        let features = FeatureExtractor::new().extract(&sine(1000.0, 5.0)).unwrap();
        assert!(
            (features.spectral_centroid - 1000.0).abs() < 30.0,
            "centroid {}",
            features.spectral_centroid
        );
        assert!(
            features.spectral_bandwidth < 300.0,
            "bandwidth {}",
            features.spectral_bandwidth
        );
    }

    #[test]
    fn higher_tone_has_higher_centroid() {
        let extractor = FeatureExtractor::new();
        let low = extractor.extract(&sine(300.0, 2.0)).unwrap();
        let high = extractor.extract(&sine(3000.0, 2.0)).unwrap();
        assert!(high.spectral_centroid > low.spectral_centroid);
        assert_ne!(low.mfcc, high.mfcc);
    }

    #[test]
    fn silence_hits_the_db_floor() {
        let silence = Waveform::new(vec![0.0; TARGET_SAMPLE_RATE as usize], TARGET_SAMPLE_RATE);
        let features = FeatureExtractor::new().extract(&silence).unwrap();
        let expected_c0 = -100.0 * (N_MELS as f64).sqrt();
        assert!((features.mfcc[0] - expected_c0).abs() < 1e-6, "{}", features.mfcc[0]);
        for c in &features.mfcc[1..] {
            assert!(c.abs() < 1e-6, "{}", c);
        }
        assert_eq!(features.spectral_centroid, 0.0);
        assert_eq!(features.spectral_bandwidth, 0.0);
    }

    #[test]
    fn very_short_clip_yields_one_frame() {
        let short = Waveform::new(vec![0.1; 100], TARGET_SAMPLE_RATE);
        let features = FeatureExtractor::new().extract(&short).unwrap();
        assert!(features.to_vec().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn rejects_empty_signal() {
        let empty = Waveform::new(vec![], TARGET_SAMPLE_RATE);
        assert!(matches!(
            FeatureExtractor::new().extract(&empty),
            Err(FeatureError::EmptySignal)
        ));
    }

    #[test]
    fn rejects_wrong_sample_rate() {
        let cd = Waveform::new(vec![0.0; 1000], 44_100);
        assert!(matches!(
            FeatureExtractor::new().extract(&cd),
            Err(FeatureError::SampleRate {
                expected: 22_050,
                actual: 44_100
            })
        ));
    }

    #[test]
    fn db_conversion_clips_relative_to_peak() {
        let mut values = vec![1.0, 1e-3, 1e-12, 0.0];
        power_to_db(&mut values);
        assert!((values[0] - 0.0).abs() < 1e-12);
        assert!((values[1] + 30.0).abs() < 1e-9);
        assert_eq!(values[2], -80.0);
        assert_eq!(values[3], -80.0);
    }
}
