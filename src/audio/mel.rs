//! Slaney-style mel filterbank and orthonormal DCT-II, matching the
//! conventions of the common Python audio analysis tooling so that feature
//! vectors line up with classifiers trained there.

const MEL_F_SP: f64 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f64 = 1000.0;
const MEL_MIN_LOG_MEL: f64 = MEL_MIN_LOG_HZ / MEL_F_SP;

fn mel_log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MEL_MIN_LOG_HZ {
        MEL_MIN_LOG_MEL + (hz / MEL_MIN_LOG_HZ).ln() / mel_log_step()
    } else {
        hz / MEL_F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MEL_MIN_LOG_MEL {
        MEL_MIN_LOG_HZ * (mel_log_step() * (mel - MEL_MIN_LOG_MEL)).exp()
    } else {
        mel * MEL_F_SP
    }
}

/// Triangular filter restricted to the FFT bins where it is non-zero.
struct Filter {
    first_bin: usize,
    weights: Vec<f64>,
}

pub struct MelFilterbank {
    filters: Vec<Filter>,
}

impl MelFilterbank {
    /// Filters spanning 0 Hz to Nyquist, each scaled to unit area in Hz.
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize) -> Self {
        let n_bins = n_fft / 2 + 1;
        let nyquist = sample_rate as f64 / 2.0;
        let fft_freqs: Vec<f64> = (0..n_bins)
            .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
            .collect();

        let max_mel = hz_to_mel(nyquist);
        let mel_points: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
            .collect();

        let filters = (0..n_mels)
            .map(|m| {
                let (left, center, right) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
                let norm = 2.0 / (right - left);
                let weights: Vec<(usize, f64)> = fft_freqs
                    .iter()
                    .enumerate()
                    .filter_map(|(k, &f)| {
                        let lower = (f - left) / (center - left);
                        let upper = (right - f) / (right - center);
                        let w = lower.min(upper).max(0.0) * norm;
                        (w > 0.0).then_some((k, w))
                    })
                    .collect();
                match weights.first() {
                    Some(&(first_bin, _)) => Filter {
                        first_bin,
                        weights: weights.into_iter().map(|(_, w)| w).collect(),
                    },
                    None => Filter {
                        first_bin: 0,
                        weights: vec![],
                    },
                }
            })
            .collect();

        MelFilterbank { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Projects one power spectrum frame onto the mel bands.
    pub fn apply(&self, power: &[f64], out: &mut [f64]) {
        for (filter, slot) in self.filters.iter().zip(out.iter_mut()) {
            *slot = filter
                .weights
                .iter()
                .zip(&power[filter.first_bin..])
                .map(|(w, p)| w * p)
                .sum();
        }
    }
}

/// First `n_coefficients` rows of the orthonormal DCT-II matrix of size `n`.
pub fn dct_ortho_matrix(n_coefficients: usize, n: usize) -> Vec<Vec<f64>> {
    let n_f = n as f64;
    (0..n_coefficients)
        .map(|k| {
            let scale = if k == 0 {
                (1.0 / n_f).sqrt()
            } else {
                (2.0 / n_f).sqrt()
            };
            (0..n)
                .map(|i| {
                    scale
                        * (std::f64::consts::PI * k as f64 * (2 * i + 1) as f64 / (2.0 * n_f)).cos()
                })
                .collect()
        })
        .collect()
}
