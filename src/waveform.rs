use rayon::prelude::*;
use serde::Serialize;

use crate::audio::StreamFormat;

/// Extracted waveform plus what was decoded to produce it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Waveform {
    /// RMS magnitude per bar, each in 0.0-1.0, always `bars` long
    pub bars: Vec<f32>,
    pub format: StreamFormat,
    /// Samples produced by the decoder before decimation
    pub decoded_samples: u64,
    pub retained_samples: usize,
}

/// Reduce `samples` to exactly `bars` RMS magnitudes.
///
/// Every bar covers `samples.len() / bars` consecutive samples. Samples past
/// `bars * samples_per_bar` are dropped rather than folded into the last bar,
/// and a bar whose window is empty (fewer samples than bars) is `0.0`.
/// Results are clamped to 0.0-1.0.
pub fn reduce(samples: &[f32], bars: usize) -> Vec<f32> {
    let samples_per_bar = samples.len() / bars.max(1);

    (0..bars)
        .into_par_iter()
        .map(|i| {
            let (start, end) = bar_window(i, samples_per_bar, samples.len());
            rms(&samples[start..end])
        })
        .collect()
}

/// Half-open sample range of bar `index`.
pub fn bar_window(index: usize, samples_per_bar: usize, total: usize) -> (usize, usize) {
    let start = (index * samples_per_bar).min(total);
    let end = ((index + 1) * samples_per_bar).min(total);
    (start, end)
}

/// Root-mean-square of a window, `0.0` for an empty one.
pub fn rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: f64 = window.iter().map(|&s| (s as f64) * (s as f64)).sum();
    ((sum / window.len() as f64).sqrt() as f32).clamp(0.0, 1.0)
}

/// Scale bars so the loudest one is 1.0. All-zero input is left alone.
pub fn normalize_peak(bars: &mut [f32]) {
    let peak = bars.iter().copied().fold(0.0f32, f32::max);
    if peak <= f32::EPSILON {
        return;
    }
    for bar in bars.iter_mut() {
        *bar = (*bar / peak).min(1.0);
    }
}
