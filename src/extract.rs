use std::sync::Arc;
use std::time::Duration;

use crate::audio::{worker, DecodeBackend, SymphoniaBackend};
use crate::error::WaveformError;
use crate::waveform::{self, Waveform};
use crate::Result;

pub const DEFAULT_BARS: u32 = 200;
pub const DEFAULT_DECIMATION: u32 = 20;
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Decode `audio_bytes` with the default backend and reduce them to `bars`
/// RMS magnitudes, keeping every `decimation`-th decoded sample.
pub fn extract_waveform(audio_bytes: &[u8], bars: u32, decimation: u32) -> Result<Vec<f32>> {
    Extractor::default()
        .bars(bars as usize)
        .decimation(decimation as usize)
        .extract(audio_bytes)
        .map(|w| w.bars)
}

/// Configurable decode-and-reduce pipeline.
pub struct Extractor {
    backend: Arc<dyn DecodeBackend>,
    bars: usize,
    decimation: usize,
    stall_timeout: Duration,
    normalize: bool,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(Arc::new(SymphoniaBackend::new()))
    }
}

impl Extractor {
    pub fn new(backend: Arc<dyn DecodeBackend>) -> Self {
        Self {
            backend,
            bars: DEFAULT_BARS as usize,
            decimation: DEFAULT_DECIMATION as usize,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            normalize: false,
        }
    }

    pub fn bars(mut self, bars: usize) -> Self {
        self.bars = bars;
        self
    }

    pub fn decimation(mut self, decimation: usize) -> Self {
        self.decimation = decimation;
        self
    }

    /// Longest wait for the decoder to produce its next buffer.
    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Rescale bars so the loudest reaches 1.0.
    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn extract(&self, audio_bytes: &[u8]) -> Result<Waveform> {
        if audio_bytes.is_empty() {
            return Err(WaveformError::InvalidInput("audio data is empty".into()));
        }
        if self.bars == 0 {
            return Err(WaveformError::InvalidInput("bar count must be at least 1".into()));
        }
        if self.decimation == 0 {
            return Err(WaveformError::InvalidInput(
                "decimation factor must be at least 1".into(),
            ));
        }

        log::debug!(
            "Extracting {} bars from {} bytes via {} (decimation {})",
            self.bars,
            audio_bytes.len(),
            self.backend.name(),
            self.decimation
        );

        let decoded = worker::decode(
            Arc::clone(&self.backend),
            Arc::from(audio_bytes),
            self.decimation,
            self.stall_timeout,
        )?;

        if decoded.samples.is_empty() {
            return Err(WaveformError::EmptyResult);
        }

        log::info!(
            "Decoded {} samples, kept {} ({}Hz, {} channel(s))",
            decoded.decoded_samples,
            decoded.samples.len(),
            decoded.format.sample_rate,
            decoded.format.channels
        );

        let mut bars = waveform::reduce(&decoded.samples, self.bars);
        if self.normalize {
            waveform::normalize_peak(&mut bars);
        }

        Ok(Waveform {
            bars,
            format: decoded.format,
            decoded_samples: decoded.decoded_samples,
            retained_samples: decoded.samples.len(),
        })
    }
}
