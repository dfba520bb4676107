pub mod decode;
pub mod ffmpeg;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::Result;

pub use decode::SymphoniaBackend;
pub use ffmpeg::FfmpegBackend;

/// Full scale of a signed 16-bit sample.
const I16_SCALE: f32 = 32768.0;

/// Format of the audio stream a source is decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFormat {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: usize,
}

/// Something that turns compressed bytes into a stream of 16-bit PCM buffers.
pub trait DecodeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Select the first audio stream in `bytes` and start a decoder for it.
    fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn PcmSource>>;
}

/// A running decoder. Dropping it releases every resource it holds.
pub trait PcmSource {
    fn format(&self) -> &StreamFormat;

    /// Next buffer of interleaved samples, or `None` once the stream is exhausted.
    fn next_buffer(&mut self) -> Result<Option<Vec<i16>>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process decoding with symphonia
    #[default]
    Symphonia,
    /// External ffmpeg/ffprobe binaries
    Ffmpeg,
}

impl BackendKind {
    /// Build the backend, passing along a file extension hint when known.
    pub fn build(self, hint: Option<&str>) -> Arc<dyn DecodeBackend> {
        let backend: Arc<dyn DecodeBackend> = match (self, hint) {
            (BackendKind::Symphonia, Some(ext)) => Arc::new(SymphoniaBackend::new().with_extension(ext)),
            (BackendKind::Symphonia, None) => Arc::new(SymphoniaBackend::new()),
            (BackendKind::Ffmpeg, Some(ext)) => Arc::new(FfmpegBackend::new().with_extension(ext)),
            (BackendKind::Ffmpeg, None) => Arc::new(FfmpegBackend::new()),
        };
        backend
    }
}

pub fn normalize_sample(sample: i16) -> f32 {
    sample as f32 / I16_SCALE
}

/// Keeps every `stride`-th decoded sample, counting positions across all
/// buffers of a stream.
#[derive(Debug)]
pub struct Decimator {
    stride: usize,
    seen: u64,
    retained: Vec<f32>,
}

impl Decimator {
    pub fn new(stride: usize) -> Self {
        Self {
            stride: stride.max(1),
            seen: 0,
            retained: Vec::new(),
        }
    }

    pub fn push(&mut self, buffer: &[i16]) {
        let stride = self.stride as u64;
        // Index of the first sample in this buffer whose global position is a multiple of stride
        let offset = ((stride - self.seen % stride) % stride) as usize;
        self.retained.extend(
            buffer
                .iter()
                .skip(offset)
                .step_by(self.stride)
                .map(|&s| normalize_sample(s)),
        );
        self.seen += buffer.len() as u64;
    }

    /// Total number of decoded samples pushed so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn finish(self) -> Vec<f32> {
        self.retained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sample_range() {
        assert_eq!(normalize_sample(0), 0.0);
        assert_eq!(normalize_sample(i16::MIN), -1.0);
        assert_eq!(normalize_sample(16384), 0.5);
        assert!(normalize_sample(i16::MAX) < 1.0);
    }

    #[test]
    fn test_decimation_counter_spans_buffers() {
        let mut decimator = Decimator::new(2);
        for buffer in [&[0i16, 1, 2][..], &[3, 4][..], &[5, 6, 7, 8][..]] {
            decimator.push(buffer);
        }
        assert_eq!(decimator.seen(), 9);
        let samples = decimator.finish();

        let expected: Vec<f32> = [0i16, 2, 4, 6, 8].iter().map(|&s| normalize_sample(s)).collect();
        assert_eq!(samples, expected);
    }

    #[test]
    fn test_retained_count_is_ceil_of_total() {
        for stride in 1..=7usize {
            let mut decimator = Decimator::new(stride);
            // Uneven buffer sizes to exercise the carried position
            for len in [5usize, 1, 13, 0, 8] {
                decimator.push(&vec![100; len]);
            }
            let total = decimator.seen();
            let retained = decimator.finish().len() as u64;
            assert_eq!(retained, total.div_ceil(stride as u64), "stride {stride}");
        }
    }

    #[test]
    fn test_stride_one_keeps_everything_in_order() {
        let mut decimator = Decimator::new(1);
        decimator.push(&[-32768, 0]);
        decimator.push(&[16384]);
        assert_eq!(decimator.finish(), vec![-1.0, 0.0, 0.5]);
    }

    #[test]
    fn test_nothing_pushed() {
        let decimator = Decimator::new(20);
        assert_eq!(decimator.seen(), 0);
        assert!(decimator.finish().is_empty());
    }

    #[test]
    fn test_backend_kind_build() {
        assert_eq!(BackendKind::Symphonia.build(None).name(), "symphonia");
        assert_eq!(BackendKind::Ffmpeg.build(Some("mp3")).name(), "ffmpeg");
    }
}
