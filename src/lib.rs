//! # wavebars
//!
//! Decodes compressed audio (MP3 first and foremost) and reduces it to a
//! fixed number of RMS amplitude bars for waveform views.
//!
//! ```no_run
//! let bytes = std::fs::read("song.mp3")?;
//! let bars = wavebars::extract_waveform(&bytes, 200, 20)?;
//! assert_eq!(bars.len(), 200);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Decoder backends and PCM normalization
pub mod audio;
/// Configuration file loading
pub mod config;
/// Error taxonomy
pub mod error;
/// End-to-end extraction pipeline
pub mod extract;
/// RMS bar reduction
pub mod waveform;

pub use audio::{BackendKind, DecodeBackend, PcmSource, StreamFormat};
pub use error::WaveformError;
pub use extract::{extract_waveform, Extractor, DEFAULT_BARS, DEFAULT_DECIMATION};
pub use waveform::Waveform;

/// Result type for waveform operations
pub type Result<T> = std::result::Result<T, WaveformError>;
