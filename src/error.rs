use thiserror::Error;

/// Failures surfaced by waveform extraction.
///
/// Every backend failure is mapped onto one of these variants before it
/// leaves the decoder adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaveformError {
    /// Empty input bytes or an out-of-range parameter.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The container holds no decodable audio stream.
    #[error("No audio track found: {0}")]
    NoAudioTrack(String),

    /// The stream format is unsupported or the decoder could not start.
    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    /// The decoder failed mid-stream or the input was not fully consumed.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Decoding finished without retaining a single sample.
    #[error("Decoding produced no audio samples")]
    EmptyResult,
}
