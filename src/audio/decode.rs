use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{DecodeBackend, PcmSource, StreamFormat};
use crate::error::WaveformError;
use crate::Result;

/// In-memory decoding through symphonia's probe and codec registries.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaBackend {
    extension: Option<String>,
}

impl SymphoniaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extension hint for the format prober, e.g. `"mp3"`.
    pub fn with_extension(mut self, ext: &str) -> Self {
        self.extension = Some(ext.trim_start_matches('.').to_ascii_lowercase());
        self
    }
}

impl DecodeBackend for SymphoniaBackend {
    fn name(&self) -> &'static str {
        "symphonia"
    }

    fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn PcmSource>> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ref ext) = self.extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| WaveformError::NoAudioTrack(format!("failed to probe audio format: {e}")))?;

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| WaveformError::NoAudioTrack("container has no audio tracks".into()))?;

        let track_id = track.id;
        let codec = symphonia::default::get_codecs()
            .get_codec(track.codec_params.codec)
            .map_or_else(|| "unknown".to_string(), |d| d.short_name.to_string());
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| WaveformError::DecoderInit(format!("{codec} track has no sample rate")))?;
        let channels = track.codec_params.channels.map_or(1, |c| c.count());

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| WaveformError::DecoderInit(format!("failed to create {codec} decoder: {e}")))?;

        log::info!(
            "Opened {} stream: {}Hz, {} channel(s)",
            codec,
            sample_rate,
            channels
        );

        Ok(Box::new(SymphoniaSource {
            reader,
            decoder,
            track_id,
            format: StreamFormat {
                codec,
                sample_rate,
                channels,
            },
            skipped_packets: 0,
        }))
    }
}

struct SymphoniaSource {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: StreamFormat,
    skipped_packets: usize,
}

impl PcmSource for SymphoniaSource {
    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn next_buffer(&mut self) -> Result<Option<Vec<i16>>> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    if self.skipped_packets > 0 {
                        log::warn!("Skipped {} corrupt packet(s)", self.skipped_packets);
                    }
                    return Ok(None);
                }
                Err(e) => {
                    return Err(WaveformError::Decode(format!("failed to read packet: {e}")));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt frame, the stream itself is still usable
                Err(SymphoniaError::DecodeError(reason)) => {
                    log::debug!("Skipping undecodable packet: {}", reason);
                    self.skipped_packets += 1;
                    continue;
                }
                Err(e) => return Err(WaveformError::Decode(e.to_string())),
            };

            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let mut sample_buf = SampleBuffer::<i16>::new(decoded.frames() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            return Ok(Some(sample_buf.samples().to_vec()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_have_no_audio_track() {
        let backend = SymphoniaBackend::new().with_extension("mp3");
        let err = backend.open(Arc::from(&b"this is plainly not an audio file"[..])).err().unwrap();
        assert!(matches!(err, WaveformError::NoAudioTrack(_)), "got {err:?}");
    }

    #[test]
    fn test_extension_hint_is_normalized() {
        let backend = SymphoniaBackend::new().with_extension(".MP3");
        assert_eq!(backend.extension.as_deref(), Some("mp3"));
    }
}
