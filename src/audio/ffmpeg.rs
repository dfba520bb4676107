use serde::Deserialize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tempfile::NamedTempFile;

use super::{DecodeBackend, PcmSource, StreamFormat};
use crate::error::WaveformError;
use crate::Result;

const READ_CHUNK: usize = 16 * 1024;
/// Bytes of ffmpeg's stderr kept for error reports.
const STDERR_TAIL: usize = 8 * 1024;

/// Decodes through the `ffprobe`/`ffmpeg` binaries, which need a file path,
/// so the input bytes are spilled to a temp file for the lifetime of the source.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    extension: String,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    temp_dir: Option<PathBuf>,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            extension: "mp3".into(),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            temp_dir: None,
        }
    }
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(mut self, ext: &str) -> Self {
        self.extension = ext.trim_start_matches('.').to_ascii_lowercase();
        self
    }

    /// Use these executables instead of `ffmpeg`/`ffprobe` from `PATH`.
    pub fn with_programs(mut self, ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }

    /// Spill input bytes into `dir` instead of the system temp dir.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    fn spill(&self, bytes: &[u8]) -> Result<NamedTempFile> {
        let suffix = format!(".{}", self.extension);
        let mut builder = tempfile::Builder::new();
        builder.prefix("wavebars-").suffix(&suffix);

        let mut input = match self.temp_dir {
            Some(ref dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| WaveformError::DecoderInit(format!("failed to create temp file: {e}")))?;

        input
            .write_all(bytes)
            .and_then(|_| input.flush())
            .map_err(|e| WaveformError::DecoderInit(format!("failed to write temp file: {e}")))?;
        Ok(input)
    }
}

impl DecodeBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn PcmSource>> {
        let input = self.spill(&bytes)?;
        let format = query_streams(&self.ffprobe, input.path())?;

        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(input.path())
            .args(["-map", "0:a:0", "-f", "s16le", "-acodec", "pcm_s16le", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                WaveformError::DecoderInit(format!("failed to spawn ffmpeg (is it installed?): {e}"))
            })?;

        // stderr is drained concurrently so a chatty ffmpeg never blocks on a full pipe
        let pipes = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => thread::Builder::new()
                .name("wavebars-ffmpeg-stderr".into())
                .spawn(move || drain_tail(stderr, STDERR_TAIL))
                .map(|stderr_tail| (stdout, stderr_tail))
                .map_err(|e| format!("failed to spawn stderr reader: {e}")),
            _ => Err("ffmpeg pipes not available".to_string()),
        };
        let (stdout, stderr_tail) = match pipes {
            Ok(pipes) => pipes,
            Err(msg) => {
                reap(&mut child);
                return Err(WaveformError::DecoderInit(msg));
            }
        };

        log::info!(
            "ffmpeg decoding {} stream: {}Hz, {} channel(s)",
            format.codec,
            format.sample_rate,
            format.channels
        );

        Ok(Box::new(FfmpegSource {
            child,
            stdout,
            stderr_tail: Some(stderr_tail),
            format,
            samples: LeSamples::default(),
            chunk: vec![0; READ_CHUNK],
            _input: input,
        }))
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Read `reader` to the end, keeping only its last `limit` bytes.
fn drain_tail<R: Read>(mut reader: R, limit: usize) -> String {
    let mut tail = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > limit {
                    let excess = tail.len() - limit;
                    tail.drain(..excess);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

#[derive(Debug, Deserialize)]
struct StreamReport {
    #[serde(default)]
    streams: Vec<ReportedStream>,
}

#[derive(Debug, Deserialize)]
struct ReportedStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<usize>,
}

fn query_streams(program: &Path, path: &Path) -> Result<StreamFormat> {
    let output = Command::new(program)
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=codec_type,codec_name,sample_rate,channels",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            WaveformError::DecoderInit(format!("failed to run ffprobe (is it installed?): {e}"))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(WaveformError::NoAudioTrack(format!(
            "ffprobe could not read input: {}",
            stderr.trim()
        )));
    }

    parse_stream_report(&output.stdout)
}

/// Pick the first audio stream out of ffprobe's JSON report.
fn parse_stream_report(json: &[u8]) -> Result<StreamFormat> {
    let report: StreamReport = serde_json::from_slice(json)
        .map_err(|e| WaveformError::DecoderInit(format!("unreadable ffprobe output: {e}")))?;

    let stream = report
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or_else(|| WaveformError::NoAudioTrack("ffprobe found no audio streams".into()))?;

    let codec = stream.codec_name.unwrap_or_else(|| "unknown".into());
    let sample_rate = stream
        .sample_rate
        .as_deref()
        .and_then(|sr| sr.parse::<u32>().ok())
        .filter(|&sr| sr > 0)
        .ok_or_else(|| WaveformError::DecoderInit(format!("{codec} stream has no sample rate")))?;

    Ok(StreamFormat {
        codec,
        sample_rate,
        channels: stream.channels.unwrap_or(1).max(1),
    })
}

/// Little-endian i16 reassembly across reads that may split a sample.
#[derive(Debug, Default)]
struct LeSamples {
    carry: Option<u8>,
}

impl LeSamples {
    fn feed(&mut self, bytes: &[u8]) -> Vec<i16> {
        let mut samples = Vec::with_capacity((bytes.len() + 1) / 2);
        let mut rest = bytes;

        if let Some(low) = self.carry.take() {
            match rest.split_first() {
                Some((&high, tail)) => {
                    samples.push(i16::from_le_bytes([low, high]));
                    rest = tail;
                }
                None => {
                    self.carry = Some(low);
                    return samples;
                }
            }
        }

        let mut pairs = rest.chunks_exact(2);
        samples.extend(pairs.by_ref().map(|c| i16::from_le_bytes([c[0], c[1]])));
        self.carry = pairs.remainder().first().copied();
        samples
    }
}

struct FfmpegSource {
    child: Child,
    stdout: ChildStdout,
    stderr_tail: Option<JoinHandle<String>>,
    format: StreamFormat,
    samples: LeSamples,
    chunk: Vec<u8>,
    // Dropped after the child is reaped in Drop, which deletes the file
    _input: NamedTempFile,
}

impl FfmpegSource {
    /// Collect the stderr tail once the child's pipes have closed.
    fn stderr(&mut self) -> String {
        self.stderr_tail
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }

    fn finish(&mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .map_err(|e| WaveformError::Decode(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr = self.stderr();

        if !status.success() {
            return Err(WaveformError::Decode(format!(
                "ffmpeg exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        if self.samples.carry.is_some() {
            log::warn!("ffmpeg output ended on half a sample");
        }

        Ok(())
    }
}

impl PcmSource for FfmpegSource {
    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn next_buffer(&mut self) -> Result<Option<Vec<i16>>> {
        let read = loop {
            match self.stdout.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(WaveformError::Decode(format!("failed to read ffmpeg output: {e}")))
                }
            }
        };

        if read == 0 {
            self.finish()?;
            return Ok(None);
        }

        Ok(Some(self.samples.feed(&self.chunk[..read])))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        // No-op once finish() has reaped the child
        reap(&mut self.child);
        let _ = self.stderr();
    }
}
