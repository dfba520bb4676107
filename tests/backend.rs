use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wavebars::{DecodeBackend, Extractor, PcmSource, StreamFormat, WaveformError};

#[derive(Clone)]
enum Step {
    Buffer(Vec<i16>),
    Fail(WaveformError),
    Hang(Duration),
}

/// Replays a fixed script and records when its source is released.
struct ScriptedBackend {
    open_error: Option<WaveformError>,
    steps: Vec<Step>,
    released: Arc<AtomicBool>,
    opened: AtomicUsize,
    received: Mutex<Option<Arc<[u8]>>>,
}

impl ScriptedBackend {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            open_error: None,
            steps,
            released: Arc::new(AtomicBool::new(false)),
            opened: AtomicUsize::new(0),
            received: Mutex::new(None),
        }
    }

    fn failing_open(error: WaveformError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::new(Vec::new())
        }
    }
}

impl DecodeBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&self, bytes: Arc<[u8]>) -> wavebars::Result<Box<dyn PcmSource>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.received.lock().unwrap() = Some(bytes);
        if let Some(ref e) = self.open_error {
            return Err(e.clone());
        }
        Ok(Box::new(ScriptedSource {
            format: StreamFormat {
                codec: "scripted".into(),
                sample_rate: 8000,
                channels: 1,
            },
            steps: self.steps.clone().into_iter(),
            released: Arc::clone(&self.released),
        }))
    }
}

struct ScriptedSource {
    format: StreamFormat,
    steps: std::vec::IntoIter<Step>,
    released: Arc<AtomicBool>,
}

impl PcmSource for ScriptedSource {
    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn next_buffer(&mut self) -> wavebars::Result<Option<Vec<i16>>> {
        match self.steps.next() {
            Some(Step::Buffer(buffer)) => Ok(Some(buffer)),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang(duration)) => {
                std::thread::sleep(duration);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_buffers_are_decimated_across_boundaries() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Step::Buffer(vec![16384, 0, 0]),
        Step::Buffer(vec![16384, 0]),
        Step::Buffer(vec![0, 16384, 0, 0]),
    ]));

    let waveform = Extractor::new(backend.clone())
        .bars(3)
        .decimation(3)
        .extract(b"scripted")
        .unwrap();

    // Positions 0, 3, 6 of the combined stream
    assert_eq!(waveform.decoded_samples, 9);
    assert_eq!(waveform.retained_samples, 3);
    assert_eq!(waveform.bars, vec![0.5, 0.5, 0.5]);
    assert!(backend.released.load(Ordering::SeqCst));
}

#[test]
fn test_mid_stream_failure_releases_source() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Step::Buffer(vec![1000; 64]),
        Step::Fail(WaveformError::Decode("bitstream corrupted".into())),
        Step::Buffer(vec![1000; 64]),
    ]));

    let err = Extractor::new(backend.clone()).extract(b"scripted").unwrap_err();

    assert_eq!(err, WaveformError::Decode("bitstream corrupted".into()));
    assert!(backend.released.load(Ordering::SeqCst));
}

#[test]
fn test_open_failure_is_reported_once() {
    let backend = Arc::new(ScriptedBackend::failing_open(WaveformError::DecoderInit(
        "unsupported codec".into(),
    )));

    let err = Extractor::new(backend.clone()).extract(b"scripted").unwrap_err();

    assert!(matches!(err, WaveformError::DecoderInit(_)));
    assert_eq!(backend.opened.load(Ordering::SeqCst), 1);
}

#[test]
fn test_no_buffers_is_empty_result() {
    let backend = Arc::new(ScriptedBackend::new(Vec::new()));

    let err = Extractor::new(backend.clone()).extract(b"scripted").unwrap_err();

    assert_eq!(err, WaveformError::EmptyResult);
    assert!(backend.released.load(Ordering::SeqCst));
}

#[test]
fn test_stalled_decoder_times_out() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Step::Buffer(vec![1000; 16]),
        Step::Hang(Duration::from_millis(500)),
    ]));

    let err = Extractor::new(backend)
        .stall_timeout(Duration::from_millis(50))
        .extract(b"scripted")
        .unwrap_err();

    match err {
        WaveformError::Decode(msg) => assert!(msg.contains("stalled"), "got {msg}"),
        other => panic!("expected a stall, got {other:?}"),
    }
}

#[test]
fn test_empty_bytes_never_reach_backend() {
    let backend = Arc::new(ScriptedBackend::new(vec![Step::Buffer(vec![1; 8])]));

    let err = Extractor::new(backend.clone()).extract(&[]).unwrap_err();

    assert!(matches!(err, WaveformError::InvalidInput(_)));
    assert_eq!(backend.opened.load(Ordering::SeqCst), 0);
}

#[test]
fn test_backend_owns_the_input_bytes() {
    let backend = Arc::new(ScriptedBackend::new(vec![Step::Buffer(vec![1; 8])]));
    let input = b"\xff\xfb\x90\x64 frame data".to_vec();

    Extractor::new(backend.clone()).extract(&input).unwrap();
    drop(input);

    // Still readable after the caller's buffer is gone
    let received = backend.received.lock().unwrap().take().unwrap();
    assert_eq!(&received[..], b"\xff\xfb\x90\x64 frame data");
    assert_eq!(Arc::strong_count(&received), 1);
}
