use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{DecodeBackend, Decimator, StreamFormat};
use crate::error::WaveformError;
use crate::Result;

/// Buffers in flight between the decoder thread and the caller.
const CHANNEL_DEPTH: usize = 32;

/// Fully decoded and decimated stream.
#[derive(Debug)]
pub struct Decoded {
    pub format: StreamFormat,
    pub samples: Vec<f32>,
    pub decoded_samples: u64,
}

enum Message {
    Format(StreamFormat),
    Buffer(Vec<i16>),
    Finished,
    Failed(WaveformError),
}

enum Interrupt {
    Stalled,
    Failed(WaveformError),
}

impl From<WaveformError> for Interrupt {
    fn from(e: WaveformError) -> Self {
        Interrupt::Failed(e)
    }
}

/// Decode `bytes` on a dedicated thread, keeping every `decimation`-th sample.
///
/// Every receive waits at most `stall_timeout`. On a stall the worker is
/// detached; it stops at its next send and releases its source then.
pub fn decode(
    backend: Arc<dyn DecodeBackend>,
    bytes: Arc<[u8]>,
    decimation: usize,
    stall_timeout: Duration,
) -> Result<Decoded> {
    let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
    let backend_name = backend.name();

    let handle = thread::Builder::new()
        .name(format!("wavebars-{backend_name}"))
        .spawn(move || run(backend.as_ref(), bytes, &tx))
        .map_err(|e| WaveformError::Decode(format!("failed to spawn decoder thread: {e}")))?;

    let outcome = receive(&rx, decimation, stall_timeout);
    drop(rx);

    match outcome {
        Ok(decoded) => {
            join(handle);
            Ok(decoded)
        }
        Err(Interrupt::Failed(e)) => {
            join(handle);
            Err(e)
        }
        Err(Interrupt::Stalled) => {
            log::warn!(
                "{} decoder produced nothing for {:?}, detaching worker",
                backend_name,
                stall_timeout
            );
            Err(WaveformError::Decode(format!(
                "decoder stalled: no output for {stall_timeout:?}"
            )))
        }
    }
}

fn join(handle: thread::JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("Decoder thread panicked");
    }
}

fn run(backend: &dyn DecodeBackend, bytes: Arc<[u8]>, tx: &SyncSender<Message>) {
    let mut source = match backend.open(bytes) {
        Ok(source) => source,
        Err(e) => {
            let _ = tx.send(Message::Failed(e));
            return;
        }
    };

    if tx.send(Message::Format(source.format().clone())).is_err() {
        return;
    }

    loop {
        let message = match source.next_buffer() {
            Ok(Some(buffer)) => Message::Buffer(buffer),
            Ok(None) => Message::Finished,
            Err(e) => Message::Failed(e),
        };
        let terminal = !matches!(message, Message::Buffer(_));

        if tx.send(message).is_err() || terminal {
            return;
        }
    }
}

fn receive(
    rx: &Receiver<Message>,
    decimation: usize,
    stall_timeout: Duration,
) -> std::result::Result<Decoded, Interrupt> {
    let format = match next(rx, stall_timeout)? {
        Message::Format(format) => format,
        Message::Failed(e) => return Err(e.into()),
        Message::Buffer(_) | Message::Finished => {
            return Err(WaveformError::Decode("decoder sent data before its stream format".into()).into())
        }
    };

    // Fold buffers into the decimator until the worker reports the end of the stream
    let decimator = std::iter::from_fn(|| match next(rx, stall_timeout) {
        Ok(Message::Finished) => None,
        received => Some(received),
    })
    .try_fold(Decimator::new(decimation), |mut acc, received| match received? {
        Message::Buffer(buffer) => {
            acc.push(&buffer);
            Ok(acc)
        }
        Message::Failed(e) => Err(Interrupt::Failed(e)),
        Message::Format(_) => {
            Err(WaveformError::Decode("decoder reported its format twice".into()).into())
        }
        Message::Finished => Ok(acc),
    })?;

    let decoded_samples = decimator.seen();
    Ok(Decoded {
        format,
        samples: decimator.finish(),
        decoded_samples,
    })
}

fn next(rx: &Receiver<Message>, stall_timeout: Duration) -> std::result::Result<Message, Interrupt> {
    rx.recv_timeout(stall_timeout).map_err(|e| match e {
        RecvTimeoutError::Timeout => Interrupt::Stalled,
        RecvTimeoutError::Disconnected => Interrupt::Failed(WaveformError::Decode(
            "decoder thread exited before end of stream".into(),
        )),
    })
}
