//! Sequential audio playback.
//!
//! A single worker thread owns the output device; everything else touches
//! only the shared pending list, the active sink slot, and the speaking
//! flag. At most one sink exists at any time, so segments can never
//! overlap, and `Sink::stop` halts the device callback immediately.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tracing::{debug, error};

/// Synthesized audio for one utterance. Owned by the queue from enqueue
/// until playback ends; the bytes are dropped whether playback succeeded
/// or failed.
pub struct AudioSegment {
    bytes: Vec<u8>,
}

impl AudioSegment {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

struct Shared {
    pending: Mutex<VecDeque<AudioSegment>>,
    active: Mutex<Option<Arc<rodio::Sink>>>,
    speaking: AtomicBool,
    /// Bumped by `stop`; a worker that popped a segment under an older
    /// epoch discards it instead of playing.
    epoch: AtomicU64,
}

pub(crate) struct PlaybackQueue {
    shared: Arc<Shared>,
    wake: mpsc::Sender<()>,
}

impl PlaybackQueue {
    pub(crate) fn new() -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(VecDeque::new()),
            active: Mutex::new(None),
            speaking: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        });
        let (wake, wake_rx) = mpsc::channel::<()>();
        let worker = Arc::clone(&shared);
        // Worker lives for the queue's lifetime; dropping the queue closes
        // the channel and the thread exits.
        let _ = thread::Builder::new()
            .name("speech-playback".into())
            .spawn(move || worker_loop(&worker, &wake_rx));
        Self { shared, wake }
    }

    /// Append a segment. If nothing is playing, the worker picks it up
    /// immediately; otherwise it waits its turn.
    pub(crate) fn enqueue(&self, segment: AudioSegment) {
        self.shared.speaking.store(true, Ordering::SeqCst);
        self.shared.pending.lock().unwrap().push_back(segment);
        let _ = self.wake.send(());
    }

    /// Hard stop: drop every pending segment and halt the active sink.
    /// No-op when already idle.
    pub(crate) fn stop(&self) {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        self.shared.pending.lock().unwrap().clear();
        if let Some(sink) = self.shared.active.lock().unwrap().take() {
            sink.stop();
        }
        self.shared.speaking.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.shared.speaking.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.shared.pending.lock().unwrap().len()
    }
}

fn worker_loop(shared: &Arc<Shared>, wake: &mpsc::Receiver<()>) {
    // The device is opened lazily so a headless process can construct and
    // stop an engine without audio hardware.
    let mut output: Option<rodio::OutputStream> = None;

    while wake.recv().is_ok() {
        loop {
            let epoch = shared.epoch.load(Ordering::SeqCst);
            let Some(segment) = shared.pending.lock().unwrap().pop_front() else {
                break;
            };
            if output.is_none() {
                match rodio::OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => output = Some(stream),
                    Err(e) => {
                        error!(target: "speech::queue", error = %e, "no audio output device, dropping queued speech");
                        shared.pending.lock().unwrap().clear();
                        break;
                    }
                }
            }
            let Some(stream) = output.as_ref() else { break };

            let sink = Arc::new(rodio::Sink::connect_new(stream.mixer()));
            *shared.active.lock().unwrap() = Some(Arc::clone(&sink));

            if shared.epoch.load(Ordering::SeqCst) != epoch {
                // Stopped between pop and here; the segment is already
                // released by dropping it.
                sink.stop();
            } else {
                shared.speaking.store(true, Ordering::SeqCst);
                match rodio::Decoder::new(Cursor::new(segment.bytes)) {
                    Ok(source) => {
                        sink.append(source);
                        sink.sleep_until_end();
                    }
                    Err(e) => {
                        // A broken segment must not block the queue; treat
                        // it exactly like end-of-media.
                        debug!(target: "speech::queue", error = %e, "undecodable segment, skipping");
                    }
                }
            }
            shared.active.lock().unwrap().take();
        }
        if shared.pending.lock().unwrap().is_empty() {
            shared.speaking.store(false, Ordering::SeqCst);
        }
    }
}
