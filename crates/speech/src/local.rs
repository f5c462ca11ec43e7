//! Local subprocess synthesis fallback.
//!
//! Used when no remote credential is configured or a remote synthesis call
//! fails. Degradation chain: `say` (macOS), `espeak-ng`, `espeak`; with
//! none of them installed the utterance is logged and dropped, never an
//! error.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

pub(crate) struct LocalVoice {
    binary: Option<PathBuf>,
    child: Arc<Mutex<Option<Child>>>,
    speaking: Arc<AtomicBool>,
}

impl LocalVoice {
    pub(crate) fn new() -> Self {
        let binary = ["say", "espeak-ng", "espeak"]
            .iter()
            .find_map(|bin| which::which(bin).ok());
        match &binary {
            Some(bin) => {
                debug!(target: "speech::local", bin = %bin.display(), "local voice binary detected");
            }
            None => {
                warn!(target: "speech::local", "no local voice binary found, fallback utterances will be logged only");
            }
        }
        Self {
            binary,
            child: Arc::new(Mutex::new(None)),
            speaking: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Vocalize `text`, fire-and-forget. A still-running previous utterance
    /// is cancelled first so local speech never overlaps itself.
    pub(crate) fn speak(&self, text: &str) {
        let Some(bin) = &self.binary else {
            info!(target: "speech::local", text, "no voice binary, dropping utterance");
            return;
        };
        self.stop();

        match Command::new(bin)
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                // Publish the child and the flag under one lock so a
                // concurrent `stop` sees both or neither.
                {
                    let mut guard = self.child.lock().unwrap();
                    *guard = Some(child);
                    self.speaking.store(true, Ordering::SeqCst);
                }
                self.reap();
            }
            Err(e) => {
                warn!(target: "speech::local", error = %e, "failed to start voice binary");
            }
        }
    }

    /// Kill the in-flight utterance, if any. Idempotent.
    pub(crate) fn stop(&self) {
        let mut guard = self.child.lock().unwrap();
        if let Some(mut child) = guard.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.speaking.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Background thread that clears the speaking flag once the current
    /// child exits. A `stop` that already took the child ends the loop too.
    fn reap(&self) {
        let child = Arc::clone(&self.child);
        let speaking = Arc::clone(&self.speaking);
        thread::spawn(move || loop {
            {
                let mut guard = child.lock().unwrap();
                match guard.as_mut() {
                    None => break,
                    Some(c) => match c.try_wait() {
                        Ok(Some(_)) => {
                            guard.take();
                            speaking.store(false, Ordering::SeqCst);
                            break;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            debug!(target: "speech::local", error = %e, "voice child wait failed");
                            guard.take();
                            speaking.store(false, Ordering::SeqCst);
                            break;
                        }
                    },
                }
            }
            thread::sleep(Duration::from_millis(100));
        });
    }
}
