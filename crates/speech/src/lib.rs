//! Speech output: remote synthesis with a sequential playback queue, and a
//! local subprocess voice as the degradation path.

mod local;
mod queue;
mod synth;

use thiserror::Error;
use tracing::warn;
use zoey_core::settings::Settings;

pub use queue::AudioSegment;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("synthesis failed: {0}")]
    Synthesis(String),
    #[error("audio: {0}")]
    Audio(String),
}

/// One speech engine per session. `speak` never surfaces synthesis errors;
/// a failed remote call degrades to the local voice for that utterance.
pub struct SpeechEngine {
    enabled: bool,
    synth: synth::RemoteSynth,
    queue: queue::PlaybackQueue,
    local: local::LocalVoice,
}

impl SpeechEngine {
    pub fn new(settings: &Settings) -> Self {
        Self {
            enabled: settings.voice_output_enabled,
            synth: synth::RemoteSynth::new(settings),
            queue: queue::PlaybackQueue::new(),
            local: local::LocalVoice::new(),
        }
    }

    /// Speak `text`. With a remote credential configured the synthesized
    /// segment joins the playback queue (playing immediately if the queue
    /// was idle); without one, or when synthesis fails, the local voice
    /// handles the utterance directly and nothing is enqueued. A no-op when
    /// voice output is disabled in the settings the engine was built with.
    pub async fn speak(&self, text: &str) {
        if !self.enabled || text.trim().is_empty() {
            return;
        }
        if !self.synth.configured() {
            self.local.speak(text);
            return;
        }
        match self.synth.synthesize(text).await {
            Ok(audio) => self.queue.enqueue(AudioSegment::new(audio)),
            Err(e) => {
                warn!(target: "speech::synth", error = %e, "remote synthesis failed, using local voice");
                self.local.speak(text);
            }
        }
    }

    /// Hard stop: clear pending segments, halt the active one, and kill any
    /// in-flight local utterance. No-op when idle.
    pub fn stop(&self) {
        self.queue.stop();
        self.local.stop();
    }

    /// True while a segment is playing or the local voice is vocalizing.
    pub fn is_speaking(&self) -> bool {
        self.queue.is_playing() || self.local.is_speaking()
    }
}
