//! Remote speech synthesis (ElevenLabs wire shape).

use serde::Serialize;
use zoey_core::settings::Settings;

use crate::SpeechError;

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[derive(Serialize)]
struct SynthRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

pub(crate) struct RemoteSynth {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    voice_id: String,
}

impl RemoteSynth {
    pub(crate) fn new(settings: &Settings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.eleven_labs_url.clone(),
            api_key: settings.eleven_labs_api_key.clone(),
            voice_id: settings.eleven_labs_voice_id.clone(),
        }
    }

    /// Whether a remote credential is configured. Without one, speech goes
    /// straight to the local fallback and nothing is enqueued.
    pub(crate) fn configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Synthesize `text`, returning the MP3 payload.
    pub(crate) async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let url = format!(
            "{}/v1/text-to-speech/{}/stream",
            self.base_url.trim_end_matches('/'),
            self.voice_id,
        );
        let request = SynthRequest {
            text,
            model_id: "eleven_multilingual_v2",
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
                style: 0.5,
                use_speaker_boost: true,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Synthesis(format!(
                "elevenlabs {status}: {body}"
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;
        Ok(audio.to_vec())
    }
}
