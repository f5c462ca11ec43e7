//! Priority-ordered provider fallback.
//!
//! Providers are attempted strictly in the configured order, one at a time;
//! the first attempt that streams to a clean end wins. Running attempts in
//! parallel would both break "first success in priority order" and burn
//! quota on providers that should never have been asked.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use zoey_core::llm::{ChatError, Message, StreamEvent};
use zoey_core::settings::{ProviderId, Settings};

use crate::{gemini, groq, ollama};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    #[error("all providers failed or were not configured")]
    AllProvidersFailed,
}

pub struct FallbackEngine {
    http: reqwest::Client,
    active_provider: Option<ProviderId>,
    last_error: Option<String>,
}

impl FallbackEngine {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            active_provider: None,
            last_error: None,
        })
    }

    /// Provider that completed the most recent call, if any.
    pub fn active_provider(&self) -> Option<ProviderId> {
        self.active_provider
    }

    /// Aggregate error from the most recent call. Cleared when a new call
    /// starts.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Stream one assistant turn for `history` into `events`.
    ///
    /// Walks `settings.provider_priority` in order, skipping unconfigured
    /// providers without a network call; each decoded fragment is forwarded
    /// as `StreamEvent::Token` in arrival order. Exactly one
    /// `StreamEvent::Complete` is sent per call, whether a provider
    /// succeeded or every one failed, so a caller keyed on the terminal
    /// event can never hang.
    ///
    /// The caller is responsible for not starting a second call before the
    /// previous call's `Complete`.
    pub async fn send_message(
        &mut self,
        settings: &Settings,
        history: &[Message],
        events: &UnboundedSender<StreamEvent>,
    ) -> Result<ProviderId, EngineError> {
        self.active_provider = None;
        self.last_error = None;

        // Snapshot the order; settings changes made mid-call belong to the
        // next call.
        let priority = settings.provider_priority.clone();
        for provider in priority {
            let eligible = match provider {
                ProviderId::Ollama => ollama::eligible(settings),
                ProviderId::Gemini => gemini::eligible(settings),
                ProviderId::Groq => groq::eligible(settings),
            };
            if !eligible {
                debug!(target: "providers::engine", provider = %provider, "skipping unconfigured provider");
                continue;
            }
            match self.run_attempt(provider, settings, history, events).await {
                Ok(()) => {
                    info!(target: "providers::engine", provider = %provider, "stream complete");
                    self.active_provider = Some(provider);
                    let _ = events.send(StreamEvent::Complete);
                    return Ok(provider);
                }
                Err(e) => {
                    warn!(target: "providers::engine", provider = %provider, error = %e, "provider attempt failed, trying next");
                }
            }
        }

        let err = EngineError::AllProvidersFailed;
        self.last_error = Some(err.to_string());
        let _ = events.send(StreamEvent::Complete);
        Err(err)
    }

    async fn run_attempt(
        &self,
        provider: ProviderId,
        settings: &Settings,
        history: &[Message],
        events: &UnboundedSender<StreamEvent>,
    ) -> Result<(), ChatError> {
        use futures::StreamExt;

        let mut stream = match provider {
            ProviderId::Ollama => ollama::attempt(&self.http, settings, history).await?,
            ProviderId::Gemini => gemini::attempt(&self.http, settings, history).await?,
            ProviderId::Groq => groq::attempt(&self.http, settings, history).await?,
        };
        while let Some(item) = stream.next().await {
            let token = item?;
            // A dropped receiver means the caller stopped listening; there
            // is no cancellation contract, so keep draining quietly.
            let _ = events.send(StreamEvent::Token(token));
        }
        Ok(())
    }
}
