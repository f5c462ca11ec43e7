pub mod llm {
    use std::pin::Pin;

    use futures::Stream;
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        Assistant,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct Message {
        pub role: Role,
        pub content: String,
    }

    impl Message {
        pub fn user<S: Into<String>>(s: S) -> Self {
            Self {
                role: Role::User,
                content: s.into(),
            }
        }
        pub fn assistant<S: Into<String>>(s: S) -> Self {
            Self {
                role: Role::Assistant,
                content: s.into(),
            }
        }
    }

    /// One event on the caller-facing stream. A `send_message` call emits
    /// zero or more `Token`s followed by exactly one `Complete`, success or not.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum StreamEvent {
        Token(String),
        Complete,
    }

    /// Transport-level failure of a single provider attempt. These never
    /// reach the caller; the engine logs them and advances to the next
    /// provider in the priority list.
    #[derive(Error, Debug)]
    pub enum ChatError {
        #[error("network: {0}")]
        Network(String),
        #[error("status: {0}")]
        Status(String),
        #[error("timeout: {0}")]
        Timeout(String),
        #[error("decode: {0}")]
        Decode(String),
        #[error("other: {0}")]
        Other(String),
    }

    pub type TokenStream<'a> = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send + 'a>>;
}

pub mod settings {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum ProviderId {
        Ollama,
        Gemini,
        Groq,
    }

    impl std::fmt::Display for ProviderId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let s = match self {
                Self::Ollama => "ollama",
                Self::Gemini => "gemini",
                Self::Groq => "groq",
            };
            f.write_str(s)
        }
    }

    /// Everything the engine and the speech queue need from the embedding
    /// application. Serde-round-trippable so the presentation layer can
    /// persist it however it likes; nothing here touches disk or the
    /// environment.
    ///
    /// A provider with an empty URL or credential is ineligible and is
    /// skipped without a network call.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Settings {
        pub ollama_url: String,
        pub ollama_model: String,
        pub gemini_url: String,
        pub gemini_api_key: String,
        pub gemini_model: String,
        pub groq_url: String,
        pub groq_api_key: String,
        pub groq_model: String,
        pub eleven_labs_url: String,
        pub eleven_labs_api_key: String,
        pub eleven_labs_voice_id: String,
        pub provider_priority: Vec<ProviderId>,
        pub voice_output_enabled: bool,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                ollama_url: "http://localhost:11434".to_string(),
                ollama_model: "llama2".to_string(),
                gemini_url: "https://generativelanguage.googleapis.com".to_string(),
                gemini_api_key: String::new(),
                gemini_model: "gemini-pro".to_string(),
                groq_url: "https://api.groq.com".to_string(),
                groq_api_key: String::new(),
                groq_model: "llama-3.1-70b-versatile".to_string(),
                eleven_labs_url: "https://api.elevenlabs.io".to_string(),
                eleven_labs_api_key: String::new(),
                eleven_labs_voice_id: "EXAVITQu4vr4xnSDxMaL".to_string(),
                provider_priority: vec![ProviderId::Ollama, ProviderId::Gemini, ProviderId::Groq],
                voice_output_enabled: true,
            }
        }
    }
}
