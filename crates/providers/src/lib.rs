pub mod engine;
mod gemini;
mod groq;
mod ollama;
mod stream;

pub use engine::{EngineError, FallbackEngine};
