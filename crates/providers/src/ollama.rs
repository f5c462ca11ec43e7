//! Ollama-style local provider: newline-delimited JSON chat streaming.

use bytes::BytesMut;
use serde_json::json;
use tracing::debug;
use zoey_core::llm::{ChatError, Message, Role, TokenStream};
use zoey_core::settings::Settings;

use crate::stream::{check_status, decode_body, map_reqwest_err, Frame, FrameDecoder};

pub(crate) fn eligible(settings: &Settings) -> bool {
    !settings.ollama_url.trim().is_empty()
}

pub(crate) async fn attempt(
    client: &reqwest::Client,
    settings: &Settings,
    history: &[Message],
) -> Result<TokenStream<'static>, ChatError> {
    let url = format!("{}/api/chat", settings.ollama_url.trim_end_matches('/'));
    let model = if settings.ollama_model.trim().is_empty() {
        "llama2"
    } else {
        settings.ollama_model.as_str()
    };
    let body = json!({
        "model": model,
        "messages": map_messages(history),
        "stream": true,
    });
    debug!(target: "providers::ollama", url = %url, model, "starting chat stream");

    let resp = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(map_reqwest_err)?;
    let resp = check_status(resp).await?;
    Ok(decode_body(resp, LineDecoder::default()))
}

fn map_messages(msgs: &[Message]) -> Vec<serde_json::Value> {
    msgs.iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            json!({ "role": role, "content": m.content })
        })
        .collect()
}

/// NDJSON framing: one JSON object per line. The final object carries
/// `done: true`; a line may hold both content and the done flag.
#[derive(Default)]
pub(crate) struct LineDecoder {
    buf: BytesMut,
}

impl FrameDecoder for LineDecoder {
    fn push(&mut self, chunk: &[u8], out: &mut Vec<Frame>) {
        self.buf.extend_from_slice(chunk);
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            match std::str::from_utf8(&line) {
                Ok(s) => decode_line(s.trim(), out),
                Err(_) => debug!(target: "providers::ollama", "skipping non-utf8 line"),
            }
        }
    }

    // A body may close without a trailing newline; the residue is still one
    // full line.
    fn finish(&mut self, out: &mut Vec<Frame>) {
        if self.buf.is_empty() {
            return;
        }
        let line = self.buf.split_to(self.buf.len());
        match std::str::from_utf8(&line) {
            Ok(s) => decode_line(s.trim(), out),
            Err(_) => debug!(target: "providers::ollama", "skipping non-utf8 line"),
        }
    }
}

fn decode_line(line: &str, out: &mut Vec<Frame>) {
    if line.is_empty() {
        return;
    }
    let Ok(v) = serde_json::from_str::<serde_json::Value>(line) else {
        debug!(target: "providers::ollama", "skipping malformed line");
        return;
    };
    if let Some(text) = v["message"]["content"].as_str() {
        if !text.is_empty() {
            out.push(Frame::Token(text.to_string()));
        }
    }
    if v["done"].as_bool() == Some(true) {
        out.push(Frame::End);
    }
}
