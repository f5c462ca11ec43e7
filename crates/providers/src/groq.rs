//! Groq-style provider: OpenAI-compatible chat completions over SSE.

use bytes::BytesMut;
use serde_json::json;
use tracing::debug;
use zoey_core::llm::{ChatError, Message, Role, TokenStream};
use zoey_core::settings::Settings;

use crate::stream::{check_status, decode_body, map_reqwest_err, Frame, FrameDecoder};

pub(crate) fn eligible(settings: &Settings) -> bool {
    !settings.groq_api_key.trim().is_empty()
}

pub(crate) async fn attempt(
    client: &reqwest::Client,
    settings: &Settings,
    history: &[Message],
) -> Result<TokenStream<'static>, ChatError> {
    let url = format!(
        "{}/openai/v1/chat/completions",
        settings.groq_url.trim_end_matches('/')
    );
    let model = if settings.groq_model.trim().is_empty() {
        "llama-3.1-70b-versatile"
    } else {
        settings.groq_model.as_str()
    };
    let messages: Vec<serde_json::Value> = history
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            json!({ "role": role, "content": m.content })
        })
        .collect();
    let body = json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });
    debug!(target: "providers::groq", url = %url, model, "starting chat stream");

    let resp = client
        .post(&url)
        .bearer_auth(&settings.groq_api_key)
        .json(&body)
        .send()
        .await
        .map_err(map_reqwest_err)?;
    let resp = check_status(resp).await?;
    Ok(decode_body(resp, SseDecoder::default()))
}

/// SSE framing: events separated by a blank line, payload on `data:` lines,
/// `[DONE]` sentinel ends the stream.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buf: BytesMut,
}

impl FrameDecoder for SseDecoder {
    fn push(&mut self, chunk: &[u8], out: &mut Vec<Frame>) {
        self.buf.extend_from_slice(chunk);
        while let Some((pos, sep_len)) = event_boundary(&self.buf) {
            let event = self.buf.split_to(pos);
            let _ = self.buf.split_to(sep_len);
            decode_event(&event, out);
        }
    }

    // The final event may arrive without its terminating blank line.
    fn finish(&mut self, out: &mut Vec<Frame>) {
        if self.buf.is_empty() {
            return;
        }
        let event = self.buf.split_to(self.buf.len());
        decode_event(&event, out);
    }
}

/// Earliest event separator in the buffer, LF or CRLF flavored.
fn event_boundary(buf: &BytesMut) -> Option<(usize, usize)> {
    let lf = twoway::find_bytes(buf, b"\n\n");
    let crlf = twoway::find_bytes(buf, b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => {
            if b < a {
                Some((b, 4))
            } else {
                Some((a, 2))
            }
        }
        (Some(a), None) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

fn decode_event(event: &[u8], out: &mut Vec<Frame>) {
    let Ok(s) = std::str::from_utf8(event) else {
        debug!(target: "providers::groq", "skipping non-utf8 event");
        return;
    };
    for line in s.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            out.push(Frame::End);
            return;
        }
        let Ok(v) = serde_json::from_str::<serde_json::Value>(data) else {
            debug!(target: "providers::groq", "skipping malformed data payload");
            continue;
        };
        if let Some(content) = v["choices"][0]["delta"]["content"].as_str() {
            if !content.is_empty() {
                out.push(Frame::Token(content.to_string()));
            }
        }
    }
}
