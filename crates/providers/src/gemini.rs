//! Gemini-style provider: `streamGenerateContent` returns one long JSON
//! array of chunk objects, split across transport chunks at arbitrary byte
//! boundaries.
//!
//! The decoder here is a real incremental extractor (brace depth with
//! string/escape awareness) rather than a pattern scan over the buffer, so
//! a fragment split inside a string literal can neither be missed nor
//! delivered twice.

use bytes::{Buf, BytesMut};
use serde_json::json;
use tracing::debug;
use zoey_core::llm::{ChatError, Message, Role, TokenStream};
use zoey_core::settings::Settings;

use crate::stream::{check_status, decode_body, map_reqwest_err, Frame, FrameDecoder};

pub(crate) fn eligible(settings: &Settings) -> bool {
    !settings.gemini_api_key.trim().is_empty()
}

pub(crate) async fn attempt(
    client: &reqwest::Client,
    settings: &Settings,
    history: &[Message],
) -> Result<TokenStream<'static>, ChatError> {
    let model = if settings.gemini_model.trim().is_empty() {
        "gemini-pro"
    } else {
        settings.gemini_model.as_str()
    };
    let url = format!(
        "{}/v1beta/models/{}:streamGenerateContent?key={}",
        settings.gemini_url.trim_end_matches('/'),
        model,
        settings.gemini_api_key,
    );
    // Gemini names the assistant role "model".
    let contents: Vec<serde_json::Value> = history
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::Assistant => "model",
                Role::User => "user",
            };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();
    let body = json!({ "contents": contents });
    debug!(target: "providers::gemini", model, "starting chat stream");

    let resp = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(map_reqwest_err)?;
    let resp = check_status(resp).await?;
    Ok(decode_body(resp, JsonArrayDecoder::default()))
}

/// Extracts complete top-level JSON objects from a growing buffer holding
/// an array like `[{...},\n{...}]`. Bytes between objects (brackets,
/// commas, whitespace) are discarded. There is no end sentinel; transport
/// close ends the stream.
#[derive(Default)]
pub(crate) struct JsonArrayDecoder {
    buf: BytesMut,
    /// Next unscanned offset into `buf`.
    scan: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    obj_start: Option<usize>,
}

impl FrameDecoder for JsonArrayDecoder {
    fn push(&mut self, chunk: &[u8], out: &mut Vec<Frame>) {
        self.buf.extend_from_slice(chunk);
        while self.scan < self.buf.len() {
            let b = self.buf[self.scan];
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
            } else {
                match b {
                    b'"' => self.in_string = true,
                    b'{' => {
                        if self.depth == 0 {
                            self.obj_start = Some(self.scan);
                        }
                        self.depth += 1;
                    }
                    b'}' => {
                        self.depth = self.depth.saturating_sub(1);
                        if self.depth == 0 {
                            if let Some(start) = self.obj_start.take() {
                                let text = extract_text(&self.buf[start..=self.scan]);
                                if let Some(text) = text {
                                    out.push(Frame::Token(text));
                                }
                                // Everything up to and including this object
                                // is consumed; rebase the scan offset.
                                self.buf.advance(self.scan + 1);
                                self.scan = 0;
                                continue;
                            }
                        }
                    }
                    _ => {}
                }
            }
            self.scan += 1;
        }
        // Nothing before an open object is ever needed again.
        if self.depth == 0 && self.obj_start.is_none() && self.scan > 0 {
            self.buf.advance(self.scan);
            self.scan = 0;
        }
    }
}

fn extract_text(obj: &[u8]) -> Option<String> {
    let v: serde_json::Value = match serde_json::from_slice(obj) {
        Ok(v) => v,
        Err(_) => {
            debug!(target: "providers::gemini", "skipping malformed chunk object");
            return None;
        }
    };
    let text = v["candidates"][0]["content"]["parts"][0]["text"].as_str()?;
    if text.is_empty() {
        return None;
    }
    Some(text.to_string())
}
