//! Shared plumbing for streaming provider responses.
//!
//! Each provider speaks a different framing on the wire; a [`FrameDecoder`]
//! turns raw transport chunks into normalized frames, and [`decode_body`]
//! drives one decoder over a response body with an idle-stream guard.

use std::time::{Duration, Instant};

use futures::StreamExt;
use zoey_core::llm::{ChatError, TokenStream};

/// A stream that produces no bytes for this long is treated as wedged and
/// the attempt fails over to the next provider.
pub(crate) const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    Token(String),
    /// Provider-signaled end of stream. Transport close without this frame
    /// is also a clean end; decoders only emit it for explicit sentinels.
    End,
}

/// Incremental decoder for one provider framing. `push` consumes a transport
/// chunk and appends every frame that became complete. Malformed frames are
/// dropped inside the decoder; one bad frame must never lose the rest of the
/// stream.
pub(crate) trait FrameDecoder: Send + 'static {
    fn push(&mut self, chunk: &[u8], out: &mut Vec<Frame>);

    /// Decode whatever is still buffered when the transport closes. Framings
    /// whose separator trails the payload need this so an unterminated final
    /// frame is delivered rather than dropped.
    fn finish(&mut self, out: &mut Vec<Frame>) {
        let _ = out;
    }
}

/// Drive `decoder` over the response body, yielding token text in arrival
/// order. The stream terminates on a provider `End` frame, transport close,
/// a transport error, or the idle timeout; the latter two yield an `Err`
/// item first.
pub(crate) fn decode_body<D: FrameDecoder>(
    resp: reqwest::Response,
    mut decoder: D,
) -> TokenStream<'static> {
    let mut body = resp.bytes_stream();
    Box::pin(async_stream::stream! {
        let mut frames: Vec<Frame> = Vec::new();
        let mut last = Instant::now();
        'outer: loop {
            tokio::select! {
                chunk = body.next() => {
                    match chunk {
                        Some(Ok(b)) => {
                            last = Instant::now();
                            decoder.push(&b, &mut frames);
                            for f in frames.drain(..) {
                                match f {
                                    Frame::Token(t) => yield Ok(t),
                                    Frame::End => break 'outer,
                                }
                            }
                        }
                        Some(Err(e)) => {
                            yield Err(map_reqwest_err(e));
                            break 'outer;
                        }
                        None => {
                            decoder.finish(&mut frames);
                            for f in frames.drain(..) {
                                if let Frame::Token(t) = f {
                                    yield Ok(t);
                                }
                            }
                            break 'outer;
                        }
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(500)) => {
                    if last.elapsed() > STREAM_IDLE_TIMEOUT {
                        yield Err(ChatError::Timeout("idle stream".into()));
                        break 'outer;
                    }
                }
            }
        }
    })
}

pub(crate) fn map_reqwest_err(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::Timeout(e.to_string())
    } else if e.is_request() || e.is_connect() {
        ChatError::Network(e.to_string())
    } else {
        ChatError::Other(e.to_string())
    }
}

/// Reject non-success statuses before any body read, folding the response
/// body into the error for the logs.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ChatError::Status(format!("{} {}", status.as_u16(), body)))
}
