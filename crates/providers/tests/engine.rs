//! Contract tests for the fallback engine against mock provider endpoints.

use providers::{EngineError, FallbackEngine};
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zoey_core::llm::{Message, StreamEvent};
use zoey_core::settings::{ProviderId, Settings};

/// Settings where every provider is ineligible until a test fills one in.
fn blank_settings() -> Settings {
    Settings {
        ollama_url: String::new(),
        gemini_api_key: String::new(),
        groq_api_key: String::new(),
        ..Settings::default()
    }
}

async fn collect(
    engine: &mut FallbackEngine,
    settings: &Settings,
    history: &[Message],
) -> (Result<ProviderId, EngineError>, Vec<StreamEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = engine.send_message(settings, history, &tx).await;
    drop(tx);
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    (result, events)
}

fn tokens(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Token(t) => Some(t.as_str()),
            StreamEvent::Complete => None,
        })
        .collect()
}

fn completes(events: &[StreamEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Complete))
        .count()
}

const OLLAMA_BODY: &str = concat!(
    "{\"message\":{\"content\":\"Hello\"},\"done\":false}\n",
    "{\"message\":{\"content\":\" from\"},\"done\":false}\n",
    "{\"message\":{\"content\":\" ollama\"},\"done\":false}\n",
    "{\"message\":{\"content\":\"\"},\"done\":true}\n",
);

#[tokio::test]
async fn ollama_success_streams_tokens_then_complete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({
            "model": "llama2",
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(OLLAMA_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = blank_settings();
    settings.ollama_url = server.uri();

    let mut engine = FallbackEngine::new().unwrap();
    let (result, events) = collect(&mut engine, &settings, &[Message::user("hi")]).await;

    assert_eq!(result.unwrap(), ProviderId::Ollama);
    assert_eq!(tokens(&events), "Hello from ollama");
    assert_eq!(completes(&events), 1);
    assert!(matches!(events.last(), Some(StreamEvent::Complete)));
    assert_eq!(engine.active_provider(), Some(ProviderId::Ollama));
    assert!(engine.last_error().is_none());
}

#[tokio::test]
async fn ineligible_provider_is_skipped_without_network() {
    // Priority [Ollama, Groq] with Ollama unconfigured: Groq answers with
    // two SSE chunks and [DONE], Ollama is never contacted.
    let server = MockServer::start().await;
    let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
               data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n\
               data: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(header("authorization", "Bearer gsk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = blank_settings();
    settings.groq_url = server.uri();
    settings.groq_api_key = "gsk-test".into();
    settings.provider_priority = vec![ProviderId::Ollama, ProviderId::Groq];

    let mut engine = FallbackEngine::new().unwrap();
    let (result, events) = collect(&mut engine, &settings, &[Message::user("hi")]).await;

    assert_eq!(result.unwrap(), ProviderId::Groq);
    assert_eq!(
        events,
        vec![
            StreamEvent::Token("Hi".into()),
            StreamEvent::Token(" there".into()),
            StreamEvent::Complete,
        ]
    );
    assert_eq!(engine.active_provider(), Some(ProviderId::Groq));
}

#[tokio::test]
async fn failing_provider_falls_through_to_next() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\ndata: [DONE]\n\n",
                ),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = blank_settings();
    settings.ollama_url = server.uri();
    settings.groq_url = server.uri();
    settings.groq_api_key = "gsk".into();
    settings.provider_priority = vec![ProviderId::Ollama, ProviderId::Groq];

    let mut engine = FallbackEngine::new().unwrap();
    let (result, events) = collect(&mut engine, &settings, &[Message::user("hi")]).await;

    assert_eq!(result.unwrap(), ProviderId::Groq);
    // The 500 body never leaks into the event stream.
    assert_eq!(tokens(&events), "ok");
    assert_eq!(completes(&events), 1);
}

#[tokio::test]
async fn all_ineligible_reports_aggregate_failure_with_terminal_complete() {
    let settings = blank_settings();
    let mut engine = FallbackEngine::new().unwrap();
    let (result, events) = collect(&mut engine, &settings, &[Message::user("hi")]).await;

    assert_eq!(result.unwrap_err(), EngineError::AllProvidersFailed);
    assert_eq!(events, vec![StreamEvent::Complete]);
    assert_eq!(engine.active_provider(), None);
    assert_eq!(
        engine.last_error(),
        Some("all providers failed or were not configured")
    );
}

#[tokio::test]
async fn all_failing_reports_aggregate_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut settings = blank_settings();
    settings.ollama_url = server.uri();
    settings.groq_url = server.uri();
    settings.groq_api_key = "gsk".into();
    settings.provider_priority = vec![ProviderId::Ollama, ProviderId::Groq];

    let mut engine = FallbackEngine::new().unwrap();
    let (result, events) = collect(&mut engine, &settings, &[Message::user("hi")]).await;

    assert_eq!(result.unwrap_err(), EngineError::AllProvidersFailed);
    assert_eq!(events, vec![StreamEvent::Complete]);
    assert!(engine.last_error().is_some());
}

#[tokio::test]
async fn gemini_maps_assistant_role_to_model_and_reconstructs_text() {
    let server = MockServer::start().await;
    let body = "[{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"The \"}]}}]},\n\
                {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"answer\"}]}}]}]";
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-pro:streamGenerateContent"))
        .and(body_partial_json(serde_json::json!({
            "contents": [
                {"role": "user", "parts": [{"text": "question"}]},
                {"role": "model", "parts": [{"text": "earlier reply"}]},
                {"role": "user", "parts": [{"text": "follow-up"}]},
            ],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = blank_settings();
    settings.gemini_url = server.uri();
    settings.gemini_api_key = "key".into();
    settings.provider_priority = vec![ProviderId::Gemini];

    let history = vec![
        Message::user("question"),
        Message::assistant("earlier reply"),
        Message::user("follow-up"),
    ];

    let mut engine = FallbackEngine::new().unwrap();
    let (result, events) = collect(&mut engine, &settings, &history).await;

    assert_eq!(result.unwrap(), ProviderId::Gemini);
    assert_eq!(tokens(&events), "The answer");
    assert_eq!(completes(&events), 1);
}

#[tokio::test]
async fn body_closing_without_trailing_newline_keeps_the_last_token() {
    let server = MockServer::start().await;
    let body = "{\"message\":{\"content\":\"Hello\"},\"done\":false}\n\
                {\"message\":{\"content\":\" world\"},\"done\":false}";
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let mut settings = blank_settings();
    settings.ollama_url = server.uri();
    settings.provider_priority = vec![ProviderId::Ollama];

    let mut engine = FallbackEngine::new().unwrap();
    let (result, events) = collect(&mut engine, &settings, &[Message::user("hi")]).await;

    assert_eq!(result.unwrap(), ProviderId::Ollama);
    assert_eq!(tokens(&events), "Hello world");
    assert_eq!(completes(&events), 1);
}

#[tokio::test]
async fn malformed_frames_do_not_reduce_valid_tokens() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"message\":{\"content\":\"a\"},\"done\":false}\n",
        "garbage that is not json\n",
        "{\"message\":{\"content\":\"b\"},\"done\":false}\n",
        "{\"done\":true}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let mut settings = blank_settings();
    settings.ollama_url = server.uri();
    settings.provider_priority = vec![ProviderId::Ollama];

    let mut engine = FallbackEngine::new().unwrap();
    let (result, events) = collect(&mut engine, &settings, &[Message::user("hi")]).await;

    assert_eq!(result.unwrap(), ProviderId::Ollama);
    assert_eq!(tokens(&events), "ab");
    assert_eq!(completes(&events), 1);
}
