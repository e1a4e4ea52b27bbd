//! Session behaviour against a scripted model provider.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use std::sync::{Arc, Mutex};

use futures::stream;

use urochat::chat::{
    Author, BindingPolicy, ChatConfig, ChatSession, ParamsChange, Renderer, UserRole,
};
use urochat::{
    Error, FinishReason, Gemini, GenerateContentRequest, GenerateContentResponse, Model,
    ModelInfo, ModelProvider, ResponseStream, Result, UsageMetadata,
};

enum Script {
    Reply(Vec<&'static str>),
    FailBefore(Error),
    FailAfter(Vec<&'static str>, Error),
    Stall,
}

#[derive(Default)]
struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<GenerateContentRequest>>,
    describe_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    describe_error: Option<Error>,
    describe_stalls: bool,
    stalled: Arc<AtomicBool>,
}

impl ScriptedProvider {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        })
    }

    fn failing_describe(error: Error) -> Arc<Self> {
        Arc::new(Self {
            describe_error: Some(error),
            ..Self::default()
        })
    }

    fn stalling_describe() -> Arc<Self> {
        Arc::new(Self {
            describe_stalls: true,
            ..Self::default()
        })
    }

    fn request(&self, index: usize) -> GenerateContentRequest {
        self.requests.lock().unwrap()[index].clone()
    }

    fn last_prompt(&self) -> String {
        let requests = self.requests.lock().unwrap();
        let request = requests.last().unwrap();
        request.contents.last().unwrap().text()
    }
}

fn chunk(text: &str) -> Result<GenerateContentResponse> {
    Ok(GenerateContentResponse::from_text(text))
}

#[async_trait::async_trait]
impl ModelProvider for ScriptedProvider {
    async fn describe_model(&self, model: &Model) -> Result<ModelInfo> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if self.describe_stalls {
            self.stalled.store(true, Ordering::SeqCst);
            futures::future::pending::<()>().await;
        }
        if let Some(err) = &self.describe_error {
            return Err(err.clone());
        }
        Ok(ModelInfo {
            name: format!("models/{model}"),
            supported_generation_methods: vec!["generateContent".to_string()],
            ..ModelInfo::default()
        })
    }

    async fn stream_generate_content(
        &self,
        _model: &Model,
        request: GenerateContentRequest,
    ) -> Result<ResponseStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply left");
        let items: Vec<Result<GenerateContentResponse>> = match script {
            Script::Reply(texts) => {
                let mut items: Vec<_> = texts.into_iter().map(chunk).collect();
                items.push(Ok(GenerateContentResponse::default()
                    .with_finish_reason(FinishReason::Stop)
                    .with_usage(UsageMetadata::new(40, 10))));
                items
            }
            Script::FailBefore(err) => return Err(err),
            Script::Stall => {
                self.stalled.store(true, Ordering::SeqCst);
                return futures::future::pending().await;
            }
            Script::FailAfter(texts, err) => {
                let mut items: Vec<_> = texts.into_iter().map(chunk).collect();
                items.push(Err(err));
                items
            }
        };
        Ok(Box::pin(stream::iter(items)))
    }
}

#[derive(Default)]
struct RecordingRenderer {
    partials: Vec<String>,
    finished: Vec<String>,
    incomplete: Vec<String>,
    captions: Vec<String>,
    interrupt: bool,
    interrupt_on: Option<Arc<AtomicBool>>,
}

impl Renderer for RecordingRenderer {
    fn print_message(&mut self, _author: Author, _text: &str) {}

    fn print_partial(&mut self, _fragment: &str, buffer: &str) {
        self.partials.push(buffer.to_string());
    }

    fn finish_response(&mut self, text: &str) {
        self.finished.push(text.to_string());
    }

    fn print_incomplete(&mut self, partial: &str) {
        self.incomplete.push(partial.to_string());
    }

    fn print_caption(&mut self, caption: &str) {
        self.captions.push(caption.to_string());
    }

    fn print_error(&mut self, _error: &str) {}

    fn print_info(&mut self, _info: &str) {}

    fn should_interrupt(&self) -> bool {
        self.interrupt
            || self
                .interrupt_on
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

fn session(provider: &Arc<ScriptedProvider>, config: ChatConfig) -> ChatSession<ScriptedProvider> {
    ChatSession::new(Arc::clone(provider), config)
}

#[tokio::test]
async fn history_keeps_submission_order() {
    let provider = ScriptedProvider::new(vec![
        Script::Reply(vec!["Answer one."]),
        Script::Reply(vec!["Answer two."]),
    ]);
    let mut session = session(&provider, ChatConfig::default());
    let mut renderer = RecordingRenderer::default();

    session.send_streaming("First question", &mut renderer).await.unwrap();
    session.send_streaming("Second question", &mut renderer).await.unwrap();

    let messages: Vec<(Author, &str)> = session
        .transcript()
        .iter()
        .map(|m| (m.author(), m.text()))
        .collect();
    assert_eq!(
        messages,
        vec![
            (Author::User, "First question"),
            (Author::Assistant, "Answer one."),
            (Author::User, "Second question"),
            (Author::Assistant, "Answer two."),
        ]
    );
    assert_eq!(session.stats().total_exchanges, 2);
}

#[tokio::test]
async fn committed_text_is_fragment_concatenation() {
    let provider = ScriptedProvider::new(vec![Script::Reply(vec![
        "Kidney ",
        "",
        "stones ",
        "form.",
    ])]);
    let mut session = session(&provider, ChatConfig::default());
    let mut renderer = RecordingRenderer::default();

    let report = session.send_streaming("Stones?", &mut renderer).await.unwrap();

    let committed = session.transcript().messages()[1].text();
    assert_eq!(committed, "Kidney stones form.");
    assert_eq!(
        renderer.partials,
        vec!["Kidney ", "Kidney stones ", "Kidney stones form."]
    );
    assert_eq!(renderer.finished, vec!["Kidney stones form."]);
    assert_eq!(report.estimated_tokens, 3);
    assert_eq!(report.max_tokens, 2048);
    assert_eq!(report.usage, Some(UsageMetadata::new(40, 10)));
    assert_eq!(renderer.captions.len(), 1);
    assert!(renderer.captions[0].ends_with("| ~3 tokens | Max: 2048"));
}

#[tokio::test]
async fn reset_empties_transcript() {
    let provider = ScriptedProvider::new(vec![Script::Reply(vec!["ok"])]);
    let mut session = session(&provider, ChatConfig::default());
    let mut renderer = RecordingRenderer::default();

    session.send_streaming("q", &mut renderer).await.unwrap();
    assert_eq!(session.message_count(), 2);

    session.reset();
    assert_eq!(session.message_count(), 0);
    assert!(session.transcript().is_empty());
    assert!(!session.is_bound());
}

#[tokio::test]
async fn prompt_carries_role_and_verbatim_query() {
    let provider = ScriptedProvider::new(vec![Script::Reply(vec!["ok"])]);
    let mut session = session(&provider, ChatConfig::default());
    let mut renderer = RecordingRenderer::default();

    session
        .send_streaming("What causes kidney stones?", &mut renderer)
        .await
        .unwrap();

    let prompt = provider.last_prompt();
    assert!(prompt.contains("Patient"));
    assert!(prompt.contains("What causes kidney stones?"));
    // The transcript keeps the raw query, not the composed prompt
    assert_eq!(
        session.transcript().messages()[0].text(),
        "What causes kidney stones?"
    );
}

#[tokio::test]
async fn credential_failure_prevents_streaming() {
    let err = Gemini::new(Some("   ".to_string())).unwrap_err();
    assert!(err.is_credential());

    let provider = ScriptedProvider::failing_describe(Error::credential("API key is empty"));
    let mut session = session(&provider, ChatConfig::default());
    let mut renderer = RecordingRenderer::default();

    let err = session.send_streaming("hello", &mut renderer).await.unwrap_err();
    assert!(err.is_credential());
    assert_eq!(provider.stream_calls.load(Ordering::SeqCst), 0);
    assert!(session.transcript().is_empty());
    assert!(!session.is_bound());
}

#[tokio::test]
async fn mid_stream_failure_commits_nothing() {
    let provider = ScriptedProvider::new(vec![
        Script::Reply(vec!["First answer."]),
        Script::FailAfter(
            vec!["Partial ", "answer"],
            Error::streaming("connection reset", None),
        ),
    ]);
    let mut session = session(&provider, ChatConfig::default());
    let mut renderer = RecordingRenderer::default();

    session.send_streaming("one", &mut renderer).await.unwrap();
    let err = session.send_streaming("two", &mut renderer).await.unwrap_err();

    assert!(err.is_mid_stream());
    assert_eq!(err.fragments_received(), Some(2));
    assert_eq!(session.message_count(), 2);
    assert_eq!(session.binding_history_len(), 2);
    assert_eq!(renderer.incomplete, vec!["Partial answer"]);
    assert_eq!(renderer.captions.len(), 1);
    assert_eq!(session.stats().failed_exchanges, 1);
}

#[tokio::test]
async fn transient_failure_before_first_fragment() {
    let provider = ScriptedProvider::new(vec![
        Script::FailBefore(Error::service_unavailable("overloaded", Some(5))),
        Script::Reply(vec!["recovered"]),
    ]);
    let mut session = session(&provider, ChatConfig::default());
    let mut renderer = RecordingRenderer::default();

    let err = session.send_streaming("q", &mut renderer).await.unwrap_err();
    assert!(err.is_transient());
    assert!(!err.is_mid_stream());
    assert!(session.transcript().is_empty());
    assert!(session.is_bound());

    // The user retries by hand; the same binding is reused
    session.send_streaming("q", &mut renderer).await.unwrap();
    assert_eq!(provider.describe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.message_count(), 2);
}

#[tokio::test]
async fn binding_replays_committed_history() {
    let provider = ScriptedProvider::new(vec![
        Script::Reply(vec!["Answer one."]),
        Script::Reply(vec!["Answer two."]),
    ]);
    let mut session = session(&provider, ChatConfig::default());
    let mut renderer = RecordingRenderer::default();

    session.send_streaming("one", &mut renderer).await.unwrap();
    session.send_streaming("two", &mut renderer).await.unwrap();

    let second = provider.request(1);
    assert_eq!(second.contents.len(), 3);
    assert!(second.contents[0].text().contains("Query: one"));
    assert_eq!(second.contents[1].text(), "Answer one.");
    assert!(second.contents[2].text().contains("Query: two"));
    assert!(second.system_instruction.is_some());
}

#[tokio::test]
async fn role_change_applies_to_next_prompt_without_rebinding() {
    let provider = ScriptedProvider::new(vec![
        Script::Reply(vec!["ok"]),
        Script::Reply(vec!["ok"]),
    ]);
    let mut session = session(&provider, ChatConfig::default());
    let mut renderer = RecordingRenderer::default();

    session.send_streaming("q", &mut renderer).await.unwrap();
    session.apply_role_change(UserRole::MedicalStudent);
    session.send_streaming("q", &mut renderer).await.unwrap();

    assert!(provider.last_prompt().contains("User type: Medical Student"));
    assert_eq!(provider.describe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.request(1).contents.len(), 3);
}

#[tokio::test]
async fn rebuild_policy_starts_fresh_binding() {
    let provider = ScriptedProvider::new(vec![
        Script::Reply(vec!["ok"]),
        Script::Reply(vec!["ok"]),
    ]);
    let mut session = session(
        &provider,
        ChatConfig::default().with_binding_policy(BindingPolicy::Rebuild),
    );
    let mut renderer = RecordingRenderer::default();

    session.send_streaming("q1", &mut renderer).await.unwrap();
    assert_eq!(session.set_temperature(0.7).unwrap(), ParamsChange::Rebound);
    assert!(!session.is_bound());
    assert_eq!(session.message_count(), 2);

    session.send_streaming("q2", &mut renderer).await.unwrap();
    assert_eq!(provider.describe_calls.load(Ordering::SeqCst), 2);
    let second = provider.request(1);
    assert_eq!(second.contents.len(), 1);
    assert_eq!(
        second.generation_config.as_ref().and_then(|g| g.temperature),
        Some(0.7)
    );
    assert_eq!(session.message_count(), 4);
}

#[tokio::test]
async fn defer_policy_waits_for_reset() {
    let provider = ScriptedProvider::new(vec![
        Script::Reply(vec!["ok"]),
        Script::Reply(vec!["ok"]),
        Script::Reply(vec!["ok"]),
    ]);
    let mut session = session(
        &provider,
        ChatConfig::default().with_binding_policy(BindingPolicy::Defer),
    );
    let mut renderer = RecordingRenderer::default();

    session.send_streaming("q1", &mut renderer).await.unwrap();
    assert_eq!(session.set_max_tokens(4096).unwrap(), ParamsChange::Deferred);
    assert_eq!(session.set_temperature(0.9).unwrap(), ParamsChange::Deferred);
    assert!(session.has_pending_change());
    assert_eq!(session.requested_params(), (0.9, 4096));

    let report = session.send_streaming("q2", &mut renderer).await.unwrap();
    assert_eq!(report.max_tokens, 2048);
    let second = provider.request(1);
    assert_eq!(second.contents.len(), 3);
    assert_eq!(
        second.generation_config.as_ref().and_then(|g| g.temperature),
        Some(0.3)
    );

    session.reset();
    assert!(!session.has_pending_change());
    assert_eq!(session.config().temperature, 0.9);
    assert_eq!(session.config().max_tokens, 4096);

    session.send_streaming("q3", &mut renderer).await.unwrap();
    let third = provider.request(2);
    assert_eq!(third.contents.len(), 1);
    assert_eq!(
        third.generation_config.as_ref().and_then(|g| g.max_output_tokens),
        Some(4096)
    );
}

#[tokio::test]
async fn interrupt_resets_session() {
    let provider = ScriptedProvider::new(vec![
        Script::Reply(vec!["ok"]),
        Script::Reply(vec!["never", "shown"]),
    ]);
    let mut session = session(&provider, ChatConfig::default());
    let mut renderer = RecordingRenderer::default();

    session.send_streaming("q1", &mut renderer).await.unwrap();
    renderer.interrupt = true;
    let err = session.send_streaming("q2", &mut renderer).await.unwrap_err();

    assert!(err.is_abort());
    assert!(session.transcript().is_empty());
    assert!(!session.is_bound());
}

#[tokio::test]
async fn interrupt_while_waiting_for_reply_headers() {
    let provider = ScriptedProvider::new(vec![Script::Reply(vec!["ok"]), Script::Stall]);
    let mut session = session(&provider, ChatConfig::default());
    let mut renderer = RecordingRenderer::default();
    session.send_streaming("q1", &mut renderer).await.unwrap();

    renderer.interrupt_on = Some(Arc::clone(&provider.stalled));
    let err = tokio::time::timeout(
        Duration::from_secs(2),
        session.send_streaming("q2", &mut renderer),
    )
    .await
    .expect("stalled request ignored the interrupt")
    .unwrap_err();

    assert!(err.is_abort());
    assert_eq!(provider.stream_calls.load(Ordering::SeqCst), 2);
    assert!(renderer.partials.iter().all(|p| p == "ok"));
    assert!(session.transcript().is_empty());
    assert!(!session.is_bound());
}

#[tokio::test]
async fn interrupt_while_checking_model() {
    let provider = ScriptedProvider::stalling_describe();
    let mut session = session(&provider, ChatConfig::default());
    let mut renderer = RecordingRenderer {
        interrupt_on: Some(Arc::clone(&provider.stalled)),
        ..RecordingRenderer::default()
    };

    let err = tokio::time::timeout(
        Duration::from_secs(2),
        session.send_streaming("q", &mut renderer),
    )
    .await
    .expect("stalled model check ignored the interrupt")
    .unwrap_err();

    assert!(err.is_abort());
    assert_eq!(provider.describe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.stream_calls.load(Ordering::SeqCst), 0);
    assert!(!session.is_bound());
}

#[tokio::test]
async fn unknown_model_is_provider_config_error() {
    let provider = ScriptedProvider::failing_describe(Error::provider_config(
        "models/gemini-9 is not found",
        Some("gemini-9".to_string()),
    ));
    let config = ChatConfig::default().with_model(Model::Custom("gemini-9".to_string()));
    let mut session = session(&provider, config);
    let mut renderer = RecordingRenderer::default();

    let err = session.send_streaming("q", &mut renderer).await.unwrap_err();
    assert!(err.is_provider_config());
    assert_eq!(provider.stream_calls.load(Ordering::SeqCst), 0);
}
