//! A provider-side conversation with fixed model settings.

use std::sync::Arc;

use crate::chat::stream::ReplyStream;
use crate::client::ModelProvider;
use crate::error::Result;
use crate::observability::SESSION_BINDINGS_OPENED;
use crate::types::{Content, GenerateContentRequest, GenerationConfig, Model, ModelInfo};

/// A conversation bound to one model, one system instruction, and one set of
/// generation settings.
///
/// The binding carries the history that is replayed to the provider on every
/// request. History only grows through [`ChatBinding::commit`], which callers
/// invoke after a reply streamed to completion.
pub struct ChatBinding<P: ModelProvider> {
    provider: Arc<P>,
    model: Model,
    model_info: ModelInfo,
    system_instruction: Content,
    generation_config: GenerationConfig,
    history: Vec<Content>,
}

impl<P: ModelProvider> ChatBinding<P> {
    /// Open a binding after checking that the model exists and can generate
    /// content.
    pub async fn open(
        provider: Arc<P>,
        model: Model,
        system_instruction: &str,
        generation_config: GenerationConfig,
    ) -> Result<Self> {
        let model_info = provider.describe_model(&model).await?;
        SESSION_BINDINGS_OPENED.click();
        tracing::info!(
            model = %model,
            display_name = model_info.display_name.as_deref().unwrap_or(""),
            temperature = ?generation_config.temperature,
            max_output_tokens = ?generation_config.max_output_tokens,
            "opened chat binding"
        );
        Ok(Self {
            provider,
            model,
            model_info,
            system_instruction: Content::system(system_instruction),
            generation_config,
            history: Vec::new(),
        })
    }

    /// Send a prompt with the committed history and stream the reply.
    ///
    /// Nothing is recorded; see [`ChatBinding::commit`].
    pub async fn send(&self, prompt: &str) -> Result<ReplyStream> {
        let mut contents = self.history.clone();
        contents.push(Content::user(prompt));
        let request = GenerateContentRequest::new(contents)
            .with_system_instruction(self.system_instruction.clone())
            .with_generation_config(self.generation_config.clone());
        tracing::debug!(
            model = %self.model,
            history = self.history.len(),
            "sending prompt"
        );
        let stream = self
            .provider
            .stream_generate_content(&self.model, request)
            .await?;
        Ok(ReplyStream::new(stream))
    }

    /// Record a completed exchange in the provider-side history.
    pub fn commit(&mut self, prompt: impl Into<String>, reply: impl Into<String>) {
        self.history.push(Content::user(prompt));
        self.history.push(Content::model(reply));
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation_config
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::StreamExt;
    use futures::stream;

    use super::*;
    use crate::client::ResponseStream;
    use crate::error::Error;
    use crate::types::{FinishReason, GenerateContentResponse, Role};

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<GenerateContentRequest>>,
        unknown_model: bool,
    }

    #[async_trait::async_trait]
    impl ModelProvider for Recorder {
        async fn describe_model(&self, model: &Model) -> Result<ModelInfo> {
            if self.unknown_model {
                return Err(Error::provider_config("not found", Some(model.to_string())));
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
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            Ok(Box::pin(stream::iter(vec![Ok(
                GenerateContentResponse::from_text("ok").with_finish_reason(FinishReason::Stop),
            )])))
        }
    }

    fn generation() -> GenerationConfig {
        GenerationConfig::new().with_temperature(0.3)
    }

    #[tokio::test]
    async fn open_rejects_unknown_model() {
        let provider = Arc::new(Recorder {
            unknown_model: true,
            ..Recorder::default()
        });
        let result = ChatBinding::open(provider, Model::default(), "sys", generation()).await;
        assert!(result.err().unwrap().is_provider_config());
    }

    #[tokio::test]
    async fn send_includes_history_and_settings() {
        let provider = Arc::new(Recorder::default());
        let mut binding =
            ChatBinding::open(provider.clone(), Model::default(), "be precise", generation())
                .await
                .unwrap();
        binding.commit("first", "answer");

        let mut reply = binding.send("second").await.unwrap();
        assert_eq!(reply.next().await.unwrap().unwrap().text, "ok");

        let requests = provider.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.contents.len(), 3);
        assert_eq!(request.contents[0].role, Some(Role::User));
        assert_eq!(request.contents[1].role, Some(Role::Model));
        assert_eq!(request.contents[2].text(), "second");
        assert_eq!(
            request.system_instruction.as_ref().map(Content::text).as_deref(),
            Some("be precise")
        );
        assert_eq!(request.generation_config, Some(generation()));
    }

    #[tokio::test]
    async fn send_does_not_record() {
        let provider = Arc::new(Recorder::default());
        let binding = ChatBinding::open(provider, Model::default(), "sys", generation())
            .await
            .unwrap();
        let _ = binding.send("question").await.unwrap();
        assert!(binding.history().is_empty());
    }
}
