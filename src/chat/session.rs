//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the transcript,
//! the active configuration, and at most one provider-side binding.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::chat::binding::ChatBinding;
use crate::chat::config::{BindingPolicy, ChatConfig, validate_max_tokens, validate_temperature};
use crate::chat::prompt::{SYSTEM_INSTRUCTION, compose_prompt};
use crate::chat::role::UserRole;
use crate::chat::transcript::Transcript;
use crate::client::ModelProvider;
use crate::error::Result;
use crate::observability::{SESSION_EXCHANGE_FAILURES, SESSION_EXCHANGES, SESSION_RESETS};
use crate::render::{Renderer, render_streaming, until_interrupted};
use crate::types::{Model, UsageMetadata};

/// How a generation parameter change was handled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParamsChange {
    /// The new values are in effect; no binding existed or nothing changed.
    Applied,
    /// The binding was dropped; the next exchange starts a new one.
    Rebound,
    /// The change is queued until the next reset.
    Deferred,
}

/// Summary of one completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeReport {
    /// Wall-clock time from submission to the last fragment.
    pub elapsed: Duration,
    /// Whitespace-separated word count of the answer.
    pub estimated_tokens: usize,
    /// Response length limit the answer was generated under.
    pub max_tokens: u32,
    /// Token accounting reported by the provider, when available.
    pub usage: Option<UsageMetadata>,
}

impl ExchangeReport {
    /// The one-line caption shown under an answer.
    pub fn caption(&self) -> String {
        format!(
            "Generated in {:.2}s | ~{} tokens | Max: {}",
            self.elapsed.as_secs_f64(),
            self.estimated_tokens,
            self.max_tokens
        )
    }
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// The model used for the session.
    pub model: Model,
    /// The active role.
    pub role: UserRole,
    /// The sampling temperature in effect.
    pub temperature: f32,
    /// The response length limit in effect.
    pub max_tokens: u32,
    /// The top-p value.
    pub top_p: f32,
    /// The top-k value.
    pub top_k: u32,
    /// The binding policy.
    pub binding_policy: BindingPolicy,
    /// Whether a provider-side binding is open.
    pub bound: bool,
    /// Queued temperature and max tokens awaiting a reset.
    pub pending: Option<(f32, u32)>,
    /// The number of messages in the transcript.
    pub message_count: usize,
    /// Exchanges completed since the session started.
    pub total_exchanges: u64,
    /// Exchanges that failed since the session started.
    pub failed_exchanges: u64,
    /// Prompt tokens reported by the provider across all exchanges.
    pub total_prompt_tokens: u64,
    /// Response tokens reported by the provider across all exchanges.
    pub total_response_tokens: u64,
    /// Provider usage for the last exchange, if reported.
    pub last_exchange_usage: Option<UsageMetadata>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct PendingParams {
    temperature: f32,
    max_tokens: u32,
}

/// A chat session that manages conversation state and API interactions.
///
/// The session owns one transcript and at most one binding. The binding is
/// opened lazily by the first exchange and replaced according to the
/// configured [`BindingPolicy`] when generation parameters change.
pub struct ChatSession<P: ModelProvider> {
    provider: Arc<P>,
    config: ChatConfig,
    binding: Option<ChatBinding<P>>,
    pending: Option<PendingParams>,
    transcript: Transcript,
    exchanges: u64,
    failures: u64,
    prompt_tokens: u64,
    response_tokens: u64,
    last_usage: Option<UsageMetadata>,
}

impl<P: ModelProvider> ChatSession<P> {
    /// Creates a new chat session with the given provider and configuration.
    pub fn new(provider: Arc<P>, config: ChatConfig) -> Self {
        Self {
            provider,
            config,
            binding: None,
            pending: None,
            transcript: Transcript::new(),
            exchanges: 0,
            failures: 0,
            prompt_tokens: 0,
            response_tokens: 0,
            last_usage: None,
        }
    }

    /// Sends a query and streams the answer through the renderer.
    ///
    /// This method:
    /// 1. Opens a binding if none exists
    /// 2. Composes the prompt for the active role
    /// 3. Renders fragments as they arrive
    /// 4. Records the exchange in the binding and the transcript
    ///
    /// Nothing is recorded unless the answer streams to completion. A user
    /// interrupt resets the session, including one raised while the model
    /// check or the request is still waiting on the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding cannot be opened or the stream fails.
    pub async fn send_streaming(
        &mut self,
        query: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<ExchangeReport> {
        let started = Instant::now();
        match self.exchange(query, renderer, started).await {
            Ok(report) => {
                SESSION_EXCHANGES.click();
                self.exchanges += 1;
                tracing::debug!(
                    elapsed = report.elapsed.as_secs_f64(),
                    words = report.estimated_tokens,
                    "exchange complete"
                );
                Ok(report)
            }
            Err(err) => {
                SESSION_EXCHANGE_FAILURES.click();
                self.failures += 1;
                tracing::warn!(error = %err, "exchange failed");
                if err.is_abort() {
                    self.reset();
                }
                Err(err)
            }
        }
    }

    async fn exchange(
        &mut self,
        query: &str,
        renderer: &mut dyn Renderer,
        started: Instant,
    ) -> Result<ExchangeReport> {
        let binding = match self.binding.take() {
            Some(binding) => binding,
            None => {
                let opening = ChatBinding::open(
                    Arc::clone(&self.provider),
                    self.config.model.clone(),
                    SYSTEM_INSTRUCTION,
                    self.config.generation_config(),
                );
                until_interrupted(opening, renderer).await??
            }
        };
        let binding = self.binding.insert(binding);

        let prompt = compose_prompt(self.config.role, query);
        let mut reply = until_interrupted(binding.send(&prompt), renderer).await??;
        let text = render_streaming(&mut reply, renderer).await?;
        let usage = reply.usage();
        let max_tokens = binding
            .generation_config()
            .max_output_tokens
            .unwrap_or(self.config.max_tokens);

        binding.commit(prompt, text.as_str());
        self.append_exchange(query, text.as_str());
        if let Some(usage) = usage {
            self.prompt_tokens += u64::from(usage.prompt_token_count);
            self.response_tokens += u64::from(usage.candidates_token_count);
        }
        self.last_usage = usage;

        let report = ExchangeReport {
            elapsed: started.elapsed(),
            estimated_tokens: text.split_whitespace().count(),
            max_tokens,
            usage,
        };
        renderer.print_caption(&report.caption());
        Ok(report)
    }

    /// Appends a completed exchange to the transcript.
    pub fn append_exchange(&mut self, user_text: &str, assistant_text: &str) {
        self.transcript.push_exchange(user_text, assistant_text);
    }

    /// Changes the role used for the next composed prompt.
    pub fn apply_role_change(&mut self, role: UserRole) {
        self.config.role = role;
    }

    /// Changes temperature and response length.
    ///
    /// # Errors
    ///
    /// Returns a validation error if either value is out of range; nothing
    /// changes in that case.
    pub fn apply_generation_params(
        &mut self,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<ParamsChange> {
        validate_temperature(temperature)?;
        validate_max_tokens(max_tokens)?;

        let unchanged =
            self.config.temperature == temperature && self.config.max_tokens == max_tokens;
        if self.binding.is_none() || unchanged {
            self.config.temperature = temperature;
            self.config.max_tokens = max_tokens;
            self.pending = None;
            return Ok(ParamsChange::Applied);
        }

        match self.config.binding_policy {
            BindingPolicy::Rebuild => {
                self.config.temperature = temperature;
                self.config.max_tokens = max_tokens;
                self.binding = None;
                tracing::info!(temperature, max_tokens, "dropped chat binding after parameter change");
                Ok(ParamsChange::Rebound)
            }
            BindingPolicy::Defer => {
                self.pending = Some(PendingParams {
                    temperature,
                    max_tokens,
                });
                tracing::info!(temperature, max_tokens, "deferred parameter change until reset");
                Ok(ParamsChange::Deferred)
            }
        }
    }

    /// Changes the temperature, keeping the requested response length.
    pub fn set_temperature(&mut self, temperature: f32) -> Result<ParamsChange> {
        let (_, max_tokens) = self.requested_params();
        self.apply_generation_params(temperature, max_tokens)
    }

    /// Changes the response length, keeping the requested temperature.
    pub fn set_max_tokens(&mut self, max_tokens: u32) -> Result<ParamsChange> {
        let (temperature, _) = self.requested_params();
        self.apply_generation_params(temperature, max_tokens)
    }

    /// The most recently requested temperature and response length, whether
    /// in effect or queued.
    pub fn requested_params(&self) -> (f32, u32) {
        match self.pending {
            Some(pending) => (pending.temperature, pending.max_tokens),
            None => (self.config.temperature, self.config.max_tokens),
        }
    }

    /// Clears the transcript and the binding and applies any queued change.
    pub fn reset(&mut self) {
        SESSION_RESETS.click();
        self.transcript.clear();
        self.binding = None;
        if let Some(pending) = self.pending.take() {
            self.config.temperature = pending.temperature;
            self.config.max_tokens = pending.max_tokens;
        }
        tracing::info!("session reset");
    }

    /// Returns the transcript.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Returns the number of messages in the transcript.
    pub fn message_count(&self) -> usize {
        self.transcript.len()
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Returns the active role.
    pub fn role(&self) -> UserRole {
        self.config.role
    }

    /// Returns true if a provider-side binding is open.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Number of turns in the provider-side history.
    pub fn binding_history_len(&self) -> usize {
        self.binding
            .as_ref()
            .map(|binding| binding.history().len())
            .unwrap_or(0)
    }

    /// Returns true if a parameter change is waiting for a reset.
    pub fn has_pending_change(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model: self.config.model.clone(),
            role: self.config.role,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
            top_k: self.config.top_k,
            binding_policy: self.config.binding_policy,
            bound: self.is_bound(),
            pending: self
                .pending
                .map(|pending| (pending.temperature, pending.max_tokens)),
            message_count: self.message_count(),
            total_exchanges: self.exchanges,
            failed_exchanges: self.failures,
            total_prompt_tokens: self.prompt_tokens,
            total_response_tokens: self.response_tokens,
            last_exchange_usage: self.last_usage,
        }
    }
}
