//! Chat application module for the urology assistant.
//!
//! This module provides a streaming REPL chat interface built on top of the
//! Gemini client. It supports:
//!
//! - Streaming answers with a live in-progress marker
//! - Role-aware prompt composition
//! - Slash commands for session control
//! - Configurable temperature, response length, and model
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`role`] and [`prompt`]: who is asking and how questions are wrapped
//! - [`config`]: CLI argument parsing and configuration
//! - [`binding`] and [`stream`]: the provider-side conversation and its
//!   answer stream
//! - [`transcript`]: the locally displayed conversation
//! - [`session`]: ties the above together for one user
//! - [`commands`]: slash command parsing

pub mod binding;
pub mod commands;
pub mod config;
pub mod prompt;
pub mod role;
pub mod session;
pub mod stream;
pub mod transcript;

pub use crate::render::{PlainTextRenderer, Renderer, render_history, render_streaming};
pub use binding::ChatBinding;
pub use commands::{ChatCommand, about_text, help_text, parse_command};
pub use config::{BindingPolicy, ChatArgs, ChatConfig, ConfigFile};
pub use prompt::{SYSTEM_INSTRUCTION, compose_prompt, input_hint};
pub use role::{UserRole, UserRoleParseError};
pub use session::{ChatSession, ExchangeReport, ParamsChange, SessionStats};
pub use stream::{ReplyStream, TextFragment};
pub use transcript::{Author, Message, Transcript};
