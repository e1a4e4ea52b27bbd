//! A streaming urology assistant for the Gemini API.
//!
//! The crate is split into a thin API layer ([`Gemini`], [`types`], and SSE
//! decoding) and the [`chat`] application built on top of it.

// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod observability;
pub mod render;
pub mod sse;
pub mod types;

// Re-exports
pub use client::{API_KEY_ENV, Gemini, ModelProvider, ResponseStream};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use render::{
    INCOMPLETE_MARKER, IN_PROGRESS_MARKER, PlainTextRenderer, Renderer, render_history,
    render_streaming, until_interrupted,
};
pub use types::*;
