//! Multimodal inference providers for the inkstone grading service.
//!
//! # Architecture
//!
//! - [`VisionProvider`] trait: one image + one prompt + a borrowed API key
//!   in, free-text critique out, blocking or token-streamed
//! - [`OpenAiCompatProvider`]: chat-completions format with SSE streaming,
//!   works against OpenAI and the many compatible relays
//! - [`AnthropicProvider`]: messages format (x-api-key header, base64 image
//!   source blocks)
//! - [`ProviderRegistry`]: explicit name-based selection at startup
//!
//! Credentials are leased per call by the dispatch layer and passed in as
//! arguments; providers hold no keys of their own.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod openai_compat;
pub mod provider;
pub mod registry;
pub mod sse;

pub use anthropic::AnthropicProvider;
pub use config::ProviderSettings;
pub use error::{ProviderError, Result};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{ImagePayload, VisionProvider};
pub use registry::ProviderRegistry;
