//! stride-providers — Feedback generator and translator integrations.
//!
//! Implements `FeedbackGenerator` for OpenAI and Anthropic, a prompt-based
//! `Translator` on top of any generator, offline stand-ins used when nothing
//! is configured, and mocks for tests.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod mock;
pub mod offline;
pub mod openai;
pub mod translator;

pub use config::{
    create_generator, create_translator, load_config, load_config_from, ProviderConfig,
    StrideConfig,
};
pub use error::ProviderError;
