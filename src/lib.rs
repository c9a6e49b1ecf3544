//! Structured environmental assessments from a multimodal language model.
//!
//! [`sentinel::EcoSentinel`] turns one of four fixed workflows into a prompt,
//! sends it to an Ollama-compatible endpoint and recovers a JSON object from
//! the reply, falling back to the raw text when the model does not comply.

/// CLI subcommand implementations.
pub mod commands;
/// Profile configuration file loading.
pub mod config;
/// Pipeline error types.
pub mod error;
/// Tracing subscriber setup.
pub mod logging;
/// Inference endpoint client.
pub mod ollama;
/// Assessment workflows.
pub mod sentinel;

pub use error::{Result, SentinelError};
pub use ollama::{ClientConfig, Inference, OllamaClient};
pub use sentinel::{Assessment, EcoSentinel, RecoveryMode, TaskKind, TaskRequest};
