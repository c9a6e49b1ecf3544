//! Inference endpoint integration.
//!
//! The module holds the collaborator trait the assessment pipeline depends on
//! and the blocking HTTP client that speaks the Ollama generate API.

/// Generate-endpoint client, wire types and errors.
pub mod client;

pub use client::{
    ClientConfig, DEFAULT_HOST, DEFAULT_MODEL, GenerateRequest, GenerateResponse, Inference,
    InferenceError, OllamaClient,
};
