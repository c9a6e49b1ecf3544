//! Assessment workflows: prompt construction, dispatch and response recovery.

/// Workflow entry points over an inference backend.
pub mod dispatch;
/// Image file reading and Base64 payload encoding.
pub mod payload;
/// JSON recovery from free-form model output.
pub mod recovery;
/// Task kinds, prompt templates and request building.
pub mod task;

pub use dispatch::{DEFAULT_TARGET_LANGUAGE, EcoSentinel};
pub use recovery::{Assessment, RecoveryMode, recover, recover_with};
pub use task::{BuiltRequest, TaskKind, TaskRequest, build};
