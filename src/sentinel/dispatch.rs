use std::path::Path;

use tracing::{debug, warn};

use crate::error::Result;
use crate::ollama::{ClientConfig, Inference};
use crate::sentinel::recovery::{Assessment, RecoveryMode, recover_with};
use crate::sentinel::task::{TaskRequest, build};

/// Default language for [`EcoSentinel::emergency_communication`].
pub const DEFAULT_TARGET_LANGUAGE: &str = "English";

/// Runs assessment workflows against one inference backend.
///
/// Configuration is fixed at construction and every call is a single
/// blocking request/response exchange.
#[derive(Debug, Clone)]
pub struct EcoSentinel<I> {
    config: ClientConfig,
    inference: I,
    recovery: RecoveryMode,
    normalize_images: bool,
}

impl<I: Inference> EcoSentinel<I> {
    pub fn new(config: ClientConfig, inference: I) -> Self {
        Self {
            config,
            inference,
            recovery: RecoveryMode::default(),
            normalize_images: false,
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryMode) -> Self {
        self.recovery = recovery;
        self
    }

    /// Re-encode every image as PNG before sending it.
    pub fn with_normalized_images(mut self, normalize: bool) -> Self {
        self.normalize_images = normalize;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn analyze_plant_health(
        &self,
        image_path: impl AsRef<Path>,
        additional_info: &str,
    ) -> Result<Assessment> {
        self.run(&TaskRequest::plant_health(
            image_path.as_ref(),
            additional_info,
        ))
    }

    pub fn assess_environmental_hazards(
        &self,
        image_path: impl AsRef<Path>,
        location: &str,
    ) -> Result<Assessment> {
        self.run(&TaskRequest::environmental_hazard(
            image_path.as_ref(),
            location,
        ))
    }

    pub fn emergency_communication(
        &self,
        message: &str,
        target_language: &str,
    ) -> Result<Assessment> {
        self.run(&TaskRequest::emergency_translation(
            message,
            target_language,
        ))
    }

    pub fn identify_species(
        &self,
        image_path: impl AsRef<Path>,
        ecosystem_type: &str,
    ) -> Result<Assessment> {
        self.run(&TaskRequest::species_identification(
            image_path.as_ref(),
            ecosystem_type,
        ))
    }

    /// Build, generate once, recover. Shared by every workflow.
    pub fn run(&self, request: &TaskRequest) -> Result<Assessment> {
        let kind = request.kind();
        let built = build(request, self.normalize_images)?;
        let generate = built.into_generate(&self.config.model);

        debug!(
            task = %kind,
            model = %generate.model,
            prompt_len = generate.prompt.len(),
            has_image = generate.images.is_some(),
            "running assessment"
        );

        let response = self.inference.generate(&generate)?;
        let assessment = recover_with(&response.response, self.recovery);

        if assessment.is_fallback() {
            warn!(
                task = %kind,
                recovery = self.recovery.as_str(),
                response_len = response.response.len(),
                "model output contained no parsable JSON object"
            );
        } else {
            debug!(task = %kind, "recovered structured assessment");
        }

        Ok(assessment)
    }
}
