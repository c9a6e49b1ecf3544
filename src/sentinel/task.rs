use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::ollama::GenerateRequest;
use crate::sentinel::payload::encode_image_file;

/// The four assessment workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    PlantHealth,
    EnvironmentalHazard,
    EmergencyTranslation,
    SpeciesIdentification,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::PlantHealth,
        TaskKind::EnvironmentalHazard,
        TaskKind::EmergencyTranslation,
        TaskKind::SpeciesIdentification,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlantHealth => "plant-health",
            Self::EnvironmentalHazard => "environmental-hazard",
            Self::EmergencyTranslation => "emergency-translation",
            Self::SpeciesIdentification => "species-identification",
        }
    }

    /// JSON field names the model is told to answer with.
    pub fn expected_fields(self) -> &'static [&'static str] {
        template(self).fields
    }

    pub fn needs_image(self) -> bool {
        !matches!(self, Self::EmergencyTranslation)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Template {
    body: &'static str,
    fields: &'static [&'static str],
}

const PLANT_HEALTH: Template = Template {
    body: "Analyze this plant image for health assessment:

1. Identify the plant species if possible
2. Detect any diseases, pests, or nutrient deficiencies
3. Assess overall plant health (scale 1-10)
4. Provide treatment recommendations
5. Suggest preventive measures

Additional context: {additional_info}",
    fields: &["species", "health_score", "issues", "treatments", "prevention"],
};

const ENVIRONMENTAL_HAZARD: Template = Template {
    body: "Analyze this environmental image for potential hazards:

1. Wildfire risk assessment (scale 1-10)
2. Flood risk indicators
3. Air quality visual indicators
4. Vegetation stress signs
5. Immediate safety concerns

Location context: {location}",
    fields: &[
        "wildfire_risk",
        "flood_risk",
        "air_quality",
        "vegetation_health",
        "safety_alerts",
    ],
};

const EMERGENCY_TRANSLATION: Template = Template {
    body: "Translate this emergency message to {target_language} and provide:

1. Accurate translation
2. Cultural context adjustments
3. Urgency level (1-5)
4. Recommended actions

Original message: {message}",
    fields: &["translation", "urgency", "actions", "cultural_notes"],
};

const SPECIES_IDENTIFICATION: Template = Template {
    body: "Identify the species in this image:

1. Species name (scientific and common)
2. Conservation status
3. Ecosystem role
4. Population trends
5. Conservation recommendations

Ecosystem context: {ecosystem_type}",
    fields: &[
        "species_name",
        "scientific_name",
        "conservation_status",
        "ecosystem_role",
        "recommendations",
    ],
};

fn template(kind: TaskKind) -> &'static Template {
    match kind {
        TaskKind::PlantHealth => &PLANT_HEALTH,
        TaskKind::EnvironmentalHazard => &ENVIRONMENTAL_HAZARD,
        TaskKind::EmergencyTranslation => &EMERGENCY_TRANSLATION,
        TaskKind::SpeciesIdentification => &SPECIES_IDENTIFICATION,
    }
}

/// One assessment to run. Image workflows always carry a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRequest {
    PlantHealth {
        image: PathBuf,
        additional_info: String,
    },
    EnvironmentalHazard {
        image: PathBuf,
        location: String,
    },
    EmergencyTranslation {
        message: String,
        target_language: String,
    },
    SpeciesIdentification {
        image: PathBuf,
        ecosystem_type: String,
    },
}

impl TaskRequest {
    pub fn plant_health(image: impl Into<PathBuf>, additional_info: impl Into<String>) -> Self {
        Self::PlantHealth {
            image: image.into(),
            additional_info: additional_info.into(),
        }
    }

    pub fn environmental_hazard(image: impl Into<PathBuf>, location: impl Into<String>) -> Self {
        Self::EnvironmentalHazard {
            image: image.into(),
            location: location.into(),
        }
    }

    pub fn emergency_translation(
        message: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Self {
        Self::EmergencyTranslation {
            message: message.into(),
            target_language: target_language.into(),
        }
    }

    pub fn species_identification(
        image: impl Into<PathBuf>,
        ecosystem_type: impl Into<String>,
    ) -> Self {
        Self::SpeciesIdentification {
            image: image.into(),
            ecosystem_type: ecosystem_type.into(),
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Self::PlantHealth { .. } => TaskKind::PlantHealth,
            Self::EnvironmentalHazard { .. } => TaskKind::EnvironmentalHazard,
            Self::EmergencyTranslation { .. } => TaskKind::EmergencyTranslation,
            Self::SpeciesIdentification { .. } => TaskKind::SpeciesIdentification,
        }
    }

    pub fn image(&self) -> Option<&Path> {
        match self {
            Self::PlantHealth { image, .. }
            | Self::EnvironmentalHazard { image, .. }
            | Self::SpeciesIdentification { image, .. } => Some(image.as_path()),
            Self::EmergencyTranslation { .. } => None,
        }
    }

    fn params(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::PlantHealth {
                additional_info, ..
            } => vec![("additional_info", additional_info.as_str())],
            Self::EnvironmentalHazard { location, .. } => vec![("location", location.as_str())],
            Self::EmergencyTranslation {
                message,
                target_language,
            } => vec![
                ("target_language", target_language.as_str()),
                ("message", message.as_str()),
            ],
            Self::SpeciesIdentification { ecosystem_type, .. } => {
                vec![("ecosystem_type", ecosystem_type.as_str())]
            }
        }
    }

    /// Renders the prompt text. Pure: no file access.
    pub fn prompt(&self) -> String {
        let template = template(self.kind());
        let mut prompt = render(template.body, &self.params());
        prompt.push_str("\n\nRespond with a JSON object using exactly these fields: ");
        prompt.push_str(&template.fields.join(", "));
        prompt
    }
}

/// Prompt plus the optional Base64 image, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltRequest {
    pub kind: TaskKind,
    pub prompt: String,
    pub image: Option<String>,
}

impl BuiltRequest {
    pub fn into_generate(self, model: &str) -> GenerateRequest {
        GenerateRequest {
            model: model.to_string(),
            prompt: self.prompt,
            images: self.image.map(|image| vec![image]),
            stream: false,
        }
    }
}

/// Renders the prompt and reads the image, if the workflow takes one.
///
/// Reading the image is the only fallible step.
pub fn build(request: &TaskRequest, normalize_images: bool) -> Result<BuiltRequest> {
    let image = request
        .image()
        .map(|path| encode_image_file(path, normalize_images))
        .transpose()?;

    Ok(BuiltRequest {
        kind: request.kind(),
        prompt: request.prompt(),
        image,
    })
}

/// Single-pass `{name}` substitution. Values are inserted verbatim and never
/// rescanned; unknown placeholders are left as written.
fn render(body: &str, params: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(body.len() + 64);
    let mut rest = body;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            params
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
