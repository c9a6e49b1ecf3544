//! Recovery of a JSON object from free-form model output.
//!
//! Models asked for "JSON only" still wrap answers in prose or markdown
//! fences, or stop mid-object. [`recover`] never fails: whatever cannot be
//! parsed is handed back as [`Assessment::RawFallback`].

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::sentinel::task::TaskKind;

/// Result record of one assessment.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// The JSON object the model returned.
    Structured(Map<String, Value>),
    /// Full model text, returned when no object could be recovered.
    RawFallback(String),
}

impl Assessment {
    /// Key under which fallback text appears in the mapping form.
    pub const FALLBACK_KEY: &'static str = "raw_response";

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::RawFallback(_))
    }

    pub fn fields(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Structured(fields) => Some(fields),
            Self::RawFallback(_) => None,
        }
    }

    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::Structured(_) => None,
            Self::RawFallback(text) => Some(text),
        }
    }

    /// Looks up a structured field. Always `None` for a fallback.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields().and_then(|fields| fields.get(key))
    }

    /// Expected fields of `kind` that the record does not carry.
    pub fn missing_fields(&self, kind: TaskKind) -> Vec<&'static str> {
        kind.expected_fields()
            .iter()
            .copied()
            .filter(|field| self.get(field).is_none())
            .collect()
    }

    /// Mapping form: the object itself, or `{"raw_response": text}`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Structured(fields) => Value::Object(fields.clone()),
            Self::RawFallback(text) => {
                let mut map = Map::new();
                map.insert(Self::FALLBACK_KEY.to_string(), Value::String(text.clone()));
                Value::Object(map)
            }
        }
    }
}

impl Serialize for Assessment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Structured(fields) => fields.serialize(serializer),
            Self::RawFallback(text) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(Self::FALLBACK_KEY, text)?;
                map.end()
            }
        }
    }
}

/// How candidate JSON spans are located in the model text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecoveryMode {
    /// One span from the first `{` to the last `}`.
    #[default]
    Naive,
    /// Every brace-balanced `{...}` span in order; the first that parses wins.
    Balanced,
}

impl RecoveryMode {
    pub const SUPPORTED: &'static str = "naive, balanced";

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Balanced => "balanced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "naive" => Some(Self::Naive),
            "balanced" => Some(Self::Balanced),
            _ => None,
        }
    }
}

/// Recovers with the default [`RecoveryMode::Naive`] strategy.
pub fn recover(text: &str) -> Assessment {
    recover_with(text, RecoveryMode::Naive)
}

pub fn recover_with(text: &str, mode: RecoveryMode) -> Assessment {
    let object = match mode {
        RecoveryMode::Naive => naive_object(text),
        RecoveryMode::Balanced => balanced_object(text),
    };
    match object {
        Some(fields) => Assessment::Structured(fields),
        None => Assessment::RawFallback(text.to_string()),
    }
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    serde_json::from_str(candidate).ok()
}

fn naive_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    parse_object(&text[start..=end])
}

fn balanced_object(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{')
        .filter_map(|(start, _)| balanced_end(text, start).map(|end| (start, end)))
        .find_map(|(start, end)| parse_object(&text[start..=end]))
}

/// Byte index of the `}` closing the `{` at `start`, skipping braces inside
/// JSON string literals.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}
