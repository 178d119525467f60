use crate::access::AccessPolicy;
use crate::error::ConfigLoadError;
use serde::{Deserialize, Serialize};

/// What a calculation token that names no known field evaluates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedReferencePolicy {
    /// Fail planning with `UnknownFieldReference`.
    #[default]
    Reject,
    /// Legacy behaviour: substitute the constant 0.
    Zero,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub access: AccessPolicy,
    pub unresolved_reference: UnresolvedReferencePolicy,
    /// Case-insensitive name fragments marking headcount-like fields whose
    /// SUM is rounded to an integer.
    pub integer_sum_markers: Vec<String>,
    /// Expose the low-level error text on generic (5xx) failures.
    pub development_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            access: AccessPolicy::default(),
            unresolved_reference: UnresolvedReferencePolicy::default(),
            integer_sum_markers: default_integer_sum_markers(),
            development_mode: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigLoadError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn is_integer_quantity(&self, field_name: &str) -> bool {
        let lowered = field_name.to_lowercase();
        self.integer_sum_markers
            .iter()
            .any(|marker| !marker.is_empty() && lowered.contains(&marker.to_lowercase()))
    }
}

fn default_integer_sum_markers() -> Vec<String> {
    ["count", "quantity", "qty", "数量", "尾数", "头数", "只数"]
        .into_iter()
        .map(str::to_string)
        .collect()
}
