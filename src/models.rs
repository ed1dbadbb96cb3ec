use serde::{Deserialize, Serialize};

use crate::preprocess::InputSpec;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Cat,
    Loaf,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Cat => "cat",
            Label::Loaf => "loaf",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a successful classification. `confidence` is a percentage
/// rounded to two decimals.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionResponse {
    pub label: Label,
    pub confidence: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub input: InputSpec,
}
