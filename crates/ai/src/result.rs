use serde::{Deserialize, Serialize};
use thiserror::Error;

use visionq_core::{Prediction, round_score};

/// Top-1 output of a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Predicted class name.
    #[serde(alias = "prediction", alias = "class_name")]
    pub label: String,

    /// Confidence in \[0, 1\], rounded to four decimals.
    #[serde(alias = "score")]
    pub confidence: f64,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence: round_score(confidence),
        }
    }

    /// Reject outputs that cannot be stored as a result entry.
    pub fn validate(self) -> Result<Self, InferenceError> {
        if self.label.trim().is_empty() {
            return Err(InferenceError::InvalidOutput("empty label".to_string()));
        }
        if !self.confidence.is_finite() {
            return Err(InferenceError::InvalidOutput(format!(
                "non-finite confidence {}",
                self.confidence
            )));
        }
        Ok(Self::new(self.label, self.confidence))
    }
}

impl From<Classification> for Prediction {
    fn from(value: Classification) -> Self {
        Prediction::success(value.label, value.confidence)
    }
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("invalid image input: {0}")]
    InvalidInput(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("classifier produced invalid output: {0}")]
    InvalidOutput(String),

    #[error("classifier timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_on_construction() {
        assert_eq!(Classification::new("dog", 0.923_06).confidence, 0.9231);
    }

    #[test]
    fn decodes_alternate_field_names() {
        let c: Classification =
            serde_json::from_str(r#"{"prediction": "cat", "score": 0.5}"#).unwrap();
        assert_eq!(c, Classification::new("cat", 0.5));
    }

    #[test]
    fn validate_rejects_bad_outputs() {
        assert!(Classification::new(" ", 0.3).validate().is_err());
        assert!(Classification::new("x", f64::NAN).validate().is_err());
        assert!(Classification::new("x", 0.3).validate().is_ok());
    }

    #[test]
    fn converts_to_successful_prediction() {
        let p: Prediction = Classification::new("dog", 0.9231).into();
        assert_eq!(p, Prediction::success("dog", 0.9231));
    }
}
