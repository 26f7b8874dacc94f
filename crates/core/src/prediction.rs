//! Result entries written by workers and consumed by dispatchers.

use serde::{Deserialize, Serialize};

use crate::error::DomainResult;

/// Label written by a worker when a job could not be classified.
pub const ERROR_LABEL: &str = "error";

/// Number of decimal places kept on confidence scores.
pub const SCORE_DECIMALS: i32 = 4;

/// Outcome recorded alongside a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Ok,
    Error,
}

/// A completed job output.
///
/// Wire form: `{"prediction": "<label>", "score": <number>, "status": "ok"}`.
/// Entries written by older workers have no `status`; it is inferred from the
/// `("error", 0.0)` sentinel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub prediction: Option<String>,
    pub score: Option<f64>,
    pub status: PredictionStatus,
}

#[derive(Deserialize)]
struct WireResult {
    #[serde(default)]
    prediction: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    status: Option<PredictionStatus>,
}

impl Prediction {
    /// A successful classification. The score is rounded to
    /// [`SCORE_DECIMALS`] places.
    pub fn success(label: impl Into<String>, score: f64) -> Self {
        Self {
            prediction: Some(label.into()),
            score: Some(round_score(score)),
            status: PredictionStatus::Ok,
        }
    }

    /// The terminal sentinel written when a job fails.
    pub fn failure() -> Self {
        Self {
            prediction: Some(ERROR_LABEL.to_string()),
            score: Some(0.0),
            status: PredictionStatus::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == PredictionStatus::Error
    }

    pub fn label(&self) -> Option<&str> {
        self.prediction.as_deref()
    }

    pub fn encode(&self) -> DomainResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> DomainResult<Self> {
        let wire: WireResult = serde_json::from_str(raw)?;
        let status = wire.status.unwrap_or_else(|| {
            let sentinel = wire.prediction.as_deref() == Some(ERROR_LABEL)
                && wire.score.is_none_or(|s| s == 0.0);
            if sentinel {
                PredictionStatus::Error
            } else {
                PredictionStatus::Ok
            }
        });
        Ok(Self {
            prediction: wire.prediction,
            score: wire.score,
            status,
        })
    }
}

/// Round a confidence to [`SCORE_DECIMALS`] places.
pub fn round_score(score: f64) -> f64 {
    if !score.is_finite() {
        return score;
    }
    let factor = 10f64.powi(SCORE_DECIMALS);
    (score * factor).round() / factor
}
