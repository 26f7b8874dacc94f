//! Upload-and-classify in one call: the front-end flow behind `predict`.

use serde::Serialize;
use tracing::{info, instrument};

use visionq_core::{ArtifactName, Prediction, is_supported_image};
use visionq_queue::{JobQueue, ResultStore};

use crate::dispatcher::{DispatchError, Dispatcher};
use crate::uploads::{ArtifactError, UploadStore};

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("unsupported file type: {filename} (expected png, jpg, jpeg or gif)")]
    UnsupportedFile { filename: String },

    #[error(transparent)]
    Upload(#[from] ArtifactError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl PredictError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PredictError::Dispatch(e) if e.is_timeout())
    }
}

/// What the front-end reports back for one upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub prediction: Option<String>,
    pub score: Option<f64>,
    pub image_file_name: String,
}

impl PredictResponse {
    fn new(name: &ArtifactName, prediction: Prediction) -> Self {
        Self {
            success: !prediction.is_error(),
            prediction: prediction.prediction,
            score: prediction.score,
            image_file_name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PredictionService<Q, S> {
    uploads: UploadStore,
    dispatcher: Dispatcher<Q, S>,
}

impl<Q, S> PredictionService<Q, S>
where
    Q: JobQueue,
    S: ResultStore,
{
    pub fn new(uploads: UploadStore, dispatcher: Dispatcher<Q, S>) -> Self {
        Self {
            uploads,
            dispatcher,
        }
    }

    /// Store `content`, enqueue a job for it and wait for the prediction.
    ///
    /// A worker-side failure comes back as `success: false` with the error
    /// sentinel, not as `Err`.
    #[instrument(skip(self, content), fields(bytes = content.len()), err)]
    pub fn predict(&self, filename: &str, content: &[u8]) -> Result<PredictResponse, PredictError> {
        if !is_supported_image(filename) {
            return Err(PredictError::UnsupportedFile {
                filename: filename.to_string(),
            });
        }

        let name = self.uploads.put(filename, content)?;
        let prediction = self.dispatcher.dispatch(name.as_str())?;
        info!(
            image_name = %name,
            prediction = ?prediction.prediction,
            score = ?prediction.score,
            "prediction ready"
        );

        Ok(PredictResponse::new(&name, prediction))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use visionq_queue::{InMemoryJobQueue, InMemoryResultStore};

    use super::*;
    use crate::dispatcher::DispatcherConfig;
    use crate::uploads::InMemoryArtifactStore;

    type MemService = PredictionService<Arc<InMemoryJobQueue>, Arc<InMemoryResultStore>>;

    fn service(timeout: Duration) -> (Arc<InMemoryJobQueue>, MemService) {
        let queue = Arc::new(InMemoryJobQueue::new());
        let dispatcher = Dispatcher::new(
            queue.clone(),
            Arc::new(InMemoryResultStore::new()),
            DispatcherConfig {
                poll_interval: Duration::from_millis(5),
                poll_timeout: timeout,
            },
        );
        let uploads = UploadStore::new(Arc::new(InMemoryArtifactStore::new()));
        (queue, PredictionService::new(uploads, dispatcher))
    }

    #[test]
    fn rejects_unsupported_extension_before_storing() {
        let (queue, svc) = service(Duration::ZERO);
        let err = svc.predict("notes.txt", b"hello").unwrap_err();

        assert!(matches!(err, PredictError::UnsupportedFile { .. }));
        assert!(!err.is_timeout());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn timeout_is_reported_as_such() {
        let (queue, svc) = service(Duration::from_millis(20));
        let err = svc.predict("dog.png", b"pixels").unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn response_marks_sentinel_as_unsuccessful() {
        let name = ArtifactName::for_content("a.jpg", b"x");
        let response = PredictResponse::new(&name, Prediction::failure());
        assert!(!response.success);
        assert_eq!(response.prediction.as_deref(), Some("error"));
        assert_eq!(response.score, Some(0.0));

        let cat = PredictResponse::new(&name, Prediction::success("cat", 0.5));
        let json = serde_json::to_value(cat).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["prediction"], "cat");
        assert_eq!(json["image_file_name"], name.as_str());
    }
}
