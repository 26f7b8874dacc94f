use std::sync::Arc;

use crate::result::{Classification, InferenceError};

/// Opaque image classifier.
///
/// Implementations must be shareable across worker threads. A call may be
/// slow (model inference); it must not panic on bad input but return
/// [`InferenceError`] instead.
pub trait Classifier: Send + Sync + 'static {
    fn classify(&self, image: &[u8]) -> Result<Classification, InferenceError>;
}

impl<C> Classifier for Arc<C>
where
    C: Classifier + ?Sized,
{
    fn classify(&self, image: &[u8]) -> Result<Classification, InferenceError> {
        (**self).classify(image)
    }
}

/// Adapter turning a closure into a [`Classifier`] (embedding, tests).
pub struct FnClassifier<F>(F);

impl<F> FnClassifier<F>
where
    F: Fn(&[u8]) -> Result<Classification, InferenceError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Classifier for FnClassifier<F>
where
    F: Fn(&[u8]) -> Result<Classification, InferenceError> + Send + Sync + 'static,
{
    fn classify(&self, image: &[u8]) -> Result<Classification, InferenceError> {
        (self.0)(image)
    }
}

impl<F> core::fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnClassifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_classifier() {
        let c = FnClassifier::new(|bytes: &[u8]| {
            if bytes.is_empty() {
                Err(InferenceError::InvalidInput("empty".into()))
            } else {
                Ok(Classification::new("blob", bytes.len() as f64 / 10.0))
            }
        });

        assert_eq!(c.classify(b"abc").unwrap().confidence, 0.3);
        assert!(matches!(c.classify(b""), Err(InferenceError::InvalidInput(_))));

        let shared: Arc<dyn Classifier> = Arc::new(c);
        assert_eq!(shared.classify(b"a").unwrap().label, "blob");
    }
}
