use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::types::*;
use crate::error_handling::types::ClassifierError;

/// A pre-trained classification capability.
///
/// Implementations are read-only once loaded and may be called from several threads at
/// once. `predict` may block; the adapter never calls it on an async worker.
pub trait Classifier: Send + Sync {
    fn predict(&self, vector: &FeatureVector) -> Result<Prediction, ClassifierError>;
}

pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Bounds and sanitizes calls into an optional [`Classifier`].
///
/// Every failure mode (no model, model error, non-finite input, panic, budget exceeded)
/// comes back as [`ClassifierOutcome::Abstain`].
///
/// A prediction holds one of `max_concurrent` slots until its blocking thread returns,
/// even after the caller gave up on it. With every slot taken the adapter abstains at
/// once, so a stalled model cannot pile calls onto the blocking pool.
#[derive(Clone)]
pub struct ClassifierAdapter {
    inner: Option<Arc<dyn Classifier>>,
    budget: Duration,
    slots: Arc<Semaphore>,
}

impl ClassifierAdapter {
    pub fn new(inner: Arc<dyn Classifier>, budget: Duration) -> Self {
        Self {
            inner: Some(inner),
            budget,
            slots: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT)),
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.slots = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    /// An adapter without a model, always abstains.
    pub fn disabled() -> Self {
        Self {
            inner: None,
            budget: Duration::ZERO,
            slots: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    pub async fn predict(&self, vector: FeatureVector) -> ClassifierOutcome {
        let classifier = match &self.inner {
            Some(c) => c.clone(),
            None => return ClassifierOutcome::Abstain(AbstainReason::NoModel),
        };
        if !vector.is_finite() {
            return ClassifierOutcome::Abstain(AbstainReason::Failed(
                "non-finite feature vector".to_string(),
            ));
        }

        let slot = match self.slots.clone().try_acquire_owned() {
            Ok(slot) => slot,
            Err(_) => {
                debug!("Classifier busy, abstaining");
                return ClassifierOutcome::Abstain(AbstainReason::Busy);
            }
        };
        // The blocking task keeps running after a timeout; its result is dropped.
        let task = tokio::task::spawn_blocking(move || {
            let _slot = slot;
            classifier.predict(&vector)
        });
        match tokio::time::timeout(self.budget, task).await {
            Err(_) => {
                debug!("Classifier exceeded its {:?} budget", self.budget);
                ClassifierOutcome::Abstain(AbstainReason::Timeout)
            }
            Ok(Err(join_err)) => {
                warn!("Classifier task failed: {}", join_err);
                ClassifierOutcome::Abstain(AbstainReason::Failed(join_err.to_string()))
            }
            Ok(Ok(Err(e))) => {
                debug!("Classifier abstained: {}", e);
                ClassifierOutcome::Abstain(AbstainReason::Failed(e.to_string()))
            }
            Ok(Ok(Ok(prediction))) => {
                if !(0.0..=1.0).contains(&prediction.confidence) {
                    return ClassifierOutcome::Abstain(AbstainReason::Failed(format!(
                        "confidence {} outside [0, 1]",
                        prediction.confidence
                    )));
                }
                ClassifierOutcome::Predicted(prediction)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_classifiers {
    use super::*;

    /// Returns the same prediction for every vector.
    pub struct FixedClassifier(pub Prediction);

    impl Classifier for FixedClassifier {
        fn predict(&self, _vector: &FeatureVector) -> Result<Prediction, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    pub struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn predict(&self, _vector: &FeatureVector) -> Result<Prediction, ClassifierError> {
            Err(ClassifierError::PredictionFailed("model crashed".to_string()))
        }
    }

    pub struct SlowClassifier(pub Duration);

    impl Classifier for SlowClassifier {
        fn predict(&self, _vector: &FeatureVector) -> Result<Prediction, ClassifierError> {
            std::thread::sleep(self.0);
            Ok(malicious("DOS", 0.99))
        }
    }

    pub struct PanickingClassifier;

    impl Classifier for PanickingClassifier {
        fn predict(&self, _vector: &FeatureVector) -> Result<Prediction, ClassifierError> {
            panic!("index out of bounds in model");
        }
    }

    pub fn malicious(label: &str, confidence: f64) -> Prediction {
        Prediction {
            is_malicious: true,
            class_label: label.to_string(),
            confidence,
        }
    }
}
