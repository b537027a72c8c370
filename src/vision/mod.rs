//! Food recognition.
//!
//! `FoodRecognizer` owns the process-wide classifier handle. The handle is
//! produced by a `ClassifierLoader` the first time a photo needs it; runs that
//! race on first use all wait for that single load. A failed load leaves the
//! handle empty so a later run can try again; a successful one is kept for
//! the life of the recognizer.

pub mod huggingface;
pub mod normalize;

pub use huggingface::{HuggingFaceClassifier, HuggingFaceLoader};
pub use normalize::ImageNormalizer;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::ClassifierError;
use crate::pipeline::asset::ImageAsset;
use crate::pipeline::types::FoodLabel;

/// One raw candidate from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

/// A loaded image classifier. Read-only once built.
#[async_trait]
pub trait FoodClassifier: Send + Sync {
    /// Model identifier for logging.
    fn model_name(&self) -> &str;

    /// Classify an encoded image, returning at most `top_k` candidates.
    async fn classify(
        &self,
        image: &[u8],
        top_k: usize,
    ) -> Result<Vec<Prediction>, ClassifierError>;
}

/// Builds the classifier. Called at most once per successful load.
#[async_trait]
pub trait ClassifierLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn FoodClassifier>, ClassifierError>;
}

/// Photo in, ordered food labels out.
pub struct FoodRecognizer {
    loader: Box<dyn ClassifierLoader>,
    handle: OnceCell<Arc<dyn FoodClassifier>>,
    normalizer: ImageNormalizer,
    top_k: usize,
}

impl FoodRecognizer {
    pub fn new(
        loader: Box<dyn ClassifierLoader>,
        normalizer: ImageNormalizer,
        top_k: usize,
    ) -> Self {
        Self {
            loader,
            handle: OnceCell::new(),
            normalizer,
            top_k,
        }
    }

    /// Whether the classifier has been loaded yet.
    pub fn is_loaded(&self) -> bool {
        self.handle.initialized()
    }

    async fn classifier(&self) -> Result<&Arc<dyn FoodClassifier>, ClassifierError> {
        self.handle
            .get_or_try_init(|| async {
                info!("Loading food classifier");
                let classifier = self.loader.load().await?;
                info!(model = classifier.model_name(), "Food classifier ready");
                Ok::<_, ClassifierError>(classifier)
            })
            .await
    }

    /// Labels for the photo, highest confidence first, at most `top_k`.
    pub async fn recognize(&self, asset: &ImageAsset) -> Result<Vec<FoodLabel>, ClassifierError> {
        let classifier = self.classifier().await?;

        let raw = asset.read().await?;
        let normalized = self.normalizer.normalize(raw).await?;
        let predictions = classifier.classify(&normalized, self.top_k).await?;

        let labels = rank_labels(predictions, self.top_k);
        debug!(
            model = classifier.model_name(),
            labels = ?labels.iter().map(FoodLabel::as_str).collect::<Vec<_>>(),
            "Classified photo"
        );
        Ok(labels)
    }
}

/// Sort by descending score, keep `top_k`, normalize, drop empty labels.
fn rank_labels(mut predictions: Vec<Prediction>, top_k: usize) -> Vec<FoodLabel> {
    predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
    predictions
        .into_iter()
        .take(top_k)
        .map(|p| FoodLabel::normalize(&p.label))
        .filter(|label| !label.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use image::{DynamicImage, ImageFormat, RgbImage};

    use super::*;
    use crate::pipeline::asset::ScratchDir;

    struct FixedClassifier {
        predictions: Vec<Prediction>,
    }

    #[async_trait]
    impl FoodClassifier for FixedClassifier {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn classify(
            &self,
            image: &[u8],
            top_k: usize,
        ) -> Result<Vec<Prediction>, ClassifierError> {
            assert_eq!(image::guess_format(image).unwrap(), ImageFormat::Jpeg);
            Ok(self.predictions.iter().take(top_k).cloned().collect())
        }
    }

    /// Counts loads; optionally fails the first `fail_first` attempts.
    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        fail_first: usize,
        delay: Duration,
    }

    #[async_trait]
    impl ClassifierLoader for CountingLoader {
        async fn load(&self) -> Result<Arc<dyn FoodClassifier>, ClassifierError> {
            let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if attempt < self.fail_first {
                return Err(ClassifierError::Load {
                    model: "fixed".into(),
                    reason: "weights missing".into(),
                });
            }
            Ok(Arc::new(FixedClassifier {
                predictions: vec![
                    Prediction {
                        label: "sushi".into(),
                        score: 0.2,
                    },
                    Prediction {
                        label: "fried_rice".into(),
                        score: 0.7,
                    },
                    Prediction {
                        label: "Spring_Rolls".into(),
                        score: 0.1,
                    },
                ],
            }))
        }
    }

    fn recognizer(loads: Arc<AtomicUsize>, fail_first: usize) -> FoodRecognizer {
        FoodRecognizer::new(
            Box::new(CountingLoader {
                loads,
                fail_first,
                delay: Duration::from_millis(50),
            }),
            ImageNormalizer::new(384, 80),
            5,
        )
    }

    fn photo_bytes() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(64, 48))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn rank_orders_by_score_and_truncates() {
        let predictions = vec![
            Prediction {
                label: "a".into(),
                score: 0.1,
            },
            Prediction {
                label: "b".into(),
                score: 0.9,
            },
            Prediction {
                label: "c_d".into(),
                score: 0.5,
            },
        ];
        let labels = rank_labels(predictions, 2);
        assert_eq!(
            labels,
            vec![FoodLabel::normalize("b"), FoodLabel::normalize("c d")]
        );
    }

    #[tokio::test]
    async fn recognize_returns_normalized_labels_in_confidence_order() {
        let scratch = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(scratch.path());
        let asset = scratch.store(photo_bytes(), "image/png").await.unwrap();

        let recognizer = recognizer(Arc::new(AtomicUsize::new(0)), 0);
        let labels = recognizer.recognize(&asset).await.unwrap();
        let labels: Vec<&str> = labels.iter().map(FoodLabel::as_str).collect();
        assert_eq!(labels, vec!["fried rice", "sushi", "spring rolls"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_first_use_loads_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path());
        let first = scratch.store(photo_bytes(), "image/png").await.unwrap();
        let second = scratch.store(photo_bytes(), "image/png").await.unwrap();

        let loads = Arc::new(AtomicUsize::new(0));
        let recognizer = Arc::new(recognizer(Arc::clone(&loads), 0));

        let (a, b) = tokio::join!(
            {
                let r = Arc::clone(&recognizer);
                async move { r.recognize(&first).await }
            },
            {
                let r = Arc::clone(&recognizer);
                async move { r.recognize(&second).await }
            }
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(recognizer.is_loaded());
    }

    #[tokio::test]
    async fn failed_load_is_retried_then_kept() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path());
        let asset = scratch.store(photo_bytes(), "image/png").await.unwrap();

        let loads = Arc::new(AtomicUsize::new(0));
        let recognizer = recognizer(Arc::clone(&loads), 1);

        let err = recognizer.recognize(&asset).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Load { .. }));
        assert!(!recognizer.is_loaded());

        assert!(recognizer.recognize(&asset).await.is_ok());
        assert!(recognizer.recognize(&asset).await.is_ok());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn undecodable_photo_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path());
        let asset = scratch.store(b"GIF89a broken".to_vec(), "image/gif").await.unwrap();

        let recognizer = recognizer(Arc::new(AtomicUsize::new(0)), 0);
        let err = recognizer.recognize(&asset).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Decode(_)));
    }
}
