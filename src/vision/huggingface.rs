//! Hugging Face hosted image classification.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::ClassifierError;
use crate::vision::{ClassifierLoader, FoodClassifier, Prediction};

pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";
pub const DEFAULT_INFERENCE_URL: &str = "https://router.huggingface.co/hf-inference";

const EXPECTED_PIPELINE_TAG: &str = "image-classification";

/// Verifies the model on the Hub and hands out an inference client for it.
pub struct HuggingFaceLoader {
    model: String,
    api_token: Option<SecretString>,
    hub_url: String,
    inference_url: String,
    client: reqwest::Client,
}

impl HuggingFaceLoader {
    pub fn new(model: impl Into<String>, api_token: Option<SecretString>) -> Self {
        Self {
            model: model.into(),
            api_token,
            hub_url: DEFAULT_HUB_URL.to_string(),
            inference_url: DEFAULT_INFERENCE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at different Hub / inference hosts.
    pub fn with_endpoints(
        mut self,
        hub_url: impl Into<String>,
        inference_url: impl Into<String>,
    ) -> Self {
        self.hub_url = hub_url.into();
        self.inference_url = inference_url.into();
        self
    }

    fn model_info_url(&self) -> String {
        format!("{}/api/models/{}", self.hub_url.trim_end_matches('/'), self.model)
    }

    fn load_error(&self, reason: impl ToString) -> ClassifierError {
        ClassifierError::Load {
            model: self.model.clone(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    #[serde(default)]
    pipeline_tag: Option<String>,
}

#[async_trait]
impl ClassifierLoader for HuggingFaceLoader {
    async fn load(&self) -> Result<Arc<dyn FoodClassifier>, ClassifierError> {
        let mut req = self.client.get(self.model_info_url());
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token.expose_secret());
        }
        let resp = req.send().await.map_err(|e| self.load_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(self.load_error(format!("model lookup returned {status}")));
        }

        let info: ModelInfo = resp.json().await.map_err(|e| self.load_error(e))?;
        match info.pipeline_tag.as_deref() {
            Some(EXPECTED_PIPELINE_TAG) => {}
            other => {
                return Err(self.load_error(format!(
                    "expected an {EXPECTED_PIPELINE_TAG} model, found {}",
                    other.unwrap_or("no pipeline tag")
                )));
            }
        }

        Ok(Arc::new(HuggingFaceClassifier {
            model: self.model.clone(),
            endpoint: format!(
                "{}/models/{}",
                self.inference_url.trim_end_matches('/'),
                self.model
            ),
            api_token: self.api_token.clone(),
            client: self.client.clone(),
        }))
    }
}

/// Inference client for one verified model.
pub struct HuggingFaceClassifier {
    model: String,
    endpoint: String,
    api_token: Option<SecretString>,
    client: reqwest::Client,
}

/// The inference API answers with either predictions or an error object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Predictions(Vec<Prediction>),
    Error { error: String },
}

#[async_trait]
impl FoodClassifier for HuggingFaceClassifier {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn classify(
        &self,
        image: &[u8],
        top_k: usize,
    ) -> Result<Vec<Prediction>, ClassifierError> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(image.to_vec());
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token.expose_secret());
        }

        let resp = req.send().await.map_err(|e| ClassifierError::Inference {
            model: self.model.clone(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| ClassifierError::Inference {
            model: self.model.clone(),
            reason: e.to_string(),
        })?;

        let parsed: InferenceResponse =
            serde_json::from_str(&body).map_err(|e| ClassifierError::InvalidResponse {
                model: self.model.clone(),
                reason: format!("{status}: {e}"),
            })?;

        match parsed {
            InferenceResponse::Predictions(mut predictions) if status.is_success() => {
                predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
                predictions.truncate(top_k);
                Ok(predictions)
            }
            InferenceResponse::Predictions(_) => Err(ClassifierError::Inference {
                model: self.model.clone(),
                reason: format!("inference returned {status}"),
            }),
            InferenceResponse::Error { error } => Err(ClassifierError::Inference {
                model: self.model.clone(),
                reason: format!("{status}: {error}"),
            }),
        }
    }
}
