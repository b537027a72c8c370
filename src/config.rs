//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default listening port for the webhook server.
pub const DEFAULT_PORT: u16 = 3000;

/// Default Hugging Face model (Food-101 label set).
pub const DEFAULT_MODEL: &str = "nateraw/food";

/// Per-run pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How many labels are resolved and reported per photo.
    pub top_labels: usize,
    /// Mass each reported item is scaled to.
    pub portion_grams: f64,
    /// Where fetched photos live while a run is in flight.
    pub scratch_dir: PathBuf,
    /// Send an "analyzing" acknowledgement before classification.
    pub acknowledge_photos: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_labels: 3,
            portion_grams: 100.0,
            scratch_dir: std::env::temp_dir().join("food-lens"),
            acknowledge_photos: true,
        }
    }
}

/// Classification engine settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Model identifier on the Hugging Face Hub.
    pub model: String,
    /// Optional Hugging Face access token.
    pub api_token: Option<SecretString>,
    /// Candidates requested from the engine before downstream slicing.
    pub top_k: usize,
    /// Bounding box (both sides) images are fitted into.
    pub max_dimension: u32,
    /// JPEG quality used when re-encoding.
    pub jpeg_quality: u8,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_token: None,
            top_k: 5,
            max_dimension: 384,
            jpeg_quality: 80,
        }
    }
}

/// WhatsApp Cloud API credentials.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub access_token: SecretString,
    pub phone_number_id: String,
    /// Token Meta echoes back during webhook subscription.
    pub verify_token: SecretString,
}

/// Everything the binary needs, read once at start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub whatsapp: WhatsAppConfig,
    /// FoodData Central key. Absent means every lookup is "unavailable".
    pub usda_api_key: Option<SecretString>,
    pub classifier: ClassifierConfig,
    pub pipeline: PipelineConfig,
    /// Directory for daily-rolling log files, if file logging is wanted.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require =
            |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let whatsapp = WhatsAppConfig {
            access_token: SecretString::from(require("WHATSAPP_TOKEN")?),
            phone_number_id: require("WHATSAPP_NUMBER_ID")?,
            verify_token: SecretString::from(require("VERIFY_TOKEN")?),
        };

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                message: format!("{raw:?} is not a port number: {e}"),
            })?,
            None => DEFAULT_PORT,
        };

        let mut pipeline = PipelineConfig::default();
        if let Some(dir) = get("FOOD_LENS_SCRATCH_DIR") {
            pipeline.scratch_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get("FOOD_LENS_PORTION_GRAMS") {
            let grams: f64 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "FOOD_LENS_PORTION_GRAMS".to_string(),
                message: format!("{raw:?}: {e}"),
            })?;
            if !grams.is_finite() || grams <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: "FOOD_LENS_PORTION_GRAMS".to_string(),
                    message: "must be a positive number".to_string(),
                });
            }
            pipeline.portion_grams = grams;
        }

        let classifier = ClassifierConfig {
            model: get("FOOD_LENS_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_token: get("HF_API_TOKEN").map(SecretString::from),
            ..ClassifierConfig::default()
        };

        Ok(Self {
            port,
            whatsapp,
            usda_api_key: get("USDA_API_KEY").map(SecretString::from),
            classifier,
            pipeline,
            log_dir: get("FOOD_LENS_LOG_DIR").map(PathBuf::from),
        })
    }
}
