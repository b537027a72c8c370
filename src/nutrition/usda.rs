//! USDA FoodData Central resolver.
//!
//! Searches by label, takes the first food record, and picks each macro out
//! of its nutrient list by substring match. FDC reports values per 100 g.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::NutritionError;
use crate::nutrition::{NutritionLookup, NutritionResolver};
use crate::pipeline::types::{FoodLabel, NutritionEstimate};

/// Public FDC endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.nal.usda.gov/fdc/v1";

/// Records requested per search; only the first is used.
const SEARCH_PAGE_SIZE: u32 = 2;

const CALORIE_TERMS: &[&str] = &["energy", "calories"];
const PROTEIN_TERMS: &[&str] = &["protein"];
const CARBOHYDRATE_TERMS: &[&str] = &["carbohydrate"];
const FAT_TERMS: &[&str] = &["total lipid", "total fat", "lipid"];

/// Resolver settings.
#[derive(Debug, Clone)]
pub struct UsdaConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
}

impl UsdaConfig {
    pub fn new(api_key: Option<SecretString>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// FoodData Central client.
pub struct UsdaResolver {
    config: UsdaConfig,
    client: reqwest::Client,
}

impl UsdaResolver {
    pub fn new(config: UsdaConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn search_url(&self) -> String {
        format!("{}/foods/search", self.config.base_url.trim_end_matches('/'))
    }

    fn request_failed(reason: impl ToString) -> NutritionError {
        NutritionError::RequestFailed {
            source_name: "usda".into(),
            reason: reason.to_string(),
        }
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    foods: Vec<FoodRecord>,
}

#[derive(Debug, Deserialize)]
struct FoodRecord {
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "foodNutrients", default)]
    food_nutrients: Vec<FoodNutrient>,
}

#[derive(Debug, Clone, Deserialize)]
struct FoodNutrient {
    #[serde(rename = "nutrientName", default)]
    nutrient_name: Option<String>,
    #[serde(default)]
    value: Option<f64>,
}

// ── Macro extraction ────────────────────────────────────────────────

/// First nutrient whose lower-cased name contains any of `terms`.
///
/// Nutrients are scanned in record order; for each nutrient the terms are
/// tried in order. A match with no value counts as 0.
fn find_value(nutrients: &[FoodNutrient], terms: &[&str]) -> f64 {
    for nutrient in nutrients {
        let Some(name) = nutrient.nutrient_name.as_deref() else {
            continue;
        };
        let name = name.to_lowercase();
        if terms.iter().any(|term| name.contains(term)) {
            return nutrient.value.unwrap_or(0.0);
        }
    }
    0.0
}

fn extract_per_100g(nutrients: &[FoodNutrient]) -> NutritionEstimate {
    NutritionEstimate::new(
        find_value(nutrients, CALORIE_TERMS),
        find_value(nutrients, PROTEIN_TERMS),
        find_value(nutrients, CARBOHYDRATE_TERMS),
        find_value(nutrients, FAT_TERMS),
    )
}

#[async_trait]
impl NutritionResolver for UsdaResolver {
    fn name(&self) -> &str {
        "usda"
    }

    async fn resolve(
        &self,
        label: &FoodLabel,
        grams: f64,
    ) -> Result<NutritionLookup, NutritionError> {
        let Some(api_key) = self.config.api_key.as_ref() else {
            warn!(label = %label, "USDA_API_KEY not set; reporting zero nutrition");
            return Ok(NutritionLookup::Unavailable);
        };

        let page_size = SEARCH_PAGE_SIZE.to_string();
        let resp = self
            .client
            .get(self.search_url())
            .query(&[
                ("query", label.as_str()),
                ("pageSize", page_size.as_str()),
                ("api_key", api_key.expose_secret()),
            ])
            .send()
            .await
            .map_err(Self::request_failed)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::request_failed(format!("search returned {status}: {body}")));
        }

        let search: SearchResponse = resp
            .json()
            .await
            .map_err(|e| NutritionError::InvalidResponse {
                source_name: "usda".into(),
                reason: e.to_string(),
            })?;

        let Some(food) = search.foods.into_iter().next() else {
            debug!(label = %label, "No FDC record matched");
            return Ok(NutritionLookup::NoData);
        };

        let estimate =
            NutritionEstimate::scaled_from_100g(extract_per_100g(&food.food_nutrients), grams);
        debug!(
            label = %label,
            record = food.description.as_deref().unwrap_or("unnamed"),
            calories = estimate.calories,
            "Resolved nutrition"
        );
        Ok(NutritionLookup::Found(estimate))
    }
}
