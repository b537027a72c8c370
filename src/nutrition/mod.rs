//! Nutrition lookup for recognized foods.

pub mod usda;

pub use usda::{UsdaConfig, UsdaResolver};

use async_trait::async_trait;

use crate::error::NutritionError;
use crate::pipeline::types::{FoodLabel, NutritionEstimate};

/// Outcome of a lookup that reached a decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NutritionLookup {
    /// A record matched; values are scaled to the requested mass.
    Found(NutritionEstimate),
    /// The source has no record for this label.
    NoData,
    /// The source cannot be queried at all (no credential configured).
    Unavailable,
}

/// Resolves a food label to macro estimates.
#[async_trait]
pub trait NutritionResolver: Send + Sync {
    /// Source name for logging (e.g. "usda").
    fn name(&self) -> &str;

    /// Look up `label` and scale the result to `grams`.
    async fn resolve(
        &self,
        label: &FoodLabel,
        grams: f64,
    ) -> Result<NutritionLookup, NutritionError>;
}
