//! Folds per-label lookups into a meal summary.

use crate::pipeline::types::{
    AggregateTotal, FoodLabel, MealSummary, NutritionEstimate, NutritionItem,
};

/// Keep labels that resolved, in order, and sum their macros.
pub fn aggregate<I>(resolved: I) -> MealSummary
where
    I: IntoIterator<Item = (FoodLabel, Option<NutritionEstimate>)>,
{
    let mut summary = MealSummary::default();
    for (label, estimate) in resolved {
        let Some(estimate) = estimate else {
            continue;
        };
        summary.total += &estimate;
        summary.items.push(NutritionItem { label, estimate });
    }
    summary
}

/// First `n` labels in classifier order.
pub fn select_top(labels: Vec<FoodLabel>, n: usize) -> Vec<FoodLabel> {
    labels.into_iter().take(n).collect()
}
