//! User-facing message texts.

use std::fmt::Write;

use crate::pipeline::types::MealSummary;

/// Sent for anything that is not a photo.
pub const PROMPT_FOR_PHOTO: &str =
    "Hi! Send me a photo of your plate and I'll estimate its calories and nutrients 🍽️";

/// Sent when the photo could not be downloaded.
pub const FETCH_RETRY: &str = "I couldn't download your photo. Please try again.";

/// Sent right after the photo is stored, before classification.
pub const ANALYZING: &str = "Got your photo, analyzing it now 🔎";

/// Sent when the classifier recognized nothing.
pub const NOT_IDENTIFIED: &str =
    "I couldn't identify any food in that photo. Try a sharper, well-lit picture.";

/// Render a meal summary. Callers only use this when classification produced labels.
pub fn format_summary(summary: &MealSummary, portion_grams: f64) -> String {
    let mut text = String::from("🍽 *Meal analysis*\n\n");

    for item in &summary.items {
        let est = &item.estimate;
        // Writing to a String cannot fail.
        let _ = write!(
            text,
            "• {} ({portion_grams} g)\n  - 🔥 {} kcal\n  - 💪 {} g protein\n  - 🍞 {} g carbohydrate\n  - 🥑 {} g fat\n\n",
            item.label.capitalized(),
            est.calories,
            est.protein,
            est.carbohydrate,
            est.fat,
        );
    }

    let total = &summary.total;
    let _ = write!(
        text,
        "*Approximate total:* 🔥 {} kcal | 💪 {} g | 🍞 {} g | 🥑 {} g\n\n_Estimates based on {portion_grams} g per item._",
        round_half_up(total.calories),
        round_half_up(total.protein),
        round_half_up(total.carbohydrate),
        round_half_up(total.fat),
    );

    text
}

/// Nearest integer, halves rounded up (totals are never negative).
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::aggregate::aggregate;
    use crate::pipeline::types::{FoodLabel, NutritionEstimate};

    fn sample() -> MealSummary {
        aggregate([
            (
                FoodLabel::normalize("fried_rice"),
                Some(NutritionEstimate::new(163.0, 3.4, 30.1, 2.5)),
            ),
            (
                FoodLabel::normalize("spring_rolls"),
                Some(NutritionEstimate::new(154.2, 4.6, 19.3, 6.5)),
            ),
        ])
    }

    #[test]
    fn renders_items_and_rounded_totals() {
        let text = format_summary(&sample(), 100.0);
        let expected = "🍽 *Meal analysis*\n\n\
            • Fried rice (100 g)\n  - 🔥 163 kcal\n  - 💪 3.4 g protein\n  - 🍞 30.1 g carbohydrate\n  - 🥑 2.5 g fat\n\n\
            • Spring rolls (100 g)\n  - 🔥 154.2 kcal\n  - 💪 4.6 g protein\n  - 🍞 19.3 g carbohydrate\n  - 🥑 6.5 g fat\n\n\
            *Approximate total:* 🔥 317 kcal | 💪 8 g | 🍞 49 g | 🥑 9 g\n\n\
            _Estimates based on 100 g per item._";
        assert_eq!(text, expected);
    }

    #[test]
    fn rendering_is_deterministic() {
        let summary = sample();
        assert_eq!(format_summary(&summary, 100.0), format_summary(&summary, 100.0));
    }

    #[test]
    fn zero_items_render_zero_values() {
        let summary = aggregate([(FoodLabel::normalize("tea"), Some(NutritionEstimate::ZERO))]);
        let text = format_summary(&summary, 100.0);
        assert!(text.contains("• Tea (100 g)\n  - 🔥 0 kcal\n  - 💪 0 g protein"));
        assert!(text.contains("🔥 0 kcal | 💪 0 g | 🍞 0 g | 🥑 0 g"));
    }

    #[test]
    fn portion_size_is_shown() {
        let text = format_summary(&sample(), 250.0);
        assert!(text.contains("• Fried rice (250 g)"));
        assert!(text.ends_with("_Estimates based on 250 g per item._"));
    }

    #[test]
    fn halves_round_up() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.49), 2);
        assert_eq!(round_half_up(0.0), 0);
    }
}
