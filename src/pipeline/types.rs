//! Shared types for the meal-analysis pipeline.

use std::fmt;
use std::ops::AddAssign;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

// ── Inbound event ───────────────────────────────────────────────────

/// What kind of message the user sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Image,
    Other(String),
}

impl From<&str> for MessageKind {
    fn from(raw: &str) -> Self {
        match raw {
            "text" => Self::Text,
            "image" => Self::Image,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Transport-side reference to an uploaded photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: String,
    pub mime_type: Option<String>,
}

/// One message as the pipeline sees it, whatever the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Transport message ID.
    pub id: String,
    /// Sender address; replies go back here.
    pub from: String,
    pub kind: MessageKind,
    /// Present for image messages.
    pub media: Option<MediaRef>,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn text(id: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            kind: MessageKind::Text,
            media: None,
            received_at: Utc::now(),
        }
    }

    pub fn image(id: impl Into<String>, from: impl Into<String>, media: MediaRef) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            kind: MessageKind::Image,
            media: Some(media),
            received_at: Utc::now(),
        }
    }
}

/// Downloaded photo bytes.
#[derive(Debug, Clone)]
pub struct MediaDownload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

// ── Labels and nutrition ────────────────────────────────────────────

static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[_\-\s]+").unwrap());

/// Normalized food name: lower-case, word separators collapsed to one space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FoodLabel(String);

impl FoodLabel {
    pub fn normalize(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        Self(SEPARATORS.replace_all(&lower, " ").trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Label with its first character upper-cased, for display.
    pub fn capitalized(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for FoodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Macro estimate for one food at a given mass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionEstimate {
    pub calories: f64,
    pub protein: f64,
    pub carbohydrate: f64,
    pub fat: f64,
}

impl NutritionEstimate {
    pub const ZERO: Self = Self {
        calories: 0.0,
        protein: 0.0,
        carbohydrate: 0.0,
        fat: 0.0,
    };

    pub fn new(calories: f64, protein: f64, carbohydrate: f64, fat: f64) -> Self {
        Self {
            calories,
            protein,
            carbohydrate,
            fat,
        }
    }

    /// Scale a per-100 g profile to `grams`, rounding each macro to 0.1.
    pub fn scaled_from_100g(per_100g: Self, grams: f64) -> Self {
        let scale = |value: f64| round_tenth(value * grams / 100.0);
        Self {
            calories: scale(per_100g.calories),
            protein: scale(per_100g.protein),
            carbohydrate: scale(per_100g.carbohydrate),
            fat: scale(per_100g.fat),
        }
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// A label that resolved to nutrition data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionItem {
    pub label: FoodLabel,
    pub estimate: NutritionEstimate,
}

/// Running sum over every item of one meal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateTotal {
    pub calories: f64,
    pub protein: f64,
    pub carbohydrate: f64,
    pub fat: f64,
}

impl AddAssign<&NutritionEstimate> for AggregateTotal {
    fn add_assign(&mut self, estimate: &NutritionEstimate) {
        self.calories += estimate.calories;
        self.protein += estimate.protein;
        self.carbohydrate += estimate.carbohydrate;
        self.fat += estimate.fat;
    }
}

/// Items plus total, ready for formatting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MealSummary {
    pub items: Vec<NutritionItem>,
    pub total: AggregateTotal,
}

// ── Run bookkeeping ─────────────────────────────────────────────────

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Received,
    ImageFetched,
    Classified,
    NutritionResolved,
    Replied,
    Done,
}

impl RunStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ImageFetched => "image_fetched",
            Self::Classified => "classified",
            Self::NutritionResolved => "nutrition_resolved",
            Self::Replied => "replied",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which terminal branch a run took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Not a photo; the user was asked to send one.
    PromptedForPhoto,
    /// The photo could not be downloaded.
    FetchFailed,
    /// The classifier produced no labels.
    NothingRecognized,
    /// A summary was sent covering `items` foods.
    Summarized { items: usize },
}

// ── Transport trait ─────────────────────────────────────────────────

/// Messaging transport. Pure I/O, no business logic.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Channel name (e.g. "whatsapp").
    fn name(&self) -> &str;

    /// Download the photo a media reference points at.
    async fn fetch_media(&self, media: &MediaRef) -> Result<MediaDownload, ChannelError>;

    /// Send a plain text message.
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError>;
}
