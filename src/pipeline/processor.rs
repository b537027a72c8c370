//! Meal pipeline: turns one inbound photo into one nutrition summary.
//!
//! Flow:
//! 1. Non-photo → prompt for a photo
//! 2. Fetch the photo → retry message on failure
//! 3. Store it in scratch, acknowledge, classify
//! 4. No labels → "could not identify" message
//! 5. Top labels → sequential nutrition lookups → aggregate → summary
//!
//! Outbound send failures are logged and never change the outcome.

use std::sync::Arc;

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::nutrition::{NutritionLookup, NutritionResolver};
use crate::pipeline::aggregate::{aggregate, select_top};
use crate::pipeline::asset::{ImageAsset, ScratchDir};
use crate::pipeline::reply::{self, format_summary};
use crate::pipeline::types::{
    FoodLabel, InboundEvent, MessageKind, MessagingTransport, NutritionEstimate, RunOutcome,
    RunStage,
};
use crate::vision::FoodRecognizer;

/// Orchestrates a run per inbound message.
///
/// One instance is shared by every run; it holds no per-run state.
pub struct FoodPipeline {
    transport: Arc<dyn MessagingTransport>,
    recognizer: Arc<FoodRecognizer>,
    resolver: Arc<dyn NutritionResolver>,
    scratch: ScratchDir,
    config: PipelineConfig,
}

impl FoodPipeline {
    pub fn new(
        transport: Arc<dyn MessagingTransport>,
        recognizer: Arc<FoodRecognizer>,
        resolver: Arc<dyn NutritionResolver>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transport,
            recognizer,
            resolver,
            scratch: ScratchDir::new(config.scratch_dir.clone()),
            config,
        }
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    /// Run one event to completion.
    ///
    /// `Err` means the run was abandoned without a user-facing reply.
    pub async fn handle(&self, event: InboundEvent) -> Result<RunOutcome, PipelineError> {
        let span = info_span!(
            "run",
            run_id = %Uuid::new_v4(),
            message_id = %event.id,
            from = %event.from,
        );
        async move {
            let outcome = self.run(event).await;
            match &outcome {
                Ok(o) => info!(outcome = ?o, "Run complete"),
                Err(e) => error!(error = %e, "Run abandoned"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(&self, event: InboundEvent) -> Result<RunOutcome, PipelineError> {
        info!(
            kind = ?event.kind,
            channel = self.transport.name(),
            stage = %RunStage::Received,
            "Inbound message"
        );

        // Step 1: only photos go further
        let media = match (&event.kind, &event.media) {
            (MessageKind::Image, Some(media)) => media,
            _ => {
                self.reply(&event.from, reply::PROMPT_FOR_PHOTO).await;
                return Ok(RunOutcome::PromptedForPhoto);
            }
        };

        // Step 2: fetch
        let download = match self.transport.fetch_media(media).await {
            Ok(download) => download,
            Err(e) => {
                warn!(media_id = %media.id, error = %e, "Could not fetch photo");
                self.reply(&event.from, reply::FETCH_RETRY).await;
                return Ok(RunOutcome::FetchFailed);
            }
        };

        let asset = self
            .scratch
            .store(download.bytes, download.content_type)
            .await
            .map_err(|source| PipelineError::Storage {
                stage: RunStage::ImageFetched,
                source,
            })?;
        debug!(bytes = asset.len(), stage = %RunStage::ImageFetched, "Photo stored");

        if self.config.acknowledge_photos {
            self.reply(&event.from, reply::ANALYZING).await;
        }

        // Step 3: classify
        let labels = self.classify(&asset).await;
        if labels.is_empty() {
            self.reply(&event.from, reply::NOT_IDENTIFIED).await;
            asset.release();
            return Ok(RunOutcome::NothingRecognized);
        }

        // Step 4: nutrition, one label at a time, classifier order kept
        let top = select_top(labels, self.config.top_labels);
        let mut resolved = Vec::with_capacity(top.len());
        for label in top {
            let estimate = self.lookup(&label).await;
            resolved.push((label, estimate));
        }
        let summary = aggregate(resolved);
        debug!(
            items = summary.items.len(),
            calories = summary.total.calories,
            stage = %RunStage::NutritionResolved,
            "Nutrition aggregated"
        );

        // Step 5: reply and clean up
        let text = format_summary(&summary, self.config.portion_grams);
        self.reply(&event.from, &text).await;
        debug!(stage = %RunStage::Replied, "Summary dispatched");

        asset.release();
        debug!(stage = %RunStage::Done, "Run finished");
        Ok(RunOutcome::Summarized {
            items: summary.items.len(),
        })
    }

    /// Labels for the photo; classifier failures count as "nothing recognized".
    async fn classify(&self, asset: &ImageAsset) -> Vec<FoodLabel> {
        match self.recognizer.recognize(asset).await {
            Ok(labels) => {
                info!(count = labels.len(), stage = %RunStage::Classified, "Photo classified");
                labels
            }
            Err(e) => {
                warn!(error = %e, stage = %RunStage::Classified, "Classification failed");
                Vec::new()
            }
        }
    }

    /// Apply the lookup policy for one label.
    ///
    /// - found → its estimate
    /// - unavailable (no credential) → zero estimate, still listed
    /// - no data or lookup error → left out
    async fn lookup(&self, label: &FoodLabel) -> Option<NutritionEstimate> {
        match self.resolver.resolve(label, self.config.portion_grams).await {
            Ok(NutritionLookup::Found(estimate)) => Some(estimate),
            Ok(NutritionLookup::Unavailable) => Some(NutritionEstimate::ZERO),
            Ok(NutritionLookup::NoData) => {
                debug!(label = %label, source = self.resolver.name(), "No nutrition data");
                None
            }
            Err(e) => {
                warn!(
                    label = %label,
                    source = self.resolver.name(),
                    error = %e,
                    "Nutrition lookup failed"
                );
                None
            }
        }
    }

    /// Send a message, logging instead of propagating failures.
    async fn reply(&self, to: &str, body: &str) {
        if let Err(e) = self.transport.send_text(to, body).await {
            error!(
                channel = self.transport.name(),
                to = %to,
                error = %e,
                "Failed to send reply"
            );
        }
    }
}
