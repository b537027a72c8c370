use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use food_lens::channels::{WhatsAppChannel, webhook_routes};
use food_lens::config::AppConfig;
use food_lens::nutrition::{NutritionResolver, UsdaConfig, UsdaResolver};
use food_lens::pipeline::processor::FoodPipeline;
use food_lens::pipeline::types::MessagingTransport;
use food_lens::vision::{FoodRecognizer, HuggingFaceLoader, ImageNormalizer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export WHATSAPP_TOKEN=... WHATSAPP_NUMBER_ID=... VERIFY_TOKEN=...");
        std::process::exit(1);
    });

    // Held for the life of the process so buffered log lines get flushed.
    let _log_guard = init_tracing(&config);

    eprintln!("🍽  Food Lens v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.classifier.model);
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook", config.port);
    eprintln!(
        "   Nutrition: {}",
        if config.usda_api_key.is_some() {
            "USDA FoodData Central"
        } else {
            "disabled (USDA_API_KEY not set)"
        }
    );

    // ── Transport ────────────────────────────────────────────────────────
    let transport: Arc<dyn MessagingTransport> = Arc::new(WhatsAppChannel::new(
        config.whatsapp.access_token.clone(),
        config.whatsapp.phone_number_id.clone(),
    ));

    // ── Recognizer (loaded lazily on the first photo) ────────────────────
    let loader = HuggingFaceLoader::new(
        config.classifier.model.clone(),
        config.classifier.api_token.clone(),
    );
    let recognizer = Arc::new(FoodRecognizer::new(
        Box::new(loader),
        ImageNormalizer::new(
            config.classifier.max_dimension,
            config.classifier.jpeg_quality,
        ),
        config.classifier.top_k,
    ));

    // ── Nutrition ────────────────────────────────────────────────────────
    let resolver: Arc<dyn NutritionResolver> =
        Arc::new(UsdaResolver::new(UsdaConfig::new(config.usda_api_key.clone())));

    // ── Pipeline ─────────────────────────────────────────────────────────
    let pipeline = Arc::new(FoodPipeline::new(
        transport,
        recognizer,
        resolver,
        config.pipeline.clone(),
    ));
    pipeline.scratch().ensure().await.with_context(|| {
        format!(
            "creating scratch directory {}",
            pipeline.scratch().root().display()
        )
    })?;

    // ── HTTP server ──────────────────────────────────────────────────────
    let app = webhook_routes(pipeline, config.whatsapp.verify_token.clone());
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "Webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("webhook server")?;

    info!("Shut down");
    Ok(())
}

/// Console logging always; a daily-rotated file too when a log dir is set.
fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "food-lens.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
