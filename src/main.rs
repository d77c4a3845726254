//! Demo binary: runs one try-on end to end from the command line.
//!
//! Usage: `tryon-widget <garment-image-url> <photo-path>`

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use tryon_widget::config::TryOnConfig;
use tryon_widget::services::api::HttpTryOnApi;
use tryon_widget::services::session::FileSessionStore;
use tryon_widget::widget::{WidgetController, WidgetPhase};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = TryOnConfig::from_env().expect("Failed to load configuration from environment");

    let mut args = std::env::args().skip(1);
    let garment_url = args.next().expect("Usage: tryon-widget <garment-image-url> <photo-path>");
    let photo_path = args.next().expect("Usage: tryon-widget <garment-image-url> <photo-path>");

    tracing::info!(api_base = %config.api_base, "Starting try-on run");

    let api = HttpTryOnApi::new(&config.api_base, config.api_key.as_deref())
        .expect("Failed to initialize try-on API client");
    let sessions = FileSessionStore::new(&config.session_file, config.poll_timeout());

    let controller = WidgetController::new(Arc::new(api), Arc::new(sessions), config);
    controller.open(&garment_url);

    if let Err(e) = controller.select_photo(photo_path.as_ref()).await {
        tracing::error!(error = %e, "Could not load the photo");
        std::process::exit(1);
    }

    controller.run().await;

    let state = controller.state();
    match state.phase {
        WidgetPhase::Succeeded => {
            tracing::info!(results = state.results.len(), "Generation finished");
            for url in &state.results {
                println!("{url}");
            }
        }
        _ => {
            tracing::error!(
                error = state.error_text.as_deref().unwrap_or("unknown error"),
                "Generation did not finish"
            );
            std::process::exit(1);
        }
    }
}
