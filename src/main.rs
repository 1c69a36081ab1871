//! Babble Avatar viewer
//!
//! Usage: `babble-avatar-viewer [engine.toml]`

use anyhow::{Context, Result};
use babble_avatar::ui::AvatarViewerApp;
use babble_avatar::EngineConfig;
use eframe::egui;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "babble_avatar=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("failed to load engine config from {}", path))?,
        None => EngineConfig::default(),
    };

    info!("Starting Babble avatar viewer");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 720.0])
            .with_min_inner_size([640.0, 480.0])
            .with_title("Babble Avatar"),
        ..Default::default()
    };

    eframe::run_native(
        "Babble Avatar",
        options,
        Box::new(move |cc| {
            let app = AvatarViewerApp::with_creation_context(cc, config)?;
            Ok(Box::new(app))
        }),
    )
    .map_err(|e| anyhow::anyhow!("viewer exited with error: {}", e))
}
