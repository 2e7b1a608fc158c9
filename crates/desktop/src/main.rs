//! Ollama Chat Desktop: application entry.

use anyhow::Context;
use eframe::egui;
use lib::api::{Backend, BackendClient};
use lib::config;
use std::sync::Arc;

mod app;

fn main() -> anyhow::Result<()> {
    app::install_logger();

    let (config, path) = config::load_config(None)?;
    let base_url = config::resolve_base_url(&config);
    log::info!("backend {} (config {})", base_url, path.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("ochat-io")
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let backend: Arc<dyn Backend> = Arc::new(
        BackendClient::new(base_url).with_status_timeout(config::status_timeout(&config)),
    );
    let poll_interval = config::poll_interval(&config);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 760.0])
            .with_min_inner_size([720.0, 480.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Ollama Chat",
        options,
        Box::new(move |cc| Box::new(app::ChatApp::new(cc, runtime, backend, poll_interval))),
    )
    .map_err(|e| anyhow::anyhow!("desktop app failed: {}", e))
}
