mod app;
mod chat;
mod checkin;
mod config;
mod event;
mod identity;
mod map;
mod places;
mod theme;

use app::DakaApp;
use chat::client::ChatClient;
use chat::completion::ChatCompletionsClient;
use chat::peer::FileMailbox;
use config::AppConfig;
use eframe::egui;
use identity::accounts::load_or_create_device_id;
use std::sync::{mpsc, Arc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("daka=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::from_env()?;
    if config.ai.api_key.is_none() {
        warn!("DEEPSEEK_API_KEY is not set; the assistant will answer with a fallback message");
    }
    let device_id = load_or_create_device_id(&config.device_id_path());
    info!(data_dir = %config.data_dir.display(), device_id = %device_id, "starting daka");

    let (tx, rx) = mpsc::channel();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("daka-runtime")
        .build()?;

    let chat = ChatClient::new(
        Arc::new(ChatCompletionsClient::new(&config.ai)),
        Arc::new(FileMailbox::new(config.mailbox_path())),
        tx.clone(),
        runtime.handle().clone(),
    );
    let app = DakaApp::new(rx, tx, runtime.handle().clone(), config, device_id, chat);
    let _runtime = runtime;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([1024.0, 640.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Daka Map",
        native_options,
        Box::new(move |_creation_context| Ok(Box::new(app))),
    )?;

    Ok(())
}
