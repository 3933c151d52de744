mod api;
mod app;
mod application;
mod config;
mod domain;
mod ui;
mod utils;

use iced::window;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Anything that escapes to here is logged; session state is never touched.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!(%panic_info, "unhandled panic");
        default_hook(panic_info);
    }));

    let config = config::AppConfig::from_env();
    info!(
        api = %config.api.base_url,
        poll_ms = config.controller.poll_interval.as_millis() as u64,
        "starting media downloader"
    );

    // Network work and the progress tracker run here, outside the UI executor.
    let runtime = tokio::runtime::Runtime::new().map_err(iced::Error::ExecutorCreationFailed)?;
    let handle = runtime.handle().clone();

    let result = iced::application(
        move || app::DownloadApp::new(config.clone(), handle.clone()),
        app::update,
        app::view,
    )
    .title("Simple Media Downloader")
    .window(window::Settings {
        size: iced::Size::new(640.0, 760.0),
        ..Default::default()
    })
    .run();

    runtime.shutdown_background();
    result
}
