//! Frameport: one camera, many HTTP clients

use color_eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use frameport::capture::V4l2Device;
use frameport::{server, utils, Acquisition, CaptureContext, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("frameport=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Frameport launching...");

    let mut settings = Settings::load()?;

    if settings.capture.device == "auto" {
        let found = utils::auto_detect_device()?;
        settings.capture.device = found.path;
        settings.capture.format = found.format;
    }
    info!(
        "Using capture device {} at {} @ {}fps",
        settings.capture.device,
        settings.capture.resolution(),
        settings.capture.fps
    );

    let device = V4l2Device::new(settings.capture.device.clone());
    let ctx = CaptureContext::new(Box::new(device), settings.capture, settings.stream);
    let acquisition = Acquisition::start(ctx.clone())?;

    let served = server::serve(ctx, &settings.server, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received");
    })
    .await;

    acquisition.stop().await;
    info!("Frameport shutting down");
    served?;
    Ok(())
}
