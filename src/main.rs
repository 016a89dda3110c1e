use color_eyre::{eyre::eyre, Result};
use glam::Vec3;
use opendetector::audio::TracingAudio;
use opendetector::config::DetectorConfig;
use opendetector::detector::detector_handle::{DetectorEvent, DetectorHandle, DetectorSettings};
use opendetector::scene::{SimScene, TargetId};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = DetectorConfig::load_or_default().unwrap_or_else(|e| {
        tracing::warn!("Falling back to default config: {}", e);
        DetectorConfig::default()
    });

    // Scene with soft ground under the probe and two buried objects.
    let scene = SimScene::new(Vec3::new(0.0, 1.0, 0.0));
    scene.set_surface_below(Some((config.tags.ground.clone(), 0.9)));
    scene.place_target(TargetId(1), Vec3::new(0.0, 1.0, 0.8));
    scene.place_target(TargetId(2), Vec3::new(0.0, 1.0, -0.4));

    let settings = DetectorSettings {
        tick_interval_ms: config.tick_interval_ms,
    };

    let (event_tx, event_rx) = mpsc::channel(100);
    let handle = DetectorHandle::spawn(
        Some(settings),
        event_rx,
        &config,
        Box::new(scene.clone()),
        Box::new(TracingAudio::default()),
    )
    .map_err(|e| eyre!("Failed to spawn detector: {}", e))?;

    let mut status_rx = handle.subscribe();

    // Scripted sweep: pick up, calibrate on ground, pass over both
    // targets, recalibrate on asphalt, put down.
    info!("Operator picks up the detector");
    event_tx.send(DetectorEvent::HoldStart).await?;

    info!("Calibrating on ground");
    event_tx.send(DetectorEvent::CalibrateTrigger).await?;
    sleep(Duration::from_millis(300)).await;

    info!("Sweeping over scrap target");
    event_tx
        .send(DetectorEvent::OverlapEnter {
            target: TargetId(1),
            category_tag: config.tags.scrap.clone(),
        })
        .await?;
    for step in 0..8 {
        scene.place_target(TargetId(1), Vec3::new(0.0, 1.0, 0.8 - step as f32 * 0.1));
        sleep(Duration::from_millis(100)).await;
        let status = status_rx.borrow_and_update().clone();
        info!(
            "Status: mode={:?} volume={:.2} pitch={:.2} range={:.2}",
            status.audio_mode, status.volume, status.pitch, status.max_distance
        );
    }
    event_tx
        .send(DetectorEvent::OverlapExit {
            target: TargetId(1),
        })
        .await?;

    info!("Sweeping over danger target");
    event_tx
        .send(DetectorEvent::OverlapEnter {
            target: TargetId(2),
            category_tag: config.tags.danger.clone(),
        })
        .await?;
    sleep(Duration::from_millis(300)).await;

    info!("Recalibrating on asphalt");
    scene.set_surface_below(Some((config.tags.asphalt.clone(), 0.9)));
    event_tx.send(DetectorEvent::CalibrateTrigger).await?;
    sleep(Duration::from_millis(300)).await;
    let status = status_rx.borrow_and_update().clone();
    info!(
        "Post-calibration status: mode={:?} range={:.2}",
        status.audio_mode, status.max_distance
    );

    info!("Operator puts the detector down");
    event_tx.send(DetectorEvent::HoldEnd).await?;
    sleep(Duration::from_millis(100)).await;

    let status = status_rx.borrow_and_update().clone();
    info!(
        "Final status: held={} target={:?} mode={:?}",
        status.is_held, status.target, status.audio_mode
    );

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
