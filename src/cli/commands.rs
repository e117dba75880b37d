//! Interactive command flows behind the `facelink` binary.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};
use crossterm::{cursor, style, terminal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::camera::{CameraSession, FacingMode};
use crate::cli::ascii_preview::{
    self, check_for_escape, clear_screen, poll_key_action, redraw, AsciiRenderer, KeyAction,
};
use crate::common::Config;
use crate::core::recognition::RecognitionDisplay;
use crate::core::roster::RosterSnapshot;
use crate::core::{histogram, texture, AspectCropper, EnrollmentSession, EnrollmentState};
use crate::core::{LiveUpdateReconciler, RecognitionLoop};
use crate::service::protocol;
use crate::service::{spawn_push_channel, RecognitionService, ServiceClient};

const SUBMIT_ATTEMPTS: u32 = 3;
const SUBMIT_BACKOFF: Duration = Duration::from_secs(1);
const PREVIEW_REFRESH: Duration = Duration::from_millis(100);
const EVENT_QUEUE: usize = 32;

pub async fn health(config: &Config) -> anyhow::Result<()> {
    let client = ServiceClient::new(&config.service)?;
    if client.health().await {
        println!("✅ Service reachable at {}", client.base_url());
        Ok(())
    } else {
        bail!("Service unreachable at {}", client.base_url())
    }
}

/// Capture the configured number of samples with a live preview, then upload them.
pub async fn enroll(config: &Config, name: &str) -> anyhow::Result<()> {
    let client = ServiceClient::new(&config.service)?;
    let camera = CameraSession::open(&config.camera, FacingMode::User)?;
    let mut session = EnrollmentSession::new(camera, &config.enrollment);
    session.set_label(name);
    if session.label().is_empty() {
        bail!("Subject name must not be empty");
    }

    let interval = Duration::from_millis(config.enrollment.capture_interval_ms);
    let renderer = AsciiRenderer::new(None, None);

    terminal::enable_raw_mode().context("Failed to enable raw mode")?;
    crossterm::execute!(io::stdout(), cursor::Hide).ok();
    let captured = tokio::task::block_in_place(|| capture_samples(&mut session, &renderer, interval));
    crossterm::execute!(io::stdout(), cursor::Show).ok();
    terminal::disable_raw_mode().context("Failed to disable raw mode")?;
    captured?;

    session.camera_mut().release();
    clear_screen().ok();
    println!("📸 Captured {} samples for {}", session.samples().len(), session.label());

    submit_with_retries(&mut session, &client).await?;
    println!("✅ Enrolled {}", session.label());
    Ok(())
}

fn capture_samples(
    session: &mut EnrollmentSession,
    renderer: &AsciiRenderer,
    interval: Duration,
) -> anyhow::Result<()> {
    clear_screen().ok();
    let mut last_capture = Instant::now();

    while session.state() != EnrollmentState::Full {
        let frame = match session.camera_mut().sample() {
            Ok(frame) => frame,
            Err(e) if e.is_retryable() => {
                std::thread::sleep(PREVIEW_REFRESH);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let ascii = renderer.render_frame_with_progress(&frame, session.samples().len(), session.max_samples());
        crossterm::execute!(
            io::stdout(),
            cursor::MoveTo(0, 0),
            style::Print(&ascii),
            cursor::MoveTo(0, (renderer.height() + 2) as u16),
            style::Print("Press ESC to cancel enrollment")
        )
        .ok();

        if check_for_escape()? {
            bail!("Enrollment cancelled by user");
        }

        if last_capture.elapsed() >= interval {
            match session.capture() {
                Ok(sample) => debug!("Captured sample {}", sample.id),
                Err(e) if e.is_retryable() => debug!("Capture deferred: {}", e),
                Err(e) => return Err(e.into()),
            }
            last_capture = Instant::now();
        }

        std::thread::sleep(PREVIEW_REFRESH);
    }

    Ok(())
}

/// Retries transport failures only. The session keeps its samples between attempts.
async fn submit_with_retries<S: RecognitionService>(
    session: &mut EnrollmentSession,
    service: &S,
) -> anyhow::Result<()> {
    let mut attempt = 1;
    loop {
        match session.submit(service).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < SUBMIT_ATTEMPTS => {
                warn!("Enrollment upload attempt {} failed: {}", attempt, e);
                println!("⚠️  Upload failed ({}), retrying...", e);
                attempt += 1;
                tokio::time::sleep(SUBMIT_BACKOFF).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

pub async fn train(config: &Config) -> anyhow::Result<()> {
    let client = ServiceClient::new(&config.service)?;
    println!("Training global model...");
    let outcome = client.train().await;
    println!("{}", protocol::train_report(&outcome));
    outcome.map_err(Into::into)
}

/// Run the polling loop and redraw the HUD whenever the display state changes.
/// `f` releases the camera and restarts the loop on the other facing mode.
pub async fn recognize(config: &Config, facing: FacingMode) -> anyhow::Result<()> {
    let client = Arc::new(ServiceClient::new(&config.service)?);
    let mut facing = facing;

    terminal::enable_raw_mode().context("Failed to enable raw mode")?;
    crossterm::execute!(io::stdout(), cursor::Hide).ok();

    let outcome: anyhow::Result<()> = async {
        loop {
            let camera = CameraSession::open(&config.camera, facing)?;
            let recognition = RecognitionLoop::start(camera, client.clone(), &config.recognition, &config.service);
            let action = watch_hud(&recognition, facing).await;
            recognition.shutdown().await?;

            match action? {
                KeyAction::SwitchCamera => {
                    facing = facing.toggled();
                    info!("Switching camera to {}", facing);
                }
                _ => return Ok(()),
            }
        }
    }
    .await;

    crossterm::execute!(io::stdout(), cursor::Show).ok();
    terminal::disable_raw_mode().context("Failed to disable raw mode")?;
    clear_screen().ok();

    info!("Recognition stopped");
    outcome
}

/// Redraw on every display change until the user quits or switches camera.
/// A loop that stopped itself keeps its last screen up until a key arrives.
async fn watch_hud(recognition: &RecognitionLoop, facing: FacingMode) -> anyhow::Result<KeyAction> {
    let mut display = recognition.subscribe();
    let mut keys = tokio::time::interval(PREVIEW_REFRESH);
    let mut dirty = true;
    let mut finished = false;

    loop {
        if dirty {
            let text = hud_screen(&display.borrow_and_update(), facing);
            redraw(&text)?;
            dirty = false;
        }
        tokio::select! {
            changed = display.changed(), if !finished => match changed {
                Ok(()) => dirty = true,
                Err(_) => finished = true,
            },
            _ = keys.tick() => match poll_key_action()? {
                KeyAction::None => {}
                action => return Ok(action),
            },
        }
    }
}

fn hud_screen(display: &RecognitionDisplay, facing: FacingMode) -> String {
    let mut lines = ascii_preview::render_hud(display);
    lines.push(String::new());
    lines.push(format!("camera: {}    [F] switch camera    ESC to stop", facing));
    lines.join("\r\n")
}

/// Print the roster once, or keep it live from the push channel with `watch`.
pub async fn roster(config: &Config, watch: bool) -> anyhow::Result<()> {
    let client = Arc::new(ServiceClient::new(&config.service)?);
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
    let cancel = CancellationToken::new();

    let push = if watch {
        let reconnect = (config.service.reconnect_secs > 0)
            .then(|| Duration::from_secs(config.service.reconnect_secs));
        Some(spawn_push_channel(config.service.updates_url(), reconnect, events_tx, cancel.clone()))
    } else {
        drop(events_tx);
        None
    };

    let reconciler = LiveUpdateReconciler::start(client, events_rx, &config.roster, &config.service);
    let mut snapshots = reconciler.subscribe();

    let Some(push) = push else {
        let snapshot = snapshots
            .wait_for(|snapshot| !snapshot.loading)
            .await
            .map(|snapshot| (*snapshot).clone())
            .map_err(|_| anyhow!("Roster stopped before the first refresh"))?;
        print!("{}", ascii_preview::render_roster(&snapshot, &BTreeSet::new()));
        reconciler.shutdown().await?;
        return Ok(());
    };

    let mut highlights = reconciler.highlights().subscribe();
    terminal::enable_raw_mode().context("Failed to enable raw mode")?;
    crossterm::execute!(io::stdout(), cursor::Hide).ok();

    let mut keys = tokio::time::interval(PREVIEW_REFRESH);
    let outcome: anyhow::Result<()> = async {
        let mut dirty = true;
        loop {
            if dirty {
                let text = roster_screen(&snapshots.borrow_and_update(), &highlights.borrow_and_update());
                redraw(&text)?;
                dirty = false;
            }
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    dirty = true;
                }
                changed = highlights.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    dirty = true;
                }
                _ = keys.tick() => {
                    if check_for_escape()? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
    .await;

    crossterm::execute!(io::stdout(), cursor::Show).ok();
    terminal::disable_raw_mode().context("Failed to disable raw mode")?;
    clear_screen().ok();

    cancel.cancel();
    if let Err(e) = push.await {
        warn!("Update stream task failed: {}", e);
    }
    reconciler.shutdown().await?;
    outcome
}

fn roster_screen(snapshot: &RosterSnapshot, highlighted: &BTreeSet<String>) -> String {
    let mut text = ascii_preview::render_roster(snapshot, highlighted);
    if let Some(at) = snapshot.refreshed_at {
        text.push_str(&format!("\r\nlast sync {}", at.format("%H:%M:%S")));
    }
    text.push_str("\r\nPress ESC to stop");
    text
}

/// Write the two-tone texture view of `input`, cropped like an enrollment sample.
pub fn filter(config: &Config, input: &Path, output: &Path) -> anyhow::Result<()> {
    let image = image::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?
        .to_rgba8();
    let cropper = AspectCropper::new(config.enrollment.capture_width, config.enrollment.capture_height);
    let filtered = texture::apply(&cropper.crop(&image)?);

    image::DynamicImage::ImageRgba8(filtered)
        .to_rgb8()
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Texture view written to {}", output.display());
    Ok(())
}

pub fn histogram(input: &Path) -> anyhow::Result<()> {
    let image = image::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?
        .to_rgba8();
    let bins = histogram::histogram_of(&image);

    println!("{}", ascii_preview::histogram_sparkline(&bins));
    for bin in &bins {
        println!("{:>2}  {:>6.1}", bin.bin, bin.value);
    }
    Ok(())
}
