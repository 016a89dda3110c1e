//! Detector Handle - host-facing API for the detection loop
//!
//! Owns the event dispatch loop around [`DetectorController`]: host
//! collaborators push [`DetectorEvent`]s over an mpsc channel, the loop
//! drains them once per tick interval, applies them in arrival order, runs
//! one tick and publishes a [`DetectorStatus`] snapshot over a watch
//! channel. All controller entry points execute inside this single task,
//! preserving the single-writer model.

use chrono::{DateTime, Local};
use statum::{machine, state};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::audio::AudioSink;
use crate::config::DetectorConfig;
use crate::detector::controller::{AudioMode, DetectorController};
use crate::scene::{SceneQuery, TargetId};

/// Events the host collaborators deliver to the detector.
#[derive(Debug, Clone)]
pub enum DetectorEvent {
    /// Device picked up.
    HoldStart,
    /// Device put down.
    HoldEnd,
    /// A tracked-shape overlap began, carrying the collaborator's
    /// category tag.
    OverlapEnter {
        target: TargetId,
        category_tag: String,
    },
    /// A tracked-shape overlap ended.
    OverlapExit { target: TargetId },
    /// Momentary calibration action.
    CalibrateTrigger,
}

/// Snapshot of detector state published after every loop cycle.
#[derive(Debug, Clone)]
pub struct DetectorStatus {
    pub is_held: bool,
    pub target: Option<TargetId>,
    pub audio_mode: AudioMode,
    pub max_distance: f32,
    pub volume: f32,
    pub pitch: f32,
    pub timestamp: DateTime<Local>,
}

impl Default for DetectorStatus {
    fn default() -> Self {
        Self {
            is_held: false,
            target: None,
            audio_mode: AudioMode::Silent,
            max_distance: 0.0,
            volume: 0.0,
            pitch: 1.0,
            timestamp: Local::now(),
        }
    }
}

/// Loop timing configuration.
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Interval between dispatch cycles in milliseconds. Each cycle drains
    /// pending events and runs exactly one tick.
    pub tick_interval_ms: u64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16, // one cycle per rendered frame
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Failed to initialize detector: {0}")]
    InitializationError(String),

    #[error("Failed to receive events: {0}")]
    EventReceiveError(String),

    #[error("Failed to publish status: {0}")]
    PublishError(String),
}

/// Events drained from the channel for one dispatch cycle.
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub events: Vec<DetectorEvent>,
}

#[state]
#[derive(Debug, Clone)]
pub enum LoopState {
    Waiting,
    Dispatching(EventBatch),
    Publishing,
}

#[machine]
pub struct DetectorLoop<S: LoopState> {
    // Receiver for host events
    event_receiver: mpsc::Receiver<DetectorEvent>,

    // Loop settings
    settings: DetectorSettings,

    // The state machine this loop drives
    controller: DetectorController,

    // Watch channel sender for status snapshots
    status_sender: watch::Sender<DetectorStatus>,
}

impl<S: LoopState> DetectorLoop<S> {
    pub fn subscribe(&self) -> watch::Receiver<DetectorStatus> {
        self.status_sender.subscribe()
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }
}

impl DetectorLoop<Waiting> {
    pub fn create(
        event_receiver: mpsc::Receiver<DetectorEvent>,
        controller: DetectorController,
        settings: Option<DetectorSettings>,
    ) -> Result<Self, DetectorError> {
        let settings = settings.unwrap_or_default();
        info!("Creating detector loop with settings: {:?}", settings);

        let (status_sender, _) = watch::channel(DetectorStatus::default());
        debug!("Created watch channel for detector status broadcasts");

        Ok(Self::new(event_receiver, settings, controller, status_sender))
    }

    /// Drains all pending events without blocking and moves to dispatch.
    pub fn collect(mut self) -> Result<DetectorLoop<Dispatching>, DetectorError> {
        let mut events = Vec::new();

        loop {
            match self.event_receiver.try_recv() {
                Ok(event) => {
                    debug!("Received event from host: {:?}", event);
                    events.push(event);
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    error!("Host event channel disconnected!");
                    return Err(DetectorError::EventReceiveError(
                        "Host event channel disconnected".to_string(),
                    ));
                }
            }
        }

        if !events.is_empty() {
            debug!("Collected batch of {} events", events.len());
        }

        Ok(self.transition_with(EventBatch { events }))
    }
}

impl DetectorLoop<Dispatching> {
    /// Applies the batch in arrival order, runs one tick and moves to
    /// publishing.
    pub fn dispatch(mut self) -> Result<DetectorLoop<Publishing>, DetectorError> {
        let events = self
            .get_state_data()
            .map(|batch| batch.events.clone())
            .unwrap_or_default();

        for event in events {
            match event {
                DetectorEvent::HoldStart => self.controller.on_hold_start(),
                DetectorEvent::HoldEnd => self.controller.on_hold_end(),
                DetectorEvent::OverlapEnter {
                    target,
                    category_tag,
                } => self.controller.on_overlap_enter(target, &category_tag),
                DetectorEvent::OverlapExit { target } => self.controller.on_overlap_exit(target),
                DetectorEvent::CalibrateTrigger => self.controller.on_calibrate_trigger(),
            }
        }

        self.controller.tick();

        Ok(self.transition())
    }
}

impl DetectorLoop<Publishing> {
    /// Publishes the post-tick snapshot and returns to waiting.
    pub fn publish(self) -> Result<DetectorLoop<Waiting>, DetectorError> {
        let state = self.controller.state();
        let status = DetectorStatus {
            is_held: state.is_held,
            target: state.current_target.map(|t| t.id),
            audio_mode: state.audio_mode,
            max_distance: state.current_max_distance,
            volume: state.volume,
            pitch: state.pitch,
            timestamp: Local::now(),
        };

        self.status_sender
            .send(status)
            .map_err(|e| DetectorError::PublishError(format!("Failed to send status: {}", e)))?;

        Ok(self.transition())
    }
}

/// Handle for the running detector task.
///
/// The spawned task is fire-and-forget; it runs until the host drops its
/// event sender, at which point the loop ends with a receive error.
pub struct DetectorHandle {
    status_receiver: watch::Receiver<DetectorStatus>,
}

impl DetectorHandle {
    /// Builds the controller from config and collaborators and spawns the
    /// dispatch loop as a tokio task.
    pub fn spawn(
        settings: Option<DetectorSettings>,
        event_receiver: mpsc::Receiver<DetectorEvent>,
        config: &DetectorConfig,
        scene: Box<dyn SceneQuery + Send>,
        audio: Box<dyn AudioSink + Send>,
    ) -> Result<Self, DetectorError> {
        info!("Spawning detector with settings: {:?}", settings);

        let controller = DetectorController::new(config, scene, audio);
        let detector_loop = DetectorLoop::create(event_receiver, controller, settings)?;
        let status_receiver = detector_loop.subscribe();

        tokio::spawn(async move {
            info!("Detector task started");
            if let Err(e) = run_detector_loop(detector_loop).await {
                error!("Detector task terminated: {}", e);
            }
        });

        info!("Detector successfully started");
        Ok(Self { status_receiver })
    }

    pub fn subscribe(&self) -> watch::Receiver<DetectorStatus> {
        self.status_receiver.clone()
    }
}

async fn run_detector_loop(mut detector: DetectorLoop<Waiting>) -> Result<(), DetectorError> {
    let tick_interval_ms = detector.settings().tick_interval_ms;
    info!("Starting detector loop with {}ms tick interval", tick_interval_ms);

    let mut interval_timer =
        tokio::time::interval(tokio::time::Duration::from_millis(tick_interval_ms));

    loop {
        interval_timer.tick().await;

        let dispatching = detector.collect()?;
        let publishing = dispatching.dispatch()?;
        detector = publishing.publish()?;
    }
}
