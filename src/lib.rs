pub mod audio;
pub mod config;
pub mod detector;
pub mod scene;

pub use audio::{AudioSink, ClipId, TracingAudio};
pub use config::{DetectionProfile, DetectorConfig};
pub use detector::controller::{AudioMode, DetectorController, TargetCategory};
pub use detector::detector_handle::{
    DetectorEvent, DetectorHandle, DetectorSettings, DetectorStatus,
};
pub use scene::{SceneQuery, SimScene, SurfaceHit, TargetId};
