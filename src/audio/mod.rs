//! Audio collaborator interface for the detector
//!
//! The detector does not synthesize sound; it hands clip identity, volume
//! and pitch to an [`AudioSink`] and reads back playback state. The core
//! never calls `play()` redundantly while the same clip is already playing;
//! volume and pitch are updated in place through the setters during tick.

#[cfg(test)]
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Opaque identity of an audio clip.
///
/// The detector only compares clips for equality to decide whether a play
/// request would be redundant and whether the calibration clip is active.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClipId(pub String);

impl ClipId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback device the detector drives.
///
/// Volume is expected in `[0, 1]`, pitch strictly positive. `stop()` and
/// `play()` are idempotent from the device's point of view; the detector
/// guards against redundant calls on its side.
pub trait AudioSink {
    fn set_clip(&mut self, clip: ClipId);
    fn set_volume(&mut self, volume: f32);
    fn set_pitch(&mut self, pitch: f32);
    fn play(&mut self);
    fn stop(&mut self);
    fn is_playing(&self) -> bool;
    fn current_clip(&self) -> Option<ClipId>;
}

/// Logging stand-in for a real playback device.
///
/// Play/stop transitions log at info, parameter updates at debug so the
/// per-tick volume/pitch stream stays out of the default log level.
#[derive(Debug, Default)]
pub struct TracingAudio {
    clip: Option<ClipId>,
    volume: f32,
    pitch: f32,
    playing: bool,
}

impl AudioSink for TracingAudio {
    fn set_clip(&mut self, clip: ClipId) {
        debug!("Audio clip set to {}", clip);
        self.clip = Some(clip);
    }

    fn set_volume(&mut self, volume: f32) {
        debug!("Audio volume set to {:.3}", volume);
        self.volume = volume;
    }

    fn set_pitch(&mut self, pitch: f32) {
        debug!("Audio pitch set to {:.3}", pitch);
        self.pitch = pitch;
    }

    fn play(&mut self) {
        match &self.clip {
            Some(clip) => info!(
                "Audio playing: clip={} volume={:.2} pitch={:.2}",
                clip, self.volume, self.pitch
            ),
            None => info!("Audio play requested with no clip set"),
        }
        self.playing = true;
    }

    fn stop(&mut self) {
        if self.playing {
            info!("Audio stopped");
        }
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn current_clip(&self) -> Option<ClipId> {
        self.clip.clone()
    }
}

/// One recorded call against a [`RecordingAudio`] sink.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCall {
    SetClip(ClipId),
    SetVolume(f32),
    SetPitch(f32),
    Play,
    Stop,
}

/// Test double that records every call and exposes the device state.
///
/// Cloning shares the underlying log, so a test can keep a handle after
/// moving the sink into the detector.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingAudio {
    inner: Arc<Mutex<RecordingState>>,
}

#[cfg(test)]
#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<AudioCall>,
    clip: Option<ClipId>,
    volume: f32,
    pitch: f32,
    playing: bool,
}

#[cfg(test)]
impl RecordingAudio {
    pub fn calls(&self) -> Vec<AudioCall> {
        self.inner.lock().expect("audio log lock").calls.clone()
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().expect("audio log lock").volume
    }

    pub fn pitch(&self) -> f32 {
        self.inner.lock().expect("audio log lock").pitch
    }

    /// Simulates the device reaching the end of a one-shot clip.
    pub fn finish_playback(&self) {
        self.inner.lock().expect("audio log lock").playing = false;
    }
}

#[cfg(test)]
impl AudioSink for RecordingAudio {
    fn set_clip(&mut self, clip: ClipId) {
        let mut state = self.inner.lock().expect("audio log lock");
        state.calls.push(AudioCall::SetClip(clip.clone()));
        state.clip = Some(clip);
    }

    fn set_volume(&mut self, volume: f32) {
        let mut state = self.inner.lock().expect("audio log lock");
        state.calls.push(AudioCall::SetVolume(volume));
        state.volume = volume;
    }

    fn set_pitch(&mut self, pitch: f32) {
        let mut state = self.inner.lock().expect("audio log lock");
        state.calls.push(AudioCall::SetPitch(pitch));
        state.pitch = pitch;
    }

    fn play(&mut self) {
        let mut state = self.inner.lock().expect("audio log lock");
        state.calls.push(AudioCall::Play);
        state.playing = true;
    }

    fn stop(&mut self) {
        let mut state = self.inner.lock().expect("audio log lock");
        state.calls.push(AudioCall::Stop);
        state.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.inner.lock().expect("audio log lock").playing
    }

    fn current_clip(&self) -> Option<ClipId> {
        self.inner.lock().expect("audio log lock").clip.clone()
    }
}
