use tracing::{debug, info};

use crate::audio::{AudioSink, ClipId};
use crate::config::{DetectorConfig, ProfileConfig, TagConfig};
use crate::scene::{SceneQuery, TargetId};

/// Classification of a detected object, derived from the category tag the
/// physics collaborator supplies on overlap. Tags that match neither
/// category are ignored entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetCategory {
    Danger,
    Scrap,
}

/// Which clip/volume/pitch policy is active.
///
/// `Calibrating` takes precedence over `Tracking` and `Silent`: a newly
/// entered target never interrupts an in-progress calibration clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    Silent,
    Tracking(TargetCategory),
    Calibrating,
}

/// The currently tracked target: opaque handle plus the category it
/// entered with. Position is resolved per tick through the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedTarget {
    pub id: TargetId,
    pub category: TargetCategory,
}

/// Live state of the device. Mutated exclusively by the controller's
/// event and tick entry points.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorState {
    pub is_held: bool,
    pub current_target: Option<TrackedTarget>,
    /// Active detection radius, always one of the configured profile
    /// values. Set by calibration, used to normalize distance into [0, 1].
    pub current_max_distance: f32,
    pub audio_mode: AudioMode,
    /// Last derived audio parameters, for status reporting.
    pub volume: f32,
    pub pitch: f32,
}

/// Single authority over target tracking, range calibration and audio
/// parameter derivation.
///
/// All entry points run to completion without interleaving; the host
/// drives them from one task (see `detector_handle`). Nothing here is an
/// error: a calibration miss, an exit for a target that is not tracked, or
/// an unclassified overlap simply preserve the last valid state.
pub struct DetectorController {
    scene: Box<dyn SceneQuery + Send>,
    audio: Box<dyn AudioSink + Send>,

    profiles: ProfileConfig,
    tags: TagConfig,
    danger_clip: ClipId,
    scrap_clip: ClipId,
    calibration_clip: ClipId,
    calibration_ray_length: f32,

    state: DetectorState,
}

impl DetectorController {
    /// Creates the detector with the default ground profile applied.
    pub fn new(
        config: &DetectorConfig,
        scene: Box<dyn SceneQuery + Send>,
        audio: Box<dyn AudioSink + Send>,
    ) -> Self {
        info!(
            "Creating detector: ground range {:.2}m, asphalt range {:.2}m",
            config.profiles.ground.range, config.profiles.asphalt.range
        );
        Self {
            scene,
            audio,
            profiles: config.profiles.clone(),
            tags: config.tags.clone(),
            danger_clip: config.clips.danger_clip(),
            scrap_clip: config.clips.scrap_clip(),
            calibration_clip: config.clips.calibration_clip(),
            calibration_ray_length: config.calibration_ray_length,
            state: DetectorState {
                is_held: false,
                current_target: None,
                current_max_distance: config.profiles.ground.range,
                audio_mode: AudioMode::Silent,
                volume: 0.0,
                pitch: 1.0,
            },
        }
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Device picked up. Idempotent if already held.
    pub fn on_hold_start(&mut self) {
        if !self.state.is_held {
            info!("Detector picked up");
        }
        self.state.is_held = true;
    }

    /// Device put down. Clears the tracked target and silences tracking
    /// audio; an in-progress calibration clip is allowed to finish.
    pub fn on_hold_end(&mut self) {
        info!("Detector released");
        self.state.is_held = false;
        self.state.current_target = None;
        if self.calibration_audio_active() {
            debug!("Calibration clip still playing, letting it finish");
        } else {
            self.state.audio_mode = AudioMode::Silent;
            self.audio.stop();
        }
    }

    /// Overlap began for `id`, carrying the collaborator's category tag.
    ///
    /// Last-enter-wins: a second qualifying target replaces the current one
    /// with no distance arbitration. While the calibration clip plays the
    /// target is still acquired but the clip and mode are left untouched.
    pub fn on_overlap_enter(&mut self, id: TargetId, category_tag: &str) {
        if !self.state.is_held {
            debug!("Overlap enter for {:?} ignored, detector not held", id);
            return;
        }
        let Some(category) = self.classify(category_tag) else {
            debug!("Overlap enter for {:?} ignored, tag {:?} unclassified", id, category_tag);
            return;
        };

        debug!("Tracking target {:?} as {:?}", id, category);
        self.state.current_target = Some(TrackedTarget { id, category });

        if self.calibration_audio_active() {
            debug!("Calibration audio has priority, clip unchanged");
            return;
        }

        self.state.audio_mode = AudioMode::Tracking(category);
        self.start_clip(self.clip_for(category));
    }

    /// Overlap ended for `id`. Ignored unless `id` is the tracked target.
    pub fn on_overlap_exit(&mut self, id: TargetId) {
        match self.state.current_target {
            Some(target) if target.id == id => {}
            _ => {
                debug!("Overlap exit for {:?} ignored, not the tracked target", id);
                return;
            }
        }

        debug!("Tracked target {:?} left detection range", id);
        self.state.current_target = None;
        self.state.audio_mode = AudioMode::Silent;
        if self.audio.current_clip() != Some(self.calibration_clip.clone()) {
            self.audio.stop();
        }
    }

    /// Per-frame update: derives volume and pitch from the tracked
    /// target's distance and keeps playback running.
    pub fn tick(&mut self) {
        if !self.state.is_held {
            // Never emit tracking sound while released; a calibration clip
            // may finish on its own.
            if self.audio.is_playing()
                && self.audio.current_clip() != Some(self.calibration_clip.clone())
            {
                self.audio.stop();
            }
            return;
        }

        let Some(target) = self.state.current_target else {
            // Held with nothing tracked: silence persists, no stop re-issued.
            if self.state.audio_mode == AudioMode::Calibrating && !self.audio.is_playing() {
                self.state.audio_mode = AudioMode::Silent;
            }
            return;
        };

        let Some(position) = self.scene.position_of(target.id) else {
            debug!("No position for {:?} this frame, state preserved", target.id);
            return;
        };

        let dist = position.distance(self.scene.probe_point());
        let t = (dist / self.state.current_max_distance).clamp(0.0, 1.0);
        self.state.volume = 1.0 - t;
        self.state.pitch = 1.0 + (1.0 - t) * 2.0;
        self.audio.set_volume(self.state.volume);
        self.audio.set_pitch(self.state.pitch);

        if !self.audio.is_playing() {
            // Playback never started, or a one-shot calibration clip just
            // ended; either way the category clip takes over now.
            self.state.audio_mode = AudioMode::Tracking(target.category);
            self.start_clip(self.clip_for(target.category));
        }
    }

    /// Momentary calibration action: classify the surface under the probe
    /// and switch to its detection profile.
    ///
    /// A ray miss or an unrecognized surface tag drops the request and
    /// preserves the current range and audio.
    pub fn on_calibrate_trigger(&mut self) {
        let origin = self.scene.probe_point();
        let Some(hit) = self.scene.raycast_down(origin, self.calibration_ray_length) else {
            debug!("Calibration ray missed, keeping current range");
            return;
        };

        let (profile, pitch) = if hit.tag == self.tags.asphalt {
            (self.profiles.asphalt.clone(), 1.5)
        } else if hit.tag == self.tags.ground {
            (self.profiles.ground.clone(), 1.0)
        } else {
            debug!("Surface tag {:?} not calibratable, keeping current range", hit.tag);
            return;
        };

        info!(
            "Calibrated to {} profile: range {:.2}m, confirmation pitch {:.1}",
            profile.name, profile.range, pitch
        );
        self.apply_calibration(profile.range);
        self.state.audio_mode = AudioMode::Calibrating;
        self.state.volume = 1.0;
        self.state.pitch = pitch;
        // Calibration feedback interrupts any current tracking sound.
        self.audio.set_clip(self.calibration_clip.clone());
        self.audio.set_volume(1.0);
        self.audio.set_pitch(pitch);
        self.audio.play();
    }

    /// Pure state update: sets the active detection radius. Does not touch
    /// audio.
    pub fn apply_calibration(&mut self, range: f32) {
        self.state.current_max_distance = range;
    }

    fn classify(&self, tag: &str) -> Option<TargetCategory> {
        if tag == self.tags.danger {
            Some(TargetCategory::Danger)
        } else if tag == self.tags.scrap {
            Some(TargetCategory::Scrap)
        } else {
            None
        }
    }

    fn clip_for(&self, category: TargetCategory) -> ClipId {
        match category {
            TargetCategory::Danger => self.danger_clip.clone(),
            TargetCategory::Scrap => self.scrap_clip.clone(),
        }
    }

    fn calibration_audio_active(&self) -> bool {
        self.state.audio_mode == AudioMode::Calibrating && self.audio.is_playing()
    }

    /// Starts `clip` unless it is already the playing clip; never calls
    /// play() redundantly for an unchanged identity.
    fn start_clip(&mut self, clip: ClipId) {
        if self.audio.is_playing() && self.audio.current_clip() == Some(clip.clone()) {
            return;
        }
        self.audio.set_clip(clip);
        self.audio.play();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioCall, RecordingAudio};
    use crate::scene::SimScene;
    use glam::Vec3;

    fn danger_tag() -> String {
        DetectorConfig::default().tags.danger
    }

    fn scrap_tag() -> String {
        DetectorConfig::default().tags.scrap
    }

    fn make_detector() -> (DetectorController, SimScene, RecordingAudio) {
        let config = DetectorConfig::default();
        let scene = SimScene::new(Vec3::ZERO);
        let audio = RecordingAudio::default();
        let detector =
            DetectorController::new(&config, Box::new(scene.clone()), Box::new(audio.clone()));
        (detector, scene, audio)
    }

    fn stop_count(audio: &RecordingAudio) -> usize {
        audio
            .calls()
            .iter()
            .filter(|c| matches!(c, AudioCall::Stop))
            .count()
    }

    fn play_count(audio: &RecordingAudio) -> usize {
        audio
            .calls()
            .iter()
            .filter(|c| matches!(c, AudioCall::Play))
            .count()
    }

    #[test]
    fn tick_at_zero_distance_is_loud_and_high() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.place_target(TargetId(1), Vec3::ZERO);
        detector.on_overlap_enter(TargetId(1), &danger_tag());
        detector.tick();

        assert_eq!(audio.volume(), 1.0);
        assert_eq!(audio.pitch(), 3.0);
        assert_eq!(audio.current_clip(), Some(ClipId::new("danger_beep")));
    }

    #[test]
    fn tick_beyond_max_distance_is_silent_at_base_pitch() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.place_target(TargetId(1), Vec3::new(0.0, 0.0, 1.5)); // ground range is 1.0
        detector.on_overlap_enter(TargetId(1), &danger_tag());
        detector.tick();

        assert_eq!(audio.volume(), 0.0);
        assert_eq!(audio.pitch(), 1.0);
    }

    #[test]
    fn volume_is_monotonically_non_increasing_in_distance() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.place_target(TargetId(1), Vec3::ZERO);
        detector.on_overlap_enter(TargetId(1), &scrap_tag());

        let mut prev = f32::MAX;
        for step in 0..12 {
            scene.place_target(TargetId(1), Vec3::new(0.0, 0.0, step as f32 * 0.1));
            detector.tick();
            let volume = audio.volume();
            assert!(
                volume <= prev,
                "volume increased with distance at step {step}"
            );
            assert!((0.0..=1.0).contains(&volume));
            prev = volume;
        }
    }

    #[test]
    fn overlap_enter_while_not_held_is_ignored() {
        let (mut detector, scene, audio) = make_detector();
        scene.place_target(TargetId(1), Vec3::ZERO);
        detector.on_overlap_enter(TargetId(1), &danger_tag());

        assert_eq!(detector.state().current_target, None);
        assert_eq!(detector.state().audio_mode, AudioMode::Silent);
        assert!(audio.calls().is_empty());
    }

    #[test]
    fn unclassified_tag_acquires_nothing() {
        let (mut detector, _scene, audio) = make_detector();
        detector.on_hold_start();
        detector.on_overlap_enter(TargetId(1), "Debris");

        assert_eq!(detector.state().current_target, None);
        assert!(audio.calls().is_empty());
    }

    #[test]
    fn release_always_clears_target_and_stops_audio() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.place_target(TargetId(1), Vec3::ZERO);
        detector.on_overlap_enter(TargetId(1), &danger_tag());
        detector.on_hold_end();

        assert!(!detector.state().is_held);
        assert_eq!(detector.state().current_target, None);
        assert_eq!(detector.state().audio_mode, AudioMode::Silent);
        assert_eq!(stop_count(&audio), 1);
    }

    #[test]
    fn release_does_not_cut_off_calibration_clip() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.set_surface_below(Some(("Ground".to_string(), 0.5)));
        detector.on_calibrate_trigger();
        detector.on_hold_end();

        assert_eq!(detector.state().audio_mode, AudioMode::Calibrating);
        assert_eq!(stop_count(&audio), 0);
        assert!(audio.is_playing());

        // Released ticks never stop the calibration clip either.
        detector.tick();
        assert_eq!(stop_count(&audio), 0);
    }

    #[test]
    fn ground_calibration_applies_ground_profile() {
        let (mut detector, scene, audio) = make_detector();
        detector.apply_calibration(0.3);
        scene.set_surface_below(Some(("Ground".to_string(), 0.5)));
        detector.on_calibrate_trigger();

        assert_eq!(detector.state().current_max_distance, 1.0);
        assert_eq!(detector.state().audio_mode, AudioMode::Calibrating);
        assert_eq!(audio.current_clip(), Some(ClipId::new("calibration_chirp")));
        assert_eq!(audio.pitch(), 1.0);
        assert_eq!(audio.volume(), 1.0);
    }

    #[test]
    fn asphalt_calibration_applies_asphalt_profile() {
        let (mut detector, scene, audio) = make_detector();
        scene.set_surface_below(Some(("Asphalt".to_string(), 0.5)));
        detector.on_calibrate_trigger();

        assert_eq!(detector.state().current_max_distance, 0.3);
        assert_eq!(audio.pitch(), 1.5);
        assert_eq!(audio.volume(), 1.0);
    }

    #[test]
    fn calibration_miss_preserves_range_and_audio() {
        let (mut detector, _scene, audio) = make_detector();
        detector.on_calibrate_trigger();

        assert_eq!(detector.state().current_max_distance, 1.0);
        assert_eq!(detector.state().audio_mode, AudioMode::Silent);
        assert!(audio.calls().is_empty());
    }

    #[test]
    fn unrecognized_surface_tag_preserves_range_and_audio() {
        let (mut detector, scene, audio) = make_detector();
        scene.set_surface_below(Some(("Gravel".to_string(), 0.5)));
        detector.on_calibrate_trigger();

        assert_eq!(detector.state().current_max_distance, 1.0);
        assert!(audio.calls().is_empty());
    }

    #[test]
    fn surface_beyond_ray_length_is_a_miss() {
        let (mut detector, scene, audio) = make_detector();
        scene.set_surface_below(Some(("Asphalt".to_string(), 2.5))); // ray length is 2.0
        detector.on_calibrate_trigger();

        assert_eq!(detector.state().current_max_distance, 1.0);
        assert!(audio.calls().is_empty());
    }

    #[test]
    fn last_enter_wins_and_exit_matches_by_identity() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.place_target(TargetId(1), Vec3::ZERO);
        scene.place_target(TargetId(2), Vec3::new(0.0, 0.0, 0.8));

        detector.on_overlap_enter(TargetId(1), &danger_tag());
        detector.tick();
        assert_eq!(audio.volume(), 1.0);
        assert_eq!(audio.pitch(), 3.0);
        assert_eq!(audio.current_clip(), Some(ClipId::new("danger_beep")));

        // A farther scrap target replaces the danger target outright.
        detector.on_overlap_enter(TargetId(2), &scrap_tag());
        assert_eq!(
            detector.state().current_target,
            Some(TrackedTarget {
                id: TargetId(2),
                category: TargetCategory::Scrap
            })
        );
        assert_eq!(audio.current_clip(), Some(ClipId::new("scrap_beep")));

        // Exit of the replaced target is a no-op.
        detector.on_overlap_exit(TargetId(1));
        assert!(detector.state().current_target.is_some());
        assert_eq!(stop_count(&audio), 0);

        // Exit of the tracked target clears and stops.
        detector.on_overlap_exit(TargetId(2));
        assert_eq!(detector.state().current_target, None);
        assert_eq!(detector.state().audio_mode, AudioMode::Silent);
        assert_eq!(stop_count(&audio), 1);
    }

    #[test]
    fn calibration_audio_outranks_new_targets() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.set_surface_below(Some(("Ground".to_string(), 0.5)));
        detector.on_calibrate_trigger();
        let plays_before = play_count(&audio);

        scene.place_target(TargetId(1), Vec3::ZERO);
        detector.on_overlap_enter(TargetId(1), &danger_tag());

        // Target is acquired but the calibration clip keeps playing.
        assert!(detector.state().current_target.is_some());
        assert_eq!(detector.state().audio_mode, AudioMode::Calibrating);
        assert_eq!(audio.current_clip(), Some(ClipId::new("calibration_chirp")));
        assert_eq!(play_count(&audio), plays_before);
    }

    #[test]
    fn tracking_resumes_after_calibration_clip_ends() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.set_surface_below(Some(("Ground".to_string(), 0.5)));
        detector.on_calibrate_trigger();
        scene.place_target(TargetId(1), Vec3::ZERO);
        detector.on_overlap_enter(TargetId(1), &danger_tag());

        audio.finish_playback();
        detector.tick();

        assert_eq!(
            detector.state().audio_mode,
            AudioMode::Tracking(TargetCategory::Danger)
        );
        assert_eq!(audio.current_clip(), Some(ClipId::new("danger_beep")));
        assert!(audio.is_playing());
    }

    #[test]
    fn calibration_mode_settles_to_silent_with_no_target() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.set_surface_below(Some(("Asphalt".to_string(), 0.5)));
        detector.on_calibrate_trigger();

        audio.finish_playback();
        detector.tick();

        assert_eq!(detector.state().audio_mode, AudioMode::Silent);
        assert!(!audio.is_playing());
    }

    #[test]
    fn exit_during_calibration_clip_does_not_stop_it() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.set_surface_below(Some(("Ground".to_string(), 0.5)));
        detector.on_calibrate_trigger();
        scene.place_target(TargetId(1), Vec3::ZERO);
        detector.on_overlap_enter(TargetId(1), &danger_tag());

        detector.on_overlap_exit(TargetId(1));
        assert_eq!(detector.state().current_target, None);
        assert_eq!(stop_count(&audio), 0);
        assert!(audio.is_playing());
    }

    #[test]
    fn same_clip_is_never_replayed_redundantly() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.place_target(TargetId(1), Vec3::ZERO);
        scene.place_target(TargetId(2), Vec3::new(0.0, 0.0, 0.2));

        detector.on_overlap_enter(TargetId(1), &danger_tag());
        detector.on_overlap_enter(TargetId(2), &danger_tag());
        detector.tick();
        detector.tick();

        assert_eq!(play_count(&audio), 1);
    }

    #[test]
    fn unknown_position_preserves_state_for_the_frame() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.place_target(TargetId(1), Vec3::new(0.0, 0.0, 0.5));
        detector.on_overlap_enter(TargetId(1), &danger_tag());
        detector.tick();
        let volume_before = audio.volume();

        scene.remove_target(TargetId(1));
        detector.tick();

        assert!(detector.state().current_target.is_some());
        assert_eq!(audio.volume(), volume_before);
    }

    #[test]
    fn held_with_no_target_issues_no_redundant_stops() {
        let (mut detector, scene, audio) = make_detector();
        detector.on_hold_start();
        scene.place_target(TargetId(1), Vec3::ZERO);
        detector.on_overlap_enter(TargetId(1), &danger_tag());
        detector.on_overlap_exit(TargetId(1));
        let stops = stop_count(&audio);

        detector.tick();
        detector.tick();
        assert_eq!(stop_count(&audio), stops);
    }

    #[test]
    fn hold_start_is_idempotent() {
        let (mut detector, _scene, _audio) = make_detector();
        detector.on_hold_start();
        detector.on_hold_start();
        assert!(detector.state().is_held);
    }

    #[test]
    fn apply_calibration_touches_range_only() {
        let (mut detector, _scene, audio) = make_detector();
        detector.apply_calibration(0.3);

        assert_eq!(detector.state().current_max_distance, 0.3);
        assert_eq!(detector.state().audio_mode, AudioMode::Silent);
        assert!(audio.calls().is_empty());
    }

}
