//! Detection and feedback subsystem for the handheld proximity sensor
//!
//! Two layers:
//!
//! 1. [`controller`] - The detection & feedback state machine
//! 2. [`detector_handle`] - Event dispatch loop and host-facing API
//!
//! # Architecture
//!
//! ```text
//! Interaction/Physics ──► DetectorEvent ──► DetectorController ──► AudioSink
//!       (host)             (mpsc channel)    (target + range         (clip,
//!                                             + audio params)     vol, pitch)
//!                                                  │
//!                                                  └──► DetectorStatus (watch)
//! ```
//!
//! The controller sees the world only through the `SceneQuery` and
//! `AudioSink` collaborator traits; the handle owns the single task all
//! state mutation happens on.

pub mod controller;
pub mod detector_handle;
