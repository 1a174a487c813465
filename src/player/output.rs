//! The output-resource seam between the playback controller and the audio
//! device.
//!
//! The controller never talks to an audio device directly; it drives an
//! [`AudioOutput`] created per playback session and listens to its event
//! channel. Keeping the seam a trait is what lets the state machine be
//! exercised in tests with a scripted output.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Events emitted by an output resource while a source is bound.
///
/// All four are routed through the controller's single event pump; they are
/// attached and detached as a unit, so teardown can never leave a partial
/// listener set behind.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputEvent {
    /// Periodic position report, in seconds.
    Position(f64),
    /// Track duration resolved from the source metadata, in seconds.
    Duration(f64),
    /// The bound source played to its natural end.
    Ended,
    /// The output failed (decode error, device failure, unsupported source).
    Error(String),
}

/// Failure taxonomy for output operations.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum OutputError {
    /// A start request was rejected pending user interaction. Recoverable:
    /// the user retriggers play; never treated as a playback fault.
    #[error("playback blocked pending user interaction")]
    Blocked,
    /// The source could not be fetched or decoded.
    #[error("failed to load source: {0}")]
    Load(String),
    /// Playback failed after the source was bound.
    #[error("playback failed: {0}")]
    Playback(String),
}

/// One live output resource. Exactly one exists per playback session.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Bind a source and wait until enough is buffered to play it through.
    async fn load(&self, url: &str) -> Result<(), OutputError>;

    /// Issue a start request. Resolves when the request settles.
    async fn play(&self) -> Result<(), OutputError>;

    /// Resume a suspended output channel before a start request. A no-op on
    /// backends whose device channel never suspends.
    async fn resume_channel(&self) -> Result<(), OutputError>;

    fn pause(&self);

    /// Volume in `[0.0, 1.0]`. Callers clamp before applying.
    fn set_volume(&self, volume: f32);

    fn set_position(&self, seconds: f64);

    /// Stop playback and release the bound source. The resource is dead
    /// afterwards; its event channel closes.
    fn release(&self);

    /// Take the event stream for this resource. Yields `Some` exactly once.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<OutputEvent>>;
}

/// Creates one output resource per playback session.
pub trait AudioOutputFactory: Send + Sync {
    fn create(&self) -> Arc<dyn AudioOutput>;
}
