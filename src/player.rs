//! Playback: the controller state machine, the output seam, and the rodio
//! backend that drives the actual audio device.

mod controller;
mod output;
mod rodio_backend;

pub use controller::PlayerController;
pub use output::{AudioOutput, AudioOutputFactory, OutputError, OutputEvent};
pub use rodio_backend::RodioOutputFactory;
