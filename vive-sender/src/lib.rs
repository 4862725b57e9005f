//! Vive tracker pose producer.
//! Pulls pose ticks from an upstream source, frames them and keeps a reconnecting TCP stream
//! to the receiver alive; plus a synthetic producer for running without hardware.

pub mod capture;
pub mod config;
pub mod producer;
pub mod source;
pub mod synthetic;

pub use capture::{CaptureError, CaptureRuntime, CaptureSession};
pub use producer::{Producer, ProducerConfig, ProducerExit, ProducerState};
pub use source::{build_frame, PoseSample, PoseSource, Tick};
pub use synthetic::{send_frames, synthetic_frame, SyntheticRuntime, SyntheticSource};
