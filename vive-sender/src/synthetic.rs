//! Synthetic producer: deterministic poses with no tracking hardware.
//!
//! For frame `i` and tracker `j` the pose is
//! `(0.1*j + 0.001*i, 0.2*j + 0.001*i, 0.3*j + 0.001*i)` with identity orientation, and frame
//! timestamps advance 1 ms per frame from a base time.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use vive_core::{encode_payload, write_frame, Frame, TransportError, IDENTITY_ORIENTATION};

use crate::capture::{CaptureError, CaptureRuntime};
use crate::producer::{connect, DEFAULT_CONNECT_TIMEOUT};
use crate::source::{build_frame, PoseSample, PoseSource, Tick};

/// Timestamp step between consecutive synthetic frames.
pub const FRAME_INTERVAL_NS: u64 = 1_000_000;

/// Deterministic samples for frame `index`, one per role, all captured.
pub fn synthetic_samples(index: u64, roles: &[String]) -> Vec<PoseSample> {
    let drift = 0.001 * index as f64;
    roles
        .iter()
        .enumerate()
        .map(|(j, role)| {
            let j = j as f64;
            PoseSample::captured(
                role.clone(),
                [0.1 * j + drift, 0.2 * j + drift, 0.3 * j + drift],
                IDENTITY_ORIENTATION,
            )
        })
        .collect()
}

pub fn synthetic_frame(index: u64, roles: &[String], base_time_ns: u64) -> Frame {
    build_frame(
        synthetic_samples(index, roles),
        base_time_ns.wrapping_add(index.wrapping_mul(FRAME_INTERVAL_NS)),
    )
}

/// Delay between sends for a rate in Hz. `None` (as fast as possible) for `hz <= 0` or NaN;
/// rates too slow to represent wait `Duration::MAX`.
pub fn send_interval(hz: f64) -> Option<Duration> {
    if hz > 0.0 {
        Some(Duration::try_from_secs_f64(1.0 / hz).unwrap_or(Duration::MAX))
    } else {
        None
    }
}

/// Connect once, send `frames` synthetic frames paced at `hz`, then close.
/// Returns how many frames were written.
pub async fn send_frames(
    addr: &str,
    roles: &[String],
    frames: u64,
    hz: f64,
) -> Result<u64, TransportError> {
    let interval = send_interval(hz);
    let base_time_ns = crate::source::wall_clock_ns();
    let mut stream = connect(addr, DEFAULT_CONNECT_TIMEOUT).await?;
    info!(%addr, frames, hz, "mock sender connected");
    for index in 0..frames {
        let frame = synthetic_frame(index, roles, base_time_ns);
        write_frame(&mut stream, &encode_payload(&frame)).await?;
        debug!(index, timestamp_ns = frame.timestamp_ns, "sent synthetic frame");
        if let Some(delay) = interval {
            tokio::time::sleep(delay).await;
        }
    }
    stream.shutdown().await?;
    Ok(frames)
}

/// Paced tick source with synthetic poses. `limit` bounds the number of ticks; `None`
/// streams forever.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    roles: Vec<String>,
    interval: Option<Duration>,
    limit: Option<u64>,
    index: u64,
}

impl SyntheticSource {
    pub fn new(roles: Vec<String>, hz: f64, limit: Option<u64>) -> Self {
        Self {
            roles,
            interval: send_interval(hz),
            limit,
            index: 0,
        }
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn ticks_produced(&self) -> u64 {
        self.index
    }
}

impl PoseSource for SyntheticSource {
    async fn next_tick(&mut self) -> Tick {
        if self.limit.is_some_and(|limit| self.index >= limit) {
            return Tick::SessionEnded;
        }
        if self.index > 0 {
            if let Some(delay) = self.interval {
                tokio::time::sleep(delay).await;
            }
        }
        let samples = synthetic_samples(self.index, &self.roles);
        self.index += 1;
        Tick::Samples(samples)
    }
}

/// `CaptureRuntime` backed by a `SyntheticSource`, for running the capture path without a
/// headset attached.
pub struct SyntheticRuntime {
    source: SyntheticSource,
}

impl SyntheticRuntime {
    pub fn new(source: SyntheticSource) -> Self {
        Self { source }
    }
}

impl CaptureRuntime for SyntheticRuntime {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.source.roles().is_empty() {
            return Err(CaptureError::Open("no tracker roles configured".into()));
        }
        info!(roles = ?self.source.roles(), "synthetic capture runtime ready");
        Ok(())
    }

    async fn wait_tick(&mut self) -> Tick {
        self.source.next_tick().await
    }

    fn close(&mut self) {
        debug!(
            ticks = self.source.ticks_produced(),
            "synthetic capture runtime released"
        );
    }
}
