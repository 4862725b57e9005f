//! Upstream pose source: what the producer pulls one tick at a time.

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use vive_core::{Frame, TrackerPose};

/// One tracker reading for a tick. `captured` is false when the runtime had no valid
/// position for the tracker this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSample {
    pub role: String,
    pub position: [f64; 3],
    pub orientation: [f64; 4],
    pub captured: bool,
}

impl PoseSample {
    pub fn captured(role: impl Into<String>, position: [f64; 3], orientation: [f64; 4]) -> Self {
        Self {
            role: role.into(),
            position,
            orientation,
            captured: true,
        }
    }

    pub fn missing(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            position: [0.0; 3],
            orientation: vive_core::IDENTITY_ORIENTATION,
            captured: false,
        }
    }
}

/// Result of asking a source for its next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    Samples(Vec<PoseSample>),
    SessionEnded,
}

/// Externally paced producer of pose ticks. `next_tick` may suspend until the runtime has
/// a frame ready.
pub trait PoseSource {
    fn next_tick(&mut self) -> impl Future<Output = Tick> + Send;
}

/// Channel-fed source: whoever owns the sender pushes one sample set per tick. Closing the
/// channel ends the session.
impl PoseSource for mpsc::Receiver<Vec<PoseSample>> {
    async fn next_tick(&mut self) -> Tick {
        match self.recv().await {
            Some(samples) => Tick::Samples(samples),
            None => Tick::SessionEnded,
        }
    }
}

/// Build a frame from one tick, keeping only captured samples in observation order.
pub fn build_frame(samples: Vec<PoseSample>, timestamp_ns: u64) -> Frame {
    let trackers = samples
        .into_iter()
        .filter(|s| s.captured)
        .map(|s| TrackerPose::new(s.role, s.position, s.orientation))
        .collect();
    Frame::new(timestamp_ns, trackers)
}

/// Wall-clock nanoseconds since the Unix epoch (0 if the clock is before the epoch).
pub fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_frame_drops_uncaptured() {
        let samples = vec![
            PoseSample::captured("right_elbow", [1.0, 2.0, 3.0], [1.0, 0.0, 0.0, 0.0]),
            PoseSample::missing("left_elbow"),
            PoseSample::captured("chest", [-1.0, 0.5, 0.0], [0.0, 1.0, 0.0, 0.0]),
        ];
        let frame = build_frame(samples, 99);
        assert_eq!(frame.timestamp_ns, 99);
        let roles: Vec<&str> = frame.trackers.iter().map(|t| t.role.as_str()).collect();
        assert_eq!(roles, ["right_elbow", "chest"]);
        assert_eq!(frame.trackers[1].orientation(), [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn build_frame_all_missing_is_empty() {
        let frame = build_frame(vec![PoseSample::missing("chest")], 1);
        assert!(frame.is_empty());
    }

    #[tokio::test]
    async fn channel_source_ends_when_closed() {
        let (tx, mut rx) = mpsc::channel(2);
        tx.send(vec![PoseSample::missing("chest")]).await.unwrap();
        drop(tx);
        assert!(matches!(rx.next_tick().await, Tick::Samples(s) if s.len() == 1));
        assert_eq!(rx.next_tick().await, Tick::SessionEnded);
    }
}
