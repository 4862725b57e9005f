//! Scoped capture session over an injected motion-tracking runtime.
//!
//! A runtime owns several native handles (instance, session, reference space, windowing)
//! that must be released together. `CaptureSession` acquires them once in `open`, releases
//! them in `close`, and again on drop if `close` was never reached, so every exit path out
//! of the producer gives them back.

use std::future::Future;

use tracing::{debug, info};

use crate::source::{PoseSource, Tick};

/// Failure to bring a capture runtime up.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture runtime failed to open: {0}")]
    Open(String),
}

/// Capability a motion-tracking runtime provides to the producer.
pub trait CaptureRuntime: Send {
    /// Acquire runtime resources. Called once before any tick.
    fn open(&mut self) -> Result<(), CaptureError>;
    /// Wait for the runtime's next frame and sample every tracked role.
    fn wait_tick(&mut self) -> impl Future<Output = Tick> + Send;
    /// Release runtime resources. Called at most once, only after a successful `open`.
    fn close(&mut self);
}

pub struct CaptureSession<R: CaptureRuntime> {
    runtime: R,
    open: bool,
}

impl<R: CaptureRuntime> CaptureSession<R> {
    pub fn open(mut runtime: R) -> Result<Self, CaptureError> {
        runtime.open()?;
        info!("capture session opened");
        Ok(Self {
            runtime,
            open: true,
        })
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Release the runtime. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.open {
            self.open = false;
            self.runtime.close();
            info!("capture session closed");
        }
    }
}

impl<R: CaptureRuntime> Drop for CaptureSession<R> {
    fn drop(&mut self) {
        if self.open {
            debug!("capture session dropped while open");
        }
        self.close();
    }
}

impl<R: CaptureRuntime> PoseSource for CaptureSession<R> {
    async fn next_tick(&mut self) -> Tick {
        if !self.open {
            return Tick::SessionEnded;
        }
        self.runtime.wait_tick().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PoseSample;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    struct FakeRuntime {
        counters: Arc<Counters>,
        fail_open: bool,
    }

    impl CaptureRuntime for FakeRuntime {
        fn open(&mut self) -> Result<(), CaptureError> {
            if self.fail_open {
                return Err(CaptureError::Open("no headset".into()));
            }
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn wait_tick(&mut self) -> Tick {
            Tick::Samples(vec![PoseSample::captured(
                "chest",
                [0.0, 1.0, 0.0],
                vive_core::IDENTITY_ORIENTATION,
            )])
        }

        fn close(&mut self) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn runtime(counters: &Arc<Counters>, fail_open: bool) -> FakeRuntime {
        FakeRuntime {
            counters: counters.clone(),
            fail_open,
        }
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_session() {
        let counters = Arc::new(Counters::default());
        let mut session = CaptureSession::open(runtime(&counters, false)).unwrap();
        assert!(matches!(session.next_tick().await, Tick::Samples(_)));
        session.close();
        session.close();
        assert!(!session.is_open());
        assert_eq!(session.next_tick().await, Tick::SessionEnded);
        drop(session);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_open_session() {
        let counters = Arc::new(Counters::default());
        {
            let _session = CaptureSession::open(runtime(&counters, false)).unwrap();
        }
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_open_never_closes() {
        let counters = Arc::new(Counters::default());
        assert!(CaptureSession::open(runtime(&counters, true)).is_err());
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 0);
    }
}
