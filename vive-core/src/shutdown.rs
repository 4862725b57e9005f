//! Process-wide stop signal shared by the producer and receiver loops.

use std::future::Future;
use std::io;

use tokio::sync::watch;
use tracing::error;

/// Owner side of the stop signal. Triggering is idempotent and never fails, even after
/// every loop holding a `ShutdownSignal` has exited.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Cloneable listener side, handed to each loop.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the stop signal fires (immediately if it already has). Also resolves
    /// if the owning `Shutdown` is dropped.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Drive `work` to completion, triggering `shutdown` once `stop` resolves. If `stop`
/// fails (signal handlers could not be installed) the failure is logged and `work` keeps
/// running. Returns the output of `work` and whether the stop signal fired.
pub async fn run_until_signal<F, S>(work: F, shutdown: &Shutdown, stop: S) -> (F::Output, bool)
where
    F: Future,
    S: Future<Output = io::Result<()>>,
{
    tokio::pin!(work);
    tokio::select! {
        out = &mut work => (out, false),
        r = stop => match r {
            Ok(()) => {
                shutdown.trigger();
                (work.await, true)
            }
            Err(e) => {
                error!("cannot listen for stop signals: {e}");
                (work.await, false)
            }
        },
    }
}

/// Wait for Ctrl+C, or SIGTERM on Unix.
pub async fn os_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        assert!(!signal.is_triggered());
        let waiter = tokio::spawn(async move { signal.wait().await });
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn trigger_twice_and_without_listeners() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.trigger();
        let mut late = shutdown.signal();
        assert!(late.is_triggered());
        tokio::time::timeout(Duration::from_secs(1), late.wait())
            .await
            .unwrap();
    }

    async fn until_stopped(mut signal: ShutdownSignal) -> u32 {
        signal.wait().await;
        7
    }

    #[tokio::test]
    async fn stop_signal_triggers_and_waits_for_work() {
        let shutdown = Shutdown::new();
        let work = until_stopped(shutdown.signal());
        let (out, stopped) = run_until_signal(work, &shutdown, async { Ok(()) }).await;
        assert_eq!(out, 7);
        assert!(stopped);
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn failed_signal_setup_leaves_work_running() {
        let shutdown = Shutdown::new();
        let work = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            "done"
        };
        let stop = async { Err(io::Error::other("no handlers")) };
        let (out, stopped) = run_until_signal(work, &shutdown, stop).await;
        assert_eq!(out, "done");
        assert!(!stopped);
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn work_finishing_first_does_not_trigger() {
        let shutdown = Shutdown::new();
        let (out, stopped) =
            run_until_signal(async { 1 }, &shutdown, std::future::pending()).await;
        assert_eq!(out, 1);
        assert!(!stopped);
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn dropped_owner_releases_waiters() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
    }
}
