//! Shutdown coordination for the connection layer.
//!
//! Cancellation is an explicit token rather than process-wide state. The two
//! causes are distinct: [`ShutdownCause::Abort`] closes everything right away,
//! [`ShutdownCause::Graceful`] stops accepting work and waits, up to a
//! timeout, for in-flight bodies to reach a terminal state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tracing::{error, info};

use crate::error::DrainTimeout;

/// Why the server is going down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// Stop accepting and let in-flight work finish.
    Graceful,
    /// Close every connection now.
    Abort,
}

#[cfg(unix)]
impl ShutdownCause {
    /// `SIGHUP` and `SIGINT` drain, anything else (`SIGTERM`) aborts.
    pub fn from_signal(kind: tokio::signal::unix::SignalKind) -> Self {
        use tokio::signal::unix::SignalKind;

        if kind == SignalKind::hangup() || kind == SignalKind::interrupt() {
            ShutdownCause::Graceful
        } else {
            ShutdownCause::Abort
        }
    }
}

/// Trigger side of a shutdown.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<Option<ShutdownCause>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Returns an observer to hand to accept loops and connection tasks.
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Requests shutdown. The first cause sticks, except that an abort
    /// overrides a graceful drain already in progress. Returns whether the
    /// cause changed.
    pub fn trigger(&self, cause: ShutdownCause) -> bool {
        self.tx.send_if_modified(|current| match (*current, cause) {
            (None, _) | (Some(ShutdownCause::Graceful), ShutdownCause::Abort) => {
                *current = Some(cause);
                true
            }
            _ => false,
        })
    }

    pub fn cause(&self) -> Option<ShutdownCause> {
        *self.tx.borrow()
    }
}

/// Observer side of a [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<Option<ShutdownCause>>,
}

impl ShutdownToken {
    pub fn cause(&self) -> Option<ShutdownCause> {
        *self.rx.borrow()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some()
    }

    /// Waits for any shutdown. A dropped [`Shutdown`] counts as an abort.
    pub async fn cancelled(&mut self) -> ShutdownCause {
        match self.rx.wait_for(Option::is_some).await {
            Ok(cause) => cause.unwrap_or(ShutdownCause::Abort),
            Err(_) => ShutdownCause::Abort,
        }
    }

    /// Waits for an abort specifically. Never resolves if the [`Shutdown`] is
    /// dropped without aborting.
    pub async fn aborted(&mut self) {
        let aborted = self
            .rx
            .wait_for(|cause| *cause == Some(ShutdownCause::Abort))
            .await
            .is_ok();
        if !aborted {
            std::future::pending::<()>().await;
        }
    }
}

/// Waits for `SIGTERM`, `SIGHUP` or `SIGINT` and triggers the mapped cause.
#[cfg(unix)]
pub async fn listen_for_signals(shutdown: &Shutdown) -> std::io::Result<ShutdownCause> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let kind = tokio::select! {
        _ = terminate.recv() => SignalKind::terminate(),
        _ = hangup.recv() => SignalKind::hangup(),
        _ = interrupt.recv() => SignalKind::interrupt(),
    };

    let cause = ShutdownCause::from_signal(kind);
    match cause {
        ShutdownCause::Abort => error!(signal = ?kind, "received close signal"),
        ShutdownCause::Graceful => info!(signal = ?kind, "received graceful shutdown signal"),
    }
    shutdown.trigger(cause);
    Ok(cause)
}

#[derive(Debug, Default)]
struct TrackerInner {
    count: AtomicUsize,
    idle: Notify,
}

/// Counts in-flight bodies so a graceful shutdown knows when to stop waiting.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

/// Held for as long as one body is being decoded.
#[derive(Debug)]
pub struct InFlight {
    inner: Arc<TrackerInner>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> InFlight {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        InFlight {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Waits until nothing is in flight, for at most `timeout`.
    pub async fn drain(&self, timeout: Duration) -> Result<(), DrainTimeout> {
        let idle = async {
            loop {
                let notified = self.inner.idle.notified();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, idle)
            .await
            .map_err(|_| DrainTimeout {
                remaining: self.in_flight(),
            })
    }
}

/// Waits for shutdown, then drains `tracker` if the cause allows it.
///
/// Returns the cause the server finally went down with. An abort arriving
/// during the drain cuts it short.
pub async fn drain_on_shutdown(
    mut token: ShutdownToken,
    tracker: &Tracker,
    timeout: Duration,
) -> Result<ShutdownCause, DrainTimeout> {
    if token.cancelled().await == ShutdownCause::Abort {
        error!(in_flight = tracker.in_flight(), "closing immediately");
        return Ok(ShutdownCause::Abort);
    }

    info!(
        timeout_secs = timeout.as_secs(),
        in_flight = tracker.in_flight(),
        "begin graceful shutdown"
    );
    tokio::select! {
        drained = tracker.drain(timeout) => {
            if let Err(err) = &drained {
                error!(error = %err, "graceful shutdown incomplete");
            }
            drained.map(|()| ShutdownCause::Graceful)
        }
        _ = token.aborted() => {
            error!(in_flight = tracker.in_flight(), "abort during graceful shutdown");
            Ok(ShutdownCause::Abort)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_cause_sticks_unless_escalated() {
        let shutdown = Shutdown::new();
        let token = shutdown.token();
        assert!(!token.is_cancelled());

        assert!(shutdown.trigger(ShutdownCause::Graceful));
        assert!(!shutdown.trigger(ShutdownCause::Graceful));
        assert!(shutdown.trigger(ShutdownCause::Abort));
        assert!(!shutdown.trigger(ShutdownCause::Graceful));
        assert_eq!(token.cause(), Some(ShutdownCause::Abort));
    }

    #[cfg(unix)]
    #[test]
    fn maps_signals() {
        use tokio::signal::unix::SignalKind;

        assert_eq!(
            ShutdownCause::from_signal(SignalKind::terminate()),
            ShutdownCause::Abort
        );
        assert_eq!(
            ShutdownCause::from_signal(SignalKind::hangup()),
            ShutdownCause::Graceful
        );
        assert_eq!(
            ShutdownCause::from_signal(SignalKind::interrupt()),
            ShutdownCause::Graceful
        );
    }

    #[tokio::test]
    async fn token_wakes_on_trigger() {
        let shutdown = Shutdown::new();
        let mut token = shutdown.token();
        let waiter = tokio::spawn(async move { token.cancelled().await });
        shutdown.trigger(ShutdownCause::Graceful);
        assert_eq!(waiter.await.unwrap(), ShutdownCause::Graceful);
    }

    #[tokio::test]
    async fn dropped_shutdown_counts_as_abort() {
        let shutdown = Shutdown::new();
        let mut token = shutdown.token();
        drop(shutdown);
        assert_eq!(token.cancelled().await, ShutdownCause::Abort);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_completes_when_guards_drop() {
        let tracker = Tracker::new();
        let guard = tracker.enter();
        assert_eq!(tracker.in_flight(), 1);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(guard);
        });
        tracker.drain(Duration::from_secs(5)).await.unwrap();
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out() {
        let tracker = Tracker::new();
        let _guard = tracker.enter();
        assert_eq!(
            tracker.drain(Duration::from_secs(1)).await,
            Err(DrainTimeout { remaining: 1 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_waits_for_bodies() {
        let shutdown = Shutdown::new();
        let tracker = Tracker::new();
        let guard = tracker.enter();

        shutdown.trigger(ShutdownCause::Graceful);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(guard);
        });
        let cause = drain_on_shutdown(shutdown.token(), &tracker, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(cause, ShutdownCause::Graceful);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_cuts_graceful_drain_short() {
        let shutdown = Arc::new(Shutdown::new());
        let tracker = Tracker::new();
        let _guard = tracker.enter();

        shutdown.trigger(ShutdownCause::Graceful);
        let escalate = Arc::clone(&shutdown);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            escalate.trigger(ShutdownCause::Abort);
        });
        let cause = drain_on_shutdown(shutdown.token(), &tracker, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(cause, ShutdownCause::Abort);
        assert_eq!(tracker.in_flight(), 1);
    }

    #[tokio::test]
    async fn immediate_abort_skips_drain() {
        let shutdown = Shutdown::new();
        let tracker = Tracker::new();
        let _guard = tracker.enter();
        shutdown.trigger(ShutdownCause::Abort);
        let cause = drain_on_shutdown(shutdown.token(), &tracker, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(cause, ShutdownCause::Abort);
    }
}
