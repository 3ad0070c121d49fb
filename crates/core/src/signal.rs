//! Cooperative stop signal shared by controllers, informers, and workers.

use std::sync::Arc;

use tokio::sync::watch;

/// Create a connected stop handle and signal.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (
        StopHandle { tx: Arc::new(tx) },
        StopSignal {
            rx,
            _keepalive: None,
        },
    )
}

/// Handle used to request a stop.
///
/// Dropping every handle also counts as a stop request, so a controller
/// never outlives the code that owns it.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Obtain another signal observing this handle.
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

/// Observer side of a stop request.
#[derive(Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl StopSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait until a stop is requested.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // An error means every handle was dropped, which is a stop too.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}
