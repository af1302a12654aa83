use tokio::sync::watch;

/// Owner side of a stop request. Dropping it without calling `stop` never
/// stops anything.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        // No receivers left just means nobody is listening anymore
        let _ = self.tx.send(true);
    }
}

/// Cloneable view of a stop request, observed by every stage at its
/// suspension points.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

impl StopSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_handle, signal) = stop_channel();
        signal
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested; pends forever otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without stopping
                std::future::pending::<()>().await;
            }
        }
    }
}
