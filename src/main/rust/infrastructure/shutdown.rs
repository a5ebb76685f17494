use tokio::sync::watch;

/// Flips once when the relay starts shutting down
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of [`ShutdownTrigger`]; cheap to clone into every server
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, ShutdownSignal { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown was triggered or the trigger was dropped
    pub async fn triggered(mut self) {
        loop {
            let triggered = *self.rx.borrow_and_update();
            if triggered || self.rx.changed().await.is_err() {
                break;
            }
        }
    }
}
