//! Host shutdown signal observed by readiness waits.

use tokio::sync::watch;

/// Cloneable receiver side of the host's shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns the trigger and a receiver. Send `true` to request shutdown.
    pub fn channel() -> (watch::Sender<bool>, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (tx, Shutdown { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Shutdown {
        Self::channel().1
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown was requested. Pends forever if the trigger
    /// was dropped without firing.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_triggered_resolves_after_send() {
        let (tx, shutdown) = Shutdown::channel();
        assert!(!shutdown.is_triggered());

        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move { waiter.triggered().await });

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_does_not_fire() {
        let shutdown = Shutdown::never();
        let result = tokio::time::timeout(Duration::from_secs(60), shutdown.triggered()).await;
        assert!(result.is_err());
    }
}
