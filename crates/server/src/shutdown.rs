use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tracing::info;

use jobforge_engine::SchedulerClient;

/// Process-wide exit flag with a wakeup for the accept loop.
#[derive(Debug, Default)]
pub struct ShutdownFlag {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownFlag {
    /// Request shutdown; idempotent. Wakes anything blocked in
    /// [`ShutdownFlag::notified`].
    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown is requested.
    pub async fn notified(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before re-checking the flag so a request between the check
        // and the await cannot be missed.
        notified.as_mut().enable();
        if self.is_requested() {
            return;
        }
        notified.await;
    }
}

/// Spawn the Ctrl-C handler: the first Ctrl-C requests a graceful shutdown
/// (same effect as the `exit` verb), the second exits immediately.
pub fn spawn_ctrl_c_handler(flag: Arc<ShutdownFlag>, scheduler: SchedulerClient) {
    tokio::spawn(async move {
        let mut presses: u8 = 0;
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            presses += 1;
            if presses == 1 {
                info!(
                    "shutdown requested; draining running jobs (press CTRL+C again to exit immediately)"
                );
                flag.request();
                let _ = scheduler.shutdown().await;
            } else {
                std::process::exit(130);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::ShutdownFlag;

    #[tokio::test]
    async fn request_wakes_waiters_and_is_idempotent() {
        let flag = Arc::new(ShutdownFlag::default());
        assert!(!flag.is_requested());

        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.notified().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        flag.request();
        flag.request();

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter never woke")
            .expect("waiter panicked");
        assert!(flag.is_requested());

        // Late waiters resolve immediately.
        timeout(Duration::from_secs(1), flag.notified())
            .await
            .expect("late waiter hung");
    }
}
