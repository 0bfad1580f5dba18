//! Process-wide cancellation flag.
//!
//! A [`Trigger`] flips the flag once; any number of cloned [`Shutdown`]
//! handles can poll it or await it.  Trigger clones share one flag, so the
//! signal handler and the main task can both fire it.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Owner side of the flag.
#[derive(Debug, Clone)]
pub struct Trigger {
    tx: Arc<watch::Sender<bool>>,
}

/// Observer side of the flag; cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (Trigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (Trigger { tx: Arc::new(tx) }, Shutdown { rx })
}

impl Trigger {
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    pub fn is_signalled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is set.  If the trigger is dropped without
    /// firing, this never resolves.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Owned variant for APIs that want a `'static` future.
    pub async fn wait_owned(mut self) {
        self.wait().await
    }
}

/// Fire `trigger` on Ctrl-C or, on Unix, SIGTERM.
pub async fn fire_on_signal(trigger: Trigger) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received"),
        _ = terminate => info!("SIGTERM received"),
    }
    trigger.fire();
}

// ===========================================================================
// Tests
// ===========================================================================
