//! Single-writer, multi-reader snapshot of whatever a control loop wants to
//! publish.
//!
//! The loop owns the [`StatusBoard`] and edits the snapshot in place; any
//! number of [`StatusReader`]s (web handlers) take consistent copies.  A
//! reader never holds anything across an await, so it can't stall the loop.

use tokio::sync::watch;

pub struct StatusBoard<T> {
    tx: watch::Sender<T>,
}

#[derive(Clone)]
pub struct StatusReader<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone> StatusBoard<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Apply `f` to the published snapshot.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    pub fn current(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn reader(&self) -> StatusReader<T> {
        StatusReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone> StatusReader<T> {
    /// A copy of the latest snapshot.
    pub fn snapshot(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Wait for the next published change.  Returns `false` once the board
    /// is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
