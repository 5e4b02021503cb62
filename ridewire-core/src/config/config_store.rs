//! Hot-swappable config shared by the dispatcher and the search ticker.
//!
//! The current value lives inside a `watch` channel, so readers take a
//! cheap `Arc` snapshot without locking and the ticker can await the next
//! reload directly.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared config value that can be replaced at runtime.
pub struct ConfigStore<T> {
    tx: Arc<watch::Sender<Arc<T>>>,
}

/// Yields every value stored after it was created.
pub struct ConfigWatcher<T> {
    rx: watch::Receiver<Arc<T>>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// The value in effect right now.
    pub fn current(&self) -> Arc<T> {
        self.tx.borrow().clone()
    }

    /// Swap in `value`, wake all watchers and hand back the old value.
    pub fn replace(&self, value: T) -> Arc<T> {
        self.tx.send_replace(Arc::new(value))
    }

    pub fn subscribe(&self) -> ConfigWatcher<T> {
        ConfigWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> ConfigWatcher<T> {
    /// Wait for the next replacement and return it.
    ///
    /// Fails once every [`ConfigStore`] clone has been dropped.
    pub async fn changed(&mut self) -> Result<Arc<T>, watch::error::RecvError> {
        self.rx.changed().await?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_wakes_watchers() {
        let store = ConfigStore::new(1u32);
        let mut watcher = store.subscribe();

        let previous = store.replace(2);
        assert_eq!(*previous, 1);
        assert_eq!(*watcher.changed().await.unwrap(), 2);
        assert_eq!(*store.current(), 2);
    }

    #[tokio::test]
    async fn test_watcher_sees_only_latest_value() {
        let store = ConfigStore::new(0u32);
        let mut watcher = store.subscribe();
        store.replace(1);
        store.replace(2);
        assert_eq!(*watcher.changed().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_one_value() {
        let store = ConfigStore::new("a");
        let other = store.clone();
        other.replace("b");
        assert_eq!(*store.current(), "b");
    }

    #[tokio::test]
    async fn test_watcher_errors_once_store_dropped() {
        let store = ConfigStore::new("a");
        let mut watcher = store.subscribe();
        drop(store);
        assert!(watcher.changed().await.is_err());
    }
}
