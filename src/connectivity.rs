//! Online/offline signal consumed by the queue.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared connectivity state with change notifications.
///
/// Clones observe and update the same state. The queue runs a pass on
/// every offline to online transition.
#[derive(Clone, Debug)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    /// Records the current state. Returns `true` if it changed; repeating
    /// the current value does not notify subscribers.
    pub fn set_online(&self, online: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        })
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::online()
    }
}

#[cfg(test)]
mod tests {
    use super::Connectivity;

    #[test]
    fn set_online_reports_changes_only() {
        let connectivity = Connectivity::offline();
        assert!(!connectivity.is_online());
        assert!(connectivity.set_online(true));
        assert!(!connectivity.set_online(true));
        assert!(connectivity.is_online());
    }

    #[tokio::test]
    async fn clones_share_state_and_notify_subscribers() {
        let connectivity = Connectivity::offline();
        let mut rx = connectivity.subscribe();
        let handle = connectivity.clone();

        handle.set_online(true);

        rx.changed().await.expect("sender must be alive");
        assert!(*rx.borrow_and_update());
        assert!(connectivity.is_online());
    }
}
