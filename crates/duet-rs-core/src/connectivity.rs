use log::info;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared online/offline signal.
///
/// Cloning is cheap; every clone observes the same value. Subscribers are
/// woken only when the value actually changes.
#[derive(Clone)]
pub struct Connectivity {
    sender: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(initial: bool) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Record the current state. Returns true when it differs from the last one.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            info!("connectivity changed (online={online})");
        }
        changed
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::Connectivity;

    #[test]
    fn set_online_reports_changes_only() {
        let connectivity = Connectivity::new(true);
        assert!(!connectivity.set_online(true));
        assert!(connectivity.set_online(false));
        assert!(!connectivity.is_online());
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let connectivity = Connectivity::default();
        let mut receiver = connectivity.subscribe();
        let clone = connectivity.clone();
        clone.set_online(false);
        receiver.changed().await.expect("sender alive");
        assert!(!*receiver.borrow());
    }
}
