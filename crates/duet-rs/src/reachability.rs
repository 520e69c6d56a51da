//! Periodic TCP reachability probe feeding the connectivity signal.

use duet_rs_config::ConnectivityConfig;
use duet_rs_core::ChatController;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// Background probe; manual overrides pause it.
pub struct Reachability {
    paused: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Reachability {
    /// Start probing; `paused` starts with the probe disabled.
    pub fn spawn(
        controller: Arc<ChatController>,
        config: &ConnectivityConfig,
        paused: bool,
    ) -> Self {
        let paused = Arc::new(AtomicBool::new(paused));
        let addr = config.probe_addr.clone();
        let interval = Duration::from_secs(config.interval_secs);
        let timeout = Duration::from_millis(config.timeout_ms);
        let handle = {
            let paused = paused.clone();
            tokio::spawn(async move {
                loop {
                    if !paused.load(Ordering::SeqCst) {
                        let online = is_reachable(&addr, timeout).await;
                        debug!("reachability probe finished (addr={addr}, online={online})");
                        if !paused.load(Ordering::SeqCst) {
                            controller.set_online(online);
                        }
                    }
                    tokio::time::sleep(interval).await;
                }
            })
        };
        Self { paused, handle }
    }

    /// Pin connectivity to `online` and stop probing.
    pub fn override_online(&self, controller: &ChatController, online: bool) {
        self.paused.store(true, Ordering::SeqCst);
        controller.set_online(online);
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

async fn is_reachable(addr: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::is_reachable;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn listening_socket_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        assert!(is_reachable(&addr, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn unresolvable_host_is_unreachable() {
        assert!(!is_reachable("invalid.invalid:443", Duration::from_millis(500)).await);
    }
}
