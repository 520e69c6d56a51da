use crate::provider::{Availability, GenerationProvider};
use log::{info, warn};
use parking_lot::RwLock;
use std::sync::Arc;

/// Caches whether the on-device backend can serve requests.
///
/// Routing reads the cached snapshot synchronously; refreshing it is an
/// explicit async step driven by the controller.
pub struct CapabilityProbe {
    provider: Arc<dyn GenerationProvider>,
    status: RwLock<Option<Availability>>,
}

impl CapabilityProbe {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            provider,
            status: RwLock::new(None),
        }
    }

    /// Query the backend and cache the result. Never fails.
    pub async fn check_availability(&self) -> bool {
        let availability = self.provider.probe().await;
        if availability == Availability::AfterDownload {
            warn!("on-device model requires a download before first use");
        }
        let previous = self.status.write().replace(availability);
        if previous != Some(availability) {
            info!(
                "local capability changed (backend={}, availability={availability})",
                self.provider.kind()
            );
        }
        availability.is_usable()
    }

    /// Last cached result; `false` until the first check completes.
    pub fn snapshot(&self) -> bool {
        self.status
            .read()
            .map(|availability| availability.is_usable())
            .unwrap_or(false)
    }

    pub fn status(&self) -> Option<Availability> {
        *self.status.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::provider::DeltaStream;
    use crate::types::{BackendKind, Message};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct FixedProvider(Availability);

    #[async_trait]
    impl GenerationProvider for FixedProvider {
        fn kind(&self) -> BackendKind {
            BackendKind::Local
        }

        async fn probe(&self) -> Availability {
            self.0
        }

        async fn stream(
            &self,
            _history: &[Message],
            _prompt: &str,
        ) -> Result<DeltaStream, GenerationError> {
            Err(GenerationError::LocalUnavailable("unused".to_string()))
        }
    }

    fn probe(availability: Availability) -> CapabilityProbe {
        CapabilityProbe::new(Arc::new(FixedProvider(availability)))
    }

    #[tokio::test]
    async fn snapshot_is_false_before_first_check() {
        let probe = probe(Availability::Ready);
        assert!(!probe.snapshot());
        assert_eq!(probe.status(), None);
        assert!(probe.check_availability().await);
        assert!(probe.snapshot());
    }

    #[tokio::test]
    async fn after_download_counts_as_usable() {
        let probe = probe(Availability::AfterDownload);
        assert!(probe.check_availability().await);
        assert_eq!(probe.status(), Some(Availability::AfterDownload));
    }

    #[tokio::test]
    async fn unavailable_is_cached_as_false() {
        let probe = probe(Availability::Unavailable);
        assert!(!probe.check_availability().await);
        assert!(!probe.snapshot());
    }
}
