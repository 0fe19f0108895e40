//! Process-wide client for test-suite integrations
//!
//! Test helpers that cannot thread a [`VisualClient`] through every call
//! install one here. [`reset`] tears it down between test runs.

use std::sync::OnceLock;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use vizreg_browser::PageDriver;
use vizreg_core::{Build, Result, SnapshotOptions};

use crate::client::VisualClient;

static CLIENT: OnceLock<Mutex<Option<VisualClient>>> = OnceLock::new();

fn holder() -> &'static Mutex<Option<VisualClient>> {
    CLIENT.get_or_init(|| Mutex::new(None))
}

/// Install `client`, returning the one it replaces
pub async fn install(client: VisualClient) -> Option<VisualClient> {
    holder().lock().await.replace(client)
}

/// Remove the installed client
pub async fn reset() -> Option<VisualClient> {
    holder().lock().await.take()
}

pub async fn is_installed() -> bool {
    holder().lock().await.is_some()
}

/// Run `f` against the installed client, if any
pub async fn with_client<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut VisualClient) -> R,
{
    holder().lock().await.as_mut().map(f)
}

pub async fn initialize_build() -> Result<Option<Build>> {
    match holder().lock().await.as_mut() {
        Some(client) => client.initialize_build().await,
        None => {
            debug!("No client installed; skipping build initialization");
            Ok(None)
        }
    }
}

/// Snapshot through the installed client; `Ok(false)` when none is installed
pub async fn snapshot(page: &dyn PageDriver, options: SnapshotOptions) -> Result<bool> {
    match holder().lock().await.as_ref() {
        Some(client) => client.snapshot(page, options).await,
        None => {
            warn!("No client installed; snapshot skipped");
            Ok(false)
        }
    }
}

/// Finalize the installed client's build; silent when there is none or when disabled
pub async fn finalize_build() -> Result<Option<Build>> {
    let mut guard = holder().lock().await;
    let Some(client) = guard.as_mut() else {
        return Ok(None);
    };
    if !client.is_enabled() || client.current_build().is_none() {
        return Ok(None);
    }
    client.finalize_current_build().await
}

pub async fn disable() {
    if let Some(client) = holder().lock().await.as_ref() {
        client.disable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiCall, MockReviewApi};
    use crate::client::ClientOptions;
    use crate::state::EnvSignals;
    use std::sync::Arc;
    use vizreg_browser::MockPageDriver;
    use vizreg_loaders::{Loader, MockFetcher};

    // The holder is process-wide; tests take turns
    static TEST_LOCK: Mutex<()> = Mutex::const_new(());

    fn client(api: Arc<MockReviewApi>) -> VisualClient {
        VisualClient::new(
            api,
            Loader::native(Arc::new(MockFetcher::new())),
            ClientOptions {
                repo_slug: Some("acme/shop".to_string()),
                enabled: Some(true),
                signals: EnvSignals::default(),
            },
        )
    }

    #[tokio::test]
    async fn test_nothing_installed() {
        let _guard = TEST_LOCK.lock().await;
        reset().await;

        let page = MockPageDriver::new("http://localhost/").with_html("<html></html>");
        assert!(!is_installed().await);
        assert!(initialize_build().await.unwrap().is_none());
        assert!(!snapshot(&page, SnapshotOptions::default()).await.unwrap());
        assert!(finalize_build().await.unwrap().is_none());
        assert!(with_client(|c| c.is_enabled()).await.is_none());
    }

    #[tokio::test]
    async fn test_finalize_without_build_is_silent() {
        let _guard = TEST_LOCK.lock().await;
        let api = Arc::new(MockReviewApi::new());
        install(client(api.clone())).await;

        assert!(finalize_build().await.unwrap().is_none());
        assert!(api.calls().is_empty());
        reset().await;
    }

    #[tokio::test]
    async fn test_installed_lifecycle() {
        let _guard = TEST_LOCK.lock().await;
        let api = Arc::new(MockReviewApi::new());
        install(client(api.clone())).await;

        assert!(initialize_build().await.unwrap().is_some());
        assert!(finalize_build().await.unwrap().is_some());
        assert!(api.calls().contains(&ApiCall::FinalizeBuild("build-1".to_string())));

        disable().await;
        assert_eq!(with_client(|c| c.is_enabled()).await, Some(false));
        assert!(reset().await.is_some());
        assert!(!is_installed().await);
    }
}
