//! Relay-context bootstrapping for indirect delivery.
//!
//! One hidden relay context per outbound indirect message: spawn it with
//! the wire string in the URL fragment, wait for its load event, keep it
//! alive for a short grace period so it can read its fragment and
//! re-transmit, then tear it down. Contexts are never reused.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::Result;
use crate::host::ContextHost;

/// Default time a relay context outlives its load event before teardown.
pub const DEFAULT_RELAY_GRACE: Duration = Duration::from_secs(1);

/// Spawns and reclaims relay contexts.
#[derive(Clone)]
pub(crate) struct RelayBootstrapper {
    /// Host capability used to materialize and dispose relay contexts.
    host: Arc<dyn ContextHost>,
    /// How long a loaded relay context lives before disposal.
    grace: Duration,
}

impl RelayBootstrapper {
    pub(crate) fn new(host: Arc<dyn ContextHost>, grace: Duration) -> Self {
        Self { host, grace }
    }

    /// Ships `wire` through a fresh relay context at `relay_url`.
    ///
    /// The wire string rides in the URL fragment. Once the context
    /// reports load, a one-shot timer disposes it after the grace period;
    /// no path leaves a loaded context undisposed.
    pub(crate) fn dispatch(&self, relay_url: &str, wire: &str) -> Result<()> {
        let url = format!("{relay_url}#{wire}");
        let host = Arc::clone(&self.host);
        let grace = self.grace;
        debug!(relay_url, "spawning relay context");
        self.host.spawn_relay(
            &url,
            Box::new(move |handle| {
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    host.dispose_relay(handle);
                });
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testhost::TestHost;

    #[tokio::test(start_paused = true)]
    async fn dispatch_carries_wire_in_fragment() {
        let host = Arc::new(TestHost::legacy());
        let relay = RelayBootstrapper::new(Arc::clone(&host) as Arc<dyn ContextHost>, DEFAULT_RELAY_GRACE);

        relay
            .dispatch("https://e.com/relay.html", "tid=1&message=hi")
            .unwrap();

        assert_eq!(
            host.spawned_relays(),
            vec!["https://e.com/relay.html#tid=1&message=hi".to_owned()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn context_disposed_one_grace_period_after_load() {
        let host = Arc::new(TestHost::legacy());
        let relay = RelayBootstrapper::new(Arc::clone(&host) as Arc<dyn ContextHost>, DEFAULT_RELAY_GRACE);

        relay.dispatch("https://e.com/relay.html", "tid=2").unwrap();
        assert!(host.disposed_relays().is_empty());

        let handles = host.fire_relay_loads();
        assert_eq!(handles.len(), 1);

        // Not yet — load just fired.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(host.disposed_relays().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(host.disposed_relays(), handles);
    }

    #[tokio::test(start_paused = true)]
    async fn one_context_per_message() {
        let host = Arc::new(TestHost::legacy());
        let relay = RelayBootstrapper::new(Arc::clone(&host) as Arc<dyn ContextHost>, DEFAULT_RELAY_GRACE);

        relay.dispatch("https://e.com/relay.html", "tid=1").unwrap();
        relay.dispatch("https://e.com/relay.html", "tid=2").unwrap();
        assert_eq!(host.spawned_relays().len(), 2);
    }
}
