//! Opener binding establishment with bounded retry.
//!
//! When native messaging to the opener is broken, the two contexts find
//! each other through a mutually visible adapter slot. Discovery is a
//! bounded retry state machine: poll the slot at a fixed interval up to a
//! ceiling, then degrade permanently to relay delivery. A relationship
//! that never becomes reachable must neither retry forever nor silently
//! drop messages.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::host::{AdapterSlot, ContextHost, InboundAdapter};
use crate::registry::TransactionRegistry;
use crate::relay::RelayBootstrapper;
use crate::{Error, Result};

/// Retry policy for adapter discovery across an opener relationship.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeConfig {
    /// Interval between discovery attempts.
    pub poll_interval: Duration,
    /// Maximum discovery attempts before the binding degrades.
    pub max_attempts: u32,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_attempts: 10,
        }
    }
}

/// Which side of an opener relationship this context plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BindRole {
    /// The context that opened the other; installs its adapter for the
    /// peer to discover.
    Source,
    /// The opened context; waits for the relationship to become reachable
    /// before publishing its adapter.
    Target,
}

/// A wire string held while its binding is unresolved.
#[derive(Clone)]
struct QueuedWire {
    /// Transaction to fail if the wire ultimately cannot be delivered.
    tid: Option<u64>,
    /// The encoded envelope.
    wire: String,
    /// Relay URL for the degraded path, when the send configured one.
    relay_url: Option<String>,
}

/// Lifecycle of one relationship's binding.
enum BindingState {
    /// Discovery in progress; wires queue here until it settles.
    Unresolved(Vec<QueuedWire>),
    /// The peer's adapter has been discovered.
    Resolved(InboundAdapter),
    /// Discovery exhausted its retries; relay fallback from now on.
    Exhausted,
}

/// Shared state behind [`BindingTable`].
struct Inner {
    host: Arc<dyn ContextHost>,
    relay: RelayBootstrapper,
    registry: TransactionRegistry,
    config: HandshakeConfig,
    bindings: Mutex<HashMap<String, BindingState>>,
}

/// Per-relationship bindings, keyed by relationship identifier.
///
/// Bindings are created on first indirect send or explicit bind, and live
/// for the bridge's lifetime.
#[derive(Clone)]
pub(crate) struct BindingTable {
    inner: Arc<Inner>,
}

/// What `deliver` decided under the lock.
enum Action {
    /// Deliver through the discovered adapter.
    Adapter(InboundAdapter),
    /// Binding degraded; use the relay path.
    Fallback,
    /// Queued behind in-flight discovery.
    Queued,
    /// The host knows no such relationship.
    NoRelationship,
}

impl BindingTable {
    pub(crate) fn new(
        host: Arc<dyn ContextHost>,
        relay: RelayBootstrapper,
        registry: TransactionRegistry,
        config: HandshakeConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                relay,
                registry,
                config,
                bindings: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Queues or delivers one wire across the relationship, starting
    /// discovery on first use.
    ///
    /// `tid` is the registered transaction to fail if delivery becomes
    /// impossible; `relay_url` is the degraded path for this message.
    pub(crate) fn deliver(
        &self,
        relationship: &str,
        tid: Option<u64>,
        wire: String,
        relay_url: Option<String>,
    ) -> Result<()> {
        let q = QueuedWire {
            tid,
            wire,
            relay_url,
        };
        let mut start_discovery: Option<Arc<dyn AdapterSlot>> = None;

        let action = {
            let Ok(mut bindings) = self.inner.bindings.lock() else {
                return Err(Error::Transport("binding table poisoned".into()));
            };
            match bindings.entry(relationship.to_owned()) {
                Entry::Occupied(mut entry) => match entry.get_mut() {
                    BindingState::Resolved(adapter) => Action::Adapter(Arc::clone(adapter)),
                    BindingState::Exhausted => Action::Fallback,
                    BindingState::Unresolved(queued) => {
                        queued.push(q.clone());
                        Action::Queued
                    }
                },
                Entry::Vacant(vacant) => match self.inner.host.adapter_slot(relationship) {
                    None => Action::NoRelationship,
                    Some(slot) => {
                        // First indirect send: one inline attempt before
                        // falling back to scheduled polling.
                        if let Some(adapter) = slot.discover() {
                            vacant.insert(BindingState::Resolved(Arc::clone(&adapter)));
                            Action::Adapter(adapter)
                        } else {
                            vacant.insert(BindingState::Unresolved(vec![q.clone()]));
                            start_discovery = Some(slot);
                            Action::Queued
                        }
                    }
                },
            }
        };

        match action {
            Action::Adapter(adapter) => {
                adapter(&q.wire);
                Ok(())
            }
            Action::Fallback => self.fallback(relationship, q),
            Action::Queued => {
                if let Some(slot) = start_discovery {
                    self.spawn_discovery(relationship.to_owned(), slot);
                }
                Ok(())
            }
            Action::NoRelationship => Err(Error::Transport(format!(
                "no opener relationship '{relationship}'"
            ))),
        }
    }

    /// Establishes the binding explicitly, per the caller's role.
    pub(crate) async fn bind(
        &self,
        role: BindRole,
        relationship: &str,
        adapter: InboundAdapter,
    ) -> Result<()> {
        match role {
            BindRole::Source => {
                let slot = self.slot(relationship)?;
                slot.install(adapter)
            }
            BindRole::Target => {
                let HandshakeConfig {
                    poll_interval,
                    max_attempts,
                } = self.inner.config;
                for attempt in 1..=max_attempts {
                    if let Some(slot) = self.inner.host.adapter_slot(relationship) {
                        debug!(relationship, attempt, "opener relationship reachable");
                        return slot.install(adapter);
                    }
                    tokio::time::sleep(poll_interval).await;
                }
                self.exhaust(relationship);
                Err(Error::BindingUnavailable(relationship.to_owned()))
            }
        }
    }

    fn slot(&self, relationship: &str) -> Result<Arc<dyn AdapterSlot>> {
        self.inner
            .host
            .adapter_slot(relationship)
            .ok_or_else(|| Error::Transport(format!("no opener relationship '{relationship}'")))
    }

    /// Polls the slot at the configured interval until the peer's adapter
    /// appears or the ceiling is hit.
    fn spawn_discovery(&self, relationship: String, slot: Arc<dyn AdapterSlot>) {
        let table = self.clone();
        let HandshakeConfig {
            poll_interval,
            max_attempts,
        } = self.inner.config;
        tokio::spawn(async move {
            for attempt in 1..=max_attempts {
                tokio::time::sleep(poll_interval).await;
                if let Some(adapter) = slot.discover() {
                    debug!(relationship = %relationship, attempt, "opener adapter discovered");
                    table.resolve(&relationship, adapter);
                    return;
                }
            }
            table.exhaust(&relationship);
        });
    }

    /// Marks the binding resolved and flushes its queue through the
    /// adapter.
    fn resolve(&self, relationship: &str, adapter: InboundAdapter) {
        let queued = self.transition(relationship, BindingState::Resolved(Arc::clone(&adapter)));
        for q in queued {
            adapter(&q.wire);
        }
    }

    /// Degrades the binding permanently and flushes its queue through the
    /// relay path. Logged once per relationship, not once per send.
    fn exhaust(&self, relationship: &str) {
        let queued = self.transition(relationship, BindingState::Exhausted);
        warn!(
            relationship,
            attempts = self.inner.config.max_attempts,
            "opener binding unreachable; degrading to relay delivery"
        );
        for q in queued {
            let tid = q.tid;
            if let Err(e) = self.fallback(relationship, q) {
                match tid {
                    Some(tid) => self.inner.registry.fail(tid, e),
                    None => warn!(relationship, error = %e, "dropping queued message"),
                }
            }
        }
    }

    /// Ships one wire over the degraded relay path.
    fn fallback(&self, relationship: &str, q: QueuedWire) -> Result<()> {
        match &q.relay_url {
            Some(url) => self.inner.relay.dispatch(url, &q.wire),
            None => Err(Error::BindingUnavailable(relationship.to_owned())),
        }
    }

    /// Swaps in the next state, returning any wires queued so far.
    fn transition(&self, relationship: &str, next: BindingState) -> Vec<QueuedWire> {
        let Ok(mut bindings) = self.inner.bindings.lock() else {
            return Vec::new();
        };
        match bindings.insert(relationship.to_owned(), next) {
            Some(BindingState::Unresolved(queued)) => queued,
            _ => Vec::new(),
        }
    }
}
