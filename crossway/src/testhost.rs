//! In-memory host environment for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crossway_proto::Target;

use crate::bridge::Bridge;
use crate::host::{
    AdapterSlot, Arrival, ContextHost, InboundAdapter, MessagePort, OnRelayLoad, RelayHandle,
};
use crate::relay::RelayBootstrapper;
use crate::{Error, Result};

/// Scriptable [`ContextHost`] recording every relay interaction.
pub(crate) struct TestHost {
    native: bool,
    broken_opener: bool,
    ports: Mutex<HashMap<String, Arc<dyn MessagePort>>>,
    slots: Mutex<HashMap<String, Arc<SlotCell>>>,
    spawned: Mutex<Vec<String>>,
    pending_loads: Mutex<Vec<(RelayHandle, OnRelayLoad)>>,
    disposed: Mutex<Vec<RelayHandle>>,
    next_handle: AtomicU64,
}

impl TestHost {
    fn with_flags(native: bool, broken_opener: bool) -> Self {
        Self {
            native,
            broken_opener,
            ports: Mutex::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
            spawned: Mutex::new(Vec::new()),
            pending_loads: Mutex::new(Vec::new()),
            disposed: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// A host with full native messaging.
    pub(crate) fn native() -> Self {
        Self::with_flags(true, false)
    }

    /// A host without the native messaging primitive.
    pub(crate) fn legacy() -> Self {
        Self::with_flags(false, false)
    }

    /// A native host whose opener channel is broken.
    pub(crate) fn broken_opener() -> Self {
        Self::with_flags(true, true)
    }

    /// Makes `target` resolvable to `port`. Keys use the canonical target
    /// rendering, e.g. `frames['svc']`.
    pub(crate) fn add_port(&self, target: &str, port: Arc<dyn MessagePort>) {
        self.ports.lock().unwrap().insert(target.to_owned(), port);
    }

    /// Creates an empty adapter slot under `relationship` and returns it.
    pub(crate) fn add_slot(&self, relationship: &str) -> Arc<SlotCell> {
        let slot = SlotCell::new();
        self.set_slot(relationship, Arc::clone(&slot));
        slot
    }

    /// Attaches an existing slot, making the relationship reachable.
    pub(crate) fn set_slot(&self, relationship: &str, slot: Arc<SlotCell>) {
        self.slots
            .lock()
            .unwrap()
            .insert(relationship.to_owned(), slot);
    }

    /// URLs of every relay context spawned so far.
    pub(crate) fn spawned_relays(&self) -> Vec<String> {
        self.spawned.lock().unwrap().clone()
    }

    /// Handles of every relay context disposed so far.
    pub(crate) fn disposed_relays(&self) -> Vec<RelayHandle> {
        self.disposed.lock().unwrap().clone()
    }

    /// Fires the load callback of every spawned-but-unloaded relay
    /// context, returning their handles.
    pub(crate) fn fire_relay_loads(&self) -> Vec<RelayHandle> {
        let pending: Vec<_> = self.pending_loads.lock().unwrap().drain(..).collect();
        let mut handles = Vec::with_capacity(pending.len());
        for (handle, on_load) in pending {
            handles.push(handle);
            on_load(handle);
        }
        handles
    }
}

impl ContextHost for TestHost {
    fn native_messaging(&self) -> bool {
        self.native
    }

    fn opener_messaging_broken(&self) -> bool {
        self.broken_opener
    }

    fn resolve(&self, target: &Target) -> Option<Arc<dyn MessagePort>> {
        self.ports.lock().unwrap().get(&target.to_string()).cloned()
    }

    fn spawn_relay(&self, url: &str, on_load: OnRelayLoad) -> Result<()> {
        self.spawned.lock().unwrap().push(url.to_owned());
        let handle = RelayHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.pending_loads.lock().unwrap().push((handle, on_load));
        Ok(())
    }

    fn dispose_relay(&self, handle: RelayHandle) {
        self.disposed.lock().unwrap().push(handle);
    }

    fn adapter_slot(&self, relationship: &str) -> Option<Arc<dyn AdapterSlot>> {
        self.slots
            .lock()
            .unwrap()
            .get(relationship)
            .cloned()
            .map(|s| s as Arc<dyn AdapterSlot>)
    }
}

/// Adapter slot backed by a mutex, counting discovery attempts.
pub(crate) struct SlotCell {
    adapter: Mutex<Option<InboundAdapter>>,
    discover_calls: AtomicU64,
}

impl SlotCell {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            adapter: Mutex::new(None),
            discover_calls: AtomicU64::new(0),
        })
    }

    /// How many times `discover` has been called.
    pub(crate) fn discover_count(&self) -> u64 {
        self.discover_calls.load(Ordering::SeqCst)
    }
}

impl AdapterSlot for SlotCell {
    fn install(&self, adapter: InboundAdapter) -> Result<()> {
        *self.adapter.lock().unwrap() = Some(adapter);
        Ok(())
    }

    fn discover(&self) -> Option<InboundAdapter> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        self.adapter.lock().unwrap().clone()
    }
}

/// Port that records every wire string posted to it.
struct RecordingPort {
    sent: Arc<Mutex<Vec<String>>>,
}

impl MessagePort for RecordingPort {
    fn post(&self, wire: &str) -> Result<()> {
        self.sent.lock().unwrap().push(wire.to_owned());
        Ok(())
    }
}

/// A port whose posted wire strings can be inspected afterward.
pub(crate) fn recording_port() -> (Arc<dyn MessagePort>, Arc<Mutex<Vec<String>>>) {
    let sent: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let port = Arc::new(RecordingPort {
        sent: Arc::clone(&sent),
    });
    (port, sent)
}

/// Host that refuses to spawn relay contexts.
struct NoRelayHost;

impl ContextHost for NoRelayHost {
    fn native_messaging(&self) -> bool {
        false
    }

    fn resolve(&self, _target: &Target) -> Option<Arc<dyn MessagePort>> {
        None
    }

    fn spawn_relay(&self, _url: &str, _on_load: OnRelayLoad) -> Result<()> {
        Err(Error::Transport("relay spawning unavailable".into()))
    }

    fn dispose_relay(&self, _handle: RelayHandle) {}

    fn adapter_slot(&self, _relationship: &str) -> Option<Arc<dyn AdapterSlot>> {
        None
    }
}

/// Bootstrapper for tests whose relay path must never be exercised.
pub(crate) fn unreachable_relay() -> RelayBootstrapper {
    RelayBootstrapper::new(Arc::new(NoRelayHost), std::time::Duration::from_secs(1))
}

/// Port delivering straight into a peer bridge, carrying the return port
/// so acknowledgements can flow back.
struct PairPort {
    deliver_to: Weak<Bridge>,
    reply_with: OnceLock<Arc<dyn MessagePort>>,
}

impl MessagePort for PairPort {
    fn post(&self, wire: &str) -> Result<()> {
        let Some(bridge) = self.deliver_to.upgrade() else {
            return Err(Error::Transport("peer bridge dropped".into()));
        };
        let Some(reply) = self.reply_with.get().map(Arc::clone) else {
            return Err(Error::Transport("pair port not linked".into()));
        };
        bridge.receive(wire, Arrival::Native { reply });
        Ok(())
    }
}

/// Wires two bridges together over native ports.
///
/// Returns `(to_b, to_a)`: a port delivering into `b` whose replies route
/// back into `a`, and the reverse.
pub(crate) fn link_bridges(
    a: &Arc<Bridge>,
    b: &Arc<Bridge>,
) -> (Arc<dyn MessagePort>, Arc<dyn MessagePort>) {
    let to_b = Arc::new(PairPort {
        deliver_to: Arc::downgrade(b),
        reply_with: OnceLock::new(),
    });
    let to_a = Arc::new(PairPort {
        deliver_to: Arc::downgrade(a),
        reply_with: OnceLock::new(),
    });
    let _ = to_b
        .reply_with
        .set(Arc::clone(&to_a) as Arc<dyn MessagePort>);
    let _ = to_a
        .reply_with
        .set(Arc::clone(&to_b) as Arc<dyn MessagePort>);
    (to_b, to_a)
}
