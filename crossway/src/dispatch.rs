//! Subscription registry and the reply channel handed to subscribers.
//!
//! Inbound envelopes are demultiplexed by the bridge: acknowledgements go
//! to the transaction registry, fresh messages fan out here — subscribers
//! for the envelope's event type first, then catch-all subscribers, each
//! group in registration order.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::error;

use crossway_proto::{ACK_SENTINEL, Envelope, encode, key};

use crate::host::{Arrival, InboundAdapter, MessagePort};
use crate::relay::RelayBootstrapper;
use crate::{Error, Result};

/// Handler invoked for each matching inbound envelope.
pub type Handler = Arc<dyn Fn(&Envelope, &Responder) + Send + Sync>;

/// Identifier returned by `subscribe`, usable for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// One registration. The same handler may be registered any number of
/// times and fires once per registration.
struct Sub {
    id: u64,
    handler: Handler,
}

/// Ordered subscriber table.
pub(crate) struct Bus {
    /// Per-event-type subscribers, each list in registration order.
    typed: Mutex<HashMap<String, Vec<Sub>>>,
    /// Catch-all subscribers, in registration order.
    catch_all: Mutex<Vec<Sub>>,
    /// Next subscription id.
    next_id: AtomicU64,
}

impl Bus {
    pub(crate) fn new() -> Self {
        Self {
            typed: Mutex::new(HashMap::new()),
            catch_all: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a handler; `None` subscribes to every message.
    pub(crate) fn subscribe(&self, event_type: Option<&str>, handler: Handler) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sub = Sub { id, handler };
        match event_type {
            Some(et) => {
                if let Ok(mut typed) = self.typed.lock() {
                    typed.entry(et.to_owned()).or_default().push(sub);
                }
            }
            None => {
                if let Ok(mut catch_all) = self.catch_all.lock() {
                    catch_all.push(sub);
                }
            }
        }
        SubscriptionId(id)
    }

    /// Removes a registration; returns whether it existed.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        if let Ok(mut catch_all) = self.catch_all.lock() {
            let before = catch_all.len();
            catch_all.retain(|s| s.id != id.0);
            if catch_all.len() != before {
                return true;
            }
        }
        if let Ok(mut typed) = self.typed.lock() {
            for subs in typed.values_mut() {
                let before = subs.len();
                subs.retain(|s| s.id != id.0);
                if subs.len() != before {
                    return true;
                }
            }
        }
        false
    }

    /// Snapshot of the handlers one envelope will see: typed first, then
    /// catch-all, each in registration order.
    pub(crate) fn handlers_for(&self, event_type: Option<&str>) -> Vec<Handler> {
        let mut handlers = Vec::new();
        if let Some(et) = event_type
            && let Ok(typed) = self.typed.lock()
            && let Some(subs) = typed.get(et)
        {
            handlers.extend(subs.iter().map(|s| Arc::clone(&s.handler)));
        }
        if let Ok(catch_all) = self.catch_all.lock() {
            handlers.extend(catch_all.iter().map(|s| Arc::clone(&s.handler)));
        }
        handlers
    }
}

/// How an acknowledgement travels back to the sender.
enum ReplyPath {
    /// Post through the captured native port.
    Native(Arc<dyn MessagePort>),
    /// Spawn a relay context at the envelope's reverse relay URL.
    Relay,
    /// Invoke the peer's opener adapter.
    Adapter(InboundAdapter),
}

/// Reply channel handed to subscribers alongside a fresh envelope.
///
/// The first [`reply`](Self::reply) call transmits the acknowledgement;
/// later calls are tolerated no-ops, since only the first is a meaningful
/// "handled" signal to the sender's transaction registry.
pub struct Responder {
    /// Set once the acknowledgement has been transmitted.
    fired: AtomicBool,
    /// Transaction id echoed back for correlation.
    tid: u64,
    /// Inbound envelope's target descriptor, echoed back.
    target: String,
    /// Inbound envelope's source URL, echoed back.
    source_url: String,
    /// Reverse relay URL from the inbound envelope, if any.
    reverse_relay: Option<String>,
    /// Transport for the acknowledgement.
    path: ReplyPath,
    /// Bootstrapper used when the path is a relay.
    relay: RelayBootstrapper,
}

impl Responder {
    pub(crate) fn new(envelope: &Envelope, arrival: Arrival, relay: RelayBootstrapper) -> Self {
        let path = match arrival {
            Arrival::Native { reply } => ReplyPath::Native(reply),
            Arrival::Adapter { reply: Some(a) } => ReplyPath::Adapter(a),
            // No adapter to answer through; fall back to the reverse relay.
            Arrival::Relay | Arrival::Adapter { reply: None } => ReplyPath::Relay,
        };
        Self {
            fired: AtomicBool::new(false),
            tid: envelope.tid,
            target: envelope.target.clone(),
            source_url: envelope.url.clone(),
            reverse_relay: envelope.reverse_proxy.clone(),
            path,
            relay,
        }
    }

    /// Whether an acknowledgement has already been transmitted.
    #[must_use]
    pub fn replied(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Sends the acknowledgement, with optional extra fields for the
    /// original sender's callback.
    ///
    /// The reserved `message`/`target`/`tid`/`url` keys cannot be
    /// overridden; matching entries in `extra` are dropped. Only the
    /// first call transmits.
    pub fn reply(&self, extra: &[(&str, &str)]) -> Result<()> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let tid = self.tid.to_string();
        let mut pairs: Vec<(&str, &str)> = vec![
            (key::URL, &self.source_url),
            (key::TARGET, &self.target),
            (key::TID, &tid),
            (key::MESSAGE, ACK_SENTINEL),
        ];
        pairs.extend(
            extra
                .iter()
                .filter(|(k, _)| !matches!(*k, key::MESSAGE | key::TARGET | key::TID | key::URL))
                .copied(),
        );
        let wire = encode(pairs);

        match &self.path {
            ReplyPath::Native(port) => port.post(&wire),
            ReplyPath::Adapter(adapter) => {
                adapter(&wire);
                Ok(())
            }
            ReplyPath::Relay => {
                let Some(url) = &self.reverse_relay else {
                    error!(
                        tid = self.tid,
                        "cannot acknowledge: inbound envelope carries no reverse relay URL"
                    );
                    return Err(Error::MissingRelayUrl);
                };
                self.relay.dispatch(url, &wire)
            }
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("tid", &self.tid)
            .field("replied", &self.replied())
            .finish_non_exhaustive()
    }
}
