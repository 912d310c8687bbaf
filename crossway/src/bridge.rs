//! Bridge facade: send, receive, subscribe.
//!
//! A [`Bridge`] owns one context's view of the messaging fabric. Outbound,
//! it frames envelopes, picks a transport, and tracks acknowledgements.
//! Inbound, it demultiplexes wire strings handed over by the embedder's
//! listener into the transaction registry or the subscription bus.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::debug;

use crossway_proto::{Envelope, Target};

use crate::dispatch::{Bus, Handler, Responder, SubscriptionId};
use crate::handshake::{BindRole, BindingTable, HandshakeConfig};
use crate::host::{Arrival, ContextHost, InboundAdapter};
use crate::registry::{AckCallback, TransactionRegistry};
use crate::relay::{DEFAULT_RELAY_GRACE, RelayBootstrapper};
use crate::strategy::{self, Strategy};
use crate::{Error, Result};

/// Relationship identifier used for sends addressed to the opener when
/// native opener messaging is broken.
pub const OPENER: &str = "opener";

/// Default acknowledgement window for sends with a callback.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Identity of the local context, stamped into every outbound envelope so
/// receivers can address acknowledgements.
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    /// The local origin's domain.
    pub domain: String,
    /// The local document URL, used by peers as the reply target.
    pub url: String,
    /// The local context's name within its parent, if it has one.
    pub context_name: String,
}

/// Per-send configuration.
///
/// `Default` gives a fire-and-forget send over whatever transport the
/// host supports.
#[derive(Default)]
pub struct SendOptions {
    /// Invoked once with the acknowledgement fields or the failure.
    pub callback: Option<AckCallback>,
    /// Event type routing key for the receiver's subscribers.
    pub event_type: Option<String>,
    /// Relay document URL, required whenever relay delivery is in play.
    pub relay_url: Option<String>,
    /// Relay URL on the local origin, carried in the envelope so the
    /// receiver can acknowledge without a native return path.
    pub reverse_relay_url: Option<String>,
    /// Forces relay delivery even when native messaging is available.
    pub use_relay: bool,
    /// Asks the receiver to acknowledge automatically when no subscriber
    /// replies.
    pub auto_ack: bool,
    /// Acknowledgement window override for this send.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendOptions")
            .field("callback", &self.callback.is_some())
            .field("event_type", &self.event_type)
            .field("relay_url", &self.relay_url)
            .field("reverse_relay_url", &self.reverse_relay_url)
            .field("use_relay", &self.use_relay)
            .field("auto_ack", &self.auto_ack)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builder for [`Bridge`]. The host is the only required input.
#[must_use]
pub struct BridgeBuilder {
    host: Option<Arc<dyn ContextHost>>,
    provenance: Provenance,
    default_timeout: Duration,
    relay_grace: Duration,
    handshake: HandshakeConfig,
}

impl BridgeBuilder {
    pub(crate) fn new() -> Self {
        Self {
            host: None,
            provenance: Provenance::default(),
            default_timeout: DEFAULT_ACK_TIMEOUT,
            relay_grace: DEFAULT_RELAY_GRACE,
            handshake: HandshakeConfig::default(),
        }
    }

    /// Sets the host environment. Required.
    pub fn host(mut self, host: Arc<dyn ContextHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets the local context's identity fields.
    pub fn provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Sets the acknowledgement window used when a send does not supply
    /// its own.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets how long a loaded relay context lives before teardown.
    pub fn relay_grace(mut self, grace: Duration) -> Self {
        self.relay_grace = grace;
        self
    }

    /// Sets the opener discovery retry policy.
    pub fn handshake(mut self, config: HandshakeConfig) -> Self {
        self.handshake = config;
        self
    }

    /// Finalizes the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHost`] when no host was supplied.
    pub fn build(self) -> Result<Arc<Bridge>> {
        let host = self.host.ok_or(Error::MissingHost)?;
        let relay = RelayBootstrapper::new(Arc::clone(&host), self.relay_grace);
        let registry = TransactionRegistry::new();
        let bindings = BindingTable::new(
            Arc::clone(&host),
            relay.clone(),
            registry.clone(),
            self.handshake,
        );
        // Seed from the clock so ids from restarted contexts on the same
        // channel do not collide with a peer's recent transactions.
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(1, |d| u64::try_from(d.as_millis()).unwrap_or(1));
        Ok(Arc::new(Bridge {
            host,
            provenance: self.provenance,
            registry,
            bus: Bus::new(),
            bindings,
            relay,
            next_tid: AtomicU64::new(seed),
            default_timeout: self.default_timeout,
        }))
    }
}

/// One context's endpoint on the messaging fabric.
pub struct Bridge {
    host: Arc<dyn ContextHost>,
    provenance: Provenance,
    registry: TransactionRegistry,
    bus: Bus,
    bindings: BindingTable,
    relay: RelayBootstrapper,
    next_tid: AtomicU64,
    default_timeout: Duration,
}

impl Bridge {
    /// Starts building a bridge.
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Sends `message` to the context named by `target`, returning the
    /// transaction id.
    ///
    /// The transport is chosen per call from the options and the host's
    /// capabilities. When a callback is supplied it fires exactly once:
    /// with the acknowledgement fields, or with the timeout or transport
    /// failure. Failures discovered after the callback is registered are
    /// reported through it rather than the return value.
    ///
    /// # Errors
    ///
    /// Configuration problems surface synchronously: an unparseable
    /// target, relay delivery without a relay URL, or (for callback-less
    /// sends) a transport rejection.
    pub fn send(&self, target: &str, message: &str, mut options: SendOptions) -> Result<u64> {
        let parsed: Target = target.parse()?;
        let strategy = strategy::select(&parsed, &options, &*self.host)?;
        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);

        let envelope = Envelope {
            tid,
            event_type: options.event_type.clone(),
            target: parsed.to_string(),
            message: message.to_owned(),
            domain: self.provenance.domain.clone(),
            url: self.provenance.url.clone(),
            source: self.provenance.context_name.clone(),
            reverse_proxy: options.reverse_relay_url.clone(),
            auto_ack: options.auto_ack,
        };
        let wire = envelope.encode();

        // Registered before delivery so a synchronous inbound ack finds
        // its entry.
        let has_callback = options.callback.is_some();
        if let Some(callback) = options.callback.take() {
            let timeout = options.timeout.unwrap_or(self.default_timeout);
            self.registry.register(tid, callback, timeout);
        }

        debug!(tid, target = %parsed, ?strategy, "sending");
        let delivery = match strategy {
            Strategy::Direct => match self.host.resolve(&parsed) {
                Some(port) => port.post(&wire),
                None => Err(Error::Transport(format!("target '{parsed}' not reachable"))),
            },
            Strategy::RelayFrame => match options.relay_url.as_deref() {
                Some(url) => self.relay.dispatch(url, &wire),
                // Ruled out by strategy selection.
                None => Err(Error::MissingRelayUrl),
            },
            Strategy::OpenerHandshake => self.bindings.deliver(
                OPENER,
                has_callback.then_some(tid),
                wire,
                options.relay_url.clone(),
            ),
        };

        match delivery {
            Ok(()) => Ok(tid),
            Err(e) if has_callback => {
                self.registry.fail(tid, e);
                Ok(tid)
            }
            Err(e) => Err(e),
        }
    }

    /// Serializes `payload` as JSON and sends it.
    ///
    /// # Errors
    ///
    /// [`Error::Payload`] when serialization fails, plus everything
    /// [`send`](Self::send) returns.
    pub fn send_json<T: Serialize>(
        &self,
        target: &str,
        payload: &T,
        options: SendOptions,
    ) -> Result<u64> {
        let message = serde_json::to_string(payload)?;
        self.send(target, &message, options)
    }

    /// Feeds one inbound wire string into the bridge.
    ///
    /// Called by the embedder's message listener for every raw string
    /// that arrives, along with how it arrived. Undecodable input and
    /// unmatched acknowledgements are dropped silently; the channel is
    /// shared with arbitrary senders.
    pub fn receive(&self, wire: &str, arrival: Arrival) {
        let Some(envelope) = Envelope::decode(wire) else {
            debug!("dropping undecodable inbound message");
            return;
        };
        if envelope.is_ack() {
            if !self.registry.resolve(envelope.tid, crossway_proto::decode(wire)) {
                debug!(tid = envelope.tid, "dropping unmatched acknowledgement");
            }
            return;
        }

        let responder = Responder::new(&envelope, arrival, self.relay.clone());
        for handler in self.bus.handlers_for(envelope.event_type.as_deref()) {
            handler(&envelope, &responder);
        }
        if envelope.auto_ack
            && !responder.replied()
            && let Err(e) = responder.reply(&[])
        {
            debug!(tid = envelope.tid, error = %e, "automatic acknowledgement failed");
        }
    }

    /// Subscribes `handler` to envelopes carrying `event_type`.
    pub fn subscribe(&self, event_type: &str, handler: Handler) -> SubscriptionId {
        self.bus.subscribe(Some(event_type), handler)
    }

    /// Subscribes `handler` to every fresh envelope, regardless of type.
    pub fn subscribe_any(&self, handler: Handler) -> SubscriptionId {
        self.bus.subscribe(None, handler)
    }

    /// Removes a subscription; returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Adapter that feeds injected wire strings into this bridge, for
    /// publishing across an opener relationship.
    ///
    /// Holds only a weak reference; once the bridge is dropped the
    /// adapter becomes a no-op.
    pub fn inbound_adapter(self: &Arc<Self>) -> InboundAdapter {
        let bridge = Arc::downgrade(self);
        Arc::new(move |wire: &str| {
            if let Some(bridge) = bridge.upgrade() {
                bridge.receive(wire, Arrival::Adapter { reply: None });
            }
        })
    }

    /// Establishes the opener binding for `relationship` in the given
    /// role, publishing this bridge's inbound adapter.
    ///
    /// # Errors
    ///
    /// [`Error::BindingUnavailable`] when a target-role bind exhausts its
    /// retries without the relationship appearing, and any installation
    /// failure the host reports.
    pub async fn bind_relationship(
        self: &Arc<Self>,
        role: BindRole,
        relationship: &str,
    ) -> Result<()> {
        let adapter = self.inbound_adapter();
        self.bindings.bind(role, relationship, adapter).await
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("provenance", &self.provenance)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}
