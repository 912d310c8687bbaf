//! Host-environment seams: message ports, relay spawning, adapter slots.
//!
//! The bridge never touches the DOM or the engine's messaging primitive
//! directly. Everything the host environment does — deliver a raw string
//! to another context, materialize a hidden relay context, expose a slot
//! on an opener relationship — sits behind these object-safe traits,
//! implemented by the embedder.

use std::fmt;
use std::sync::Arc;

use crossway_proto::Target;

use crate::Result;

/// Raw string-message entry point of one reachable context.
pub trait MessagePort: Send + Sync {
    /// Delivers a wire string to the context behind this port.
    fn post(&self, wire: &str) -> Result<()>;
}

/// Function a context exposes so an opener peer can inject wire strings
/// directly, bypassing native messaging.
pub type InboundAdapter = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback invoked once a spawned relay context has finished loading.
pub type OnRelayLoad = Box<dyn FnOnce(RelayHandle) + Send>;

/// Opaque identifier for a spawned relay context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelayHandle(pub u64);

/// Mutually visible slot on an opener relationship where a context
/// publishes its [`InboundAdapter`] for the peer to discover.
pub trait AdapterSlot: Send + Sync {
    /// Publishes an adapter into the slot.
    fn install(&self, adapter: InboundAdapter) -> Result<()>;

    /// Returns the peer's adapter, if one has been published yet.
    fn discover(&self) -> Option<InboundAdapter>;
}

/// Capabilities and primitives of the surrounding execution environment.
pub trait ContextHost: Send + Sync {
    /// Whether the native cross-context messaging primitive exists.
    fn native_messaging(&self) -> bool;

    /// Whether native messaging toward the opener is known to be broken
    /// in this engine.
    fn opener_messaging_broken(&self) -> bool {
        false
    }

    /// Resolves a target descriptor to its native message port, if the
    /// target currently exists.
    fn resolve(&self, target: &Target) -> Option<Arc<dyn MessagePort>>;

    /// Creates a hidden, passive relay context loading `url` and reports
    /// load completion through `on_load`.
    fn spawn_relay(&self, url: &str, on_load: OnRelayLoad) -> Result<()>;

    /// Tears down a previously spawned relay context.
    fn dispose_relay(&self, handle: RelayHandle);

    /// Returns the adapter slot shared with the named opener
    /// relationship, if that relationship exists yet.
    fn adapter_slot(&self, relationship: &str) -> Option<Arc<dyn AdapterSlot>>;
}

/// How an inbound wire string reached this context.
///
/// Passed to [`crate::Bridge::receive`] by the embedder's listener; the
/// bridge derives the acknowledgement path from it.
#[non_exhaustive]
pub enum Arrival {
    /// Native delivery.
    Native {
        /// Port addressing the sending context, used for the reply.
        reply: Arc<dyn MessagePort>,
    },
    /// Carried by a relay context; replies travel through the envelope's
    /// reverse relay URL.
    Relay,
    /// Injected through an opener adapter.
    Adapter {
        /// The peer's adapter when already discovered; `None` falls back
        /// to the reverse relay URL.
        reply: Option<InboundAdapter>,
    },
}

impl fmt::Debug for Arrival {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native { .. } => f.write_str("Arrival::Native"),
            Self::Relay => f.write_str("Arrival::Relay"),
            Self::Adapter { reply } => write!(
                f,
                "Arrival::Adapter {{ reply: {} }}",
                if reply.is_some() { "Some(..)" } else { "None" }
            ),
        }
    }
}
