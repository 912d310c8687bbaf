//! Cross-context messaging bridge with acknowledgement tracking.
//!
//! `crossway` moves string messages between isolated execution contexts
//! (frames, windows, opened popups) that share no memory and may not even
//! share a native messaging primitive. Every send is a correlated
//! transaction: the receiver acknowledges, the sender's callback fires,
//! and silence becomes a timeout. When the environment lacks native
//! messaging, delivery falls back to hidden relay contexts carrying the
//! message in their URL fragment; when the opener channel is broken,
//! peers find each other through a retried adapter handshake.
//!
//! The environment itself stays behind the [`ContextHost`] trait, so the
//! same bridge runs against a browser embedding or an in-memory test
//! double.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use crossway::{Bridge, ContextHost, Provenance, SendOptions};
//!
//! fn embedder_host() -> Arc<dyn ContextHost> {
//!     unimplemented!()
//! }
//!
//! let bridge = Bridge::builder()
//!     .host(embedder_host())
//!     .provenance(Provenance {
//!         domain: "example.com".into(),
//!         url: "https://example.com/app.html".into(),
//!         context_name: "app".into(),
//!     })
//!     .build()
//!     .expect("invalid bridge config");
//!
//! bridge
//!     .send(
//!         "frames['svc']",
//!         "hello",
//!         SendOptions {
//!             callback: Some(Box::new(|result| match result {
//!                 Ok(fields) => println!("acknowledged: {fields:?}"),
//!                 Err(e) => eprintln!("undelivered: {e}"),
//!             })),
//!             ..SendOptions::default()
//!         },
//!     )
//!     .expect("bad send configuration");
//! ```

mod bridge;
mod dispatch;
mod error;
mod handshake;
mod host;
mod registry;
mod relay;
mod strategy;
#[cfg(test)]
pub(crate) mod testhost;

pub use bridge::{Bridge, BridgeBuilder, DEFAULT_ACK_TIMEOUT, OPENER, Provenance, SendOptions};
pub use crossway_proto::{ACK_SENTINEL, Envelope, ParseTargetError, Target};
pub use dispatch::{Handler, Responder, SubscriptionId};
pub use error::{Error, Result};
pub use handshake::{BindRole, HandshakeConfig};
pub use host::{
    AdapterSlot, Arrival, ContextHost, InboundAdapter, MessagePort, OnRelayLoad, RelayHandle,
};
pub use registry::{AckCallback, AckFields, AckResult};
pub use relay::DEFAULT_RELAY_GRACE;
pub use strategy::Strategy;
