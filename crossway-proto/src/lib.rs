//! Wire format for crossway cross-context messaging.
//!
//! An envelope is a flat map of string fields, percent-encoded into a
//! single `key=value&...` wire string — the one payload shape every
//! transport variant (native messaging, relay-frame URL fragments, opener
//! adapters) can carry.

mod codec;
mod envelope;
mod target;

pub use codec::{decode, encode, escape, unescape};
pub use envelope::{ACK_SENTINEL, Envelope, key, strip_reserved};
pub use target::{ParseTargetError, Target};
