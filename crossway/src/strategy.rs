//! Transport strategy selection.
//!
//! One `send`, three execution paths. The strategy is chosen once per
//! call, before the envelope is framed, and never changes mid-transaction.

use crossway_proto::Target;

use crate::bridge::SendOptions;
use crate::host::ContextHost;
use crate::{Error, Result};

/// The transport path a single send will use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Strategy {
    /// Native cross-context delivery, no intermediary.
    Direct,
    /// Hidden same-origin relay context carrying the message in its URL
    /// fragment.
    RelayFrame,
    /// Mutually installed adapter objects across an opener relationship.
    OpenerHandshake,
}

/// Picks the strategy for one send.
///
/// Priority order: forced relay, missing native support, broken opener
/// messaging, direct. Selecting relay delivery without a configured relay
/// URL is a configuration error and nothing is spawned.
pub(crate) fn select(
    target: &Target,
    options: &SendOptions,
    host: &dyn ContextHost,
) -> Result<Strategy> {
    if options.use_relay || !host.native_messaging() {
        if options.relay_url.is_none() {
            return Err(Error::MissingRelayUrl);
        }
        return Ok(Strategy::RelayFrame);
    }
    if matches!(target, Target::Opener) && host.opener_messaging_broken() {
        return Ok(Strategy::OpenerHandshake);
    }
    Ok(Strategy::Direct)
}
