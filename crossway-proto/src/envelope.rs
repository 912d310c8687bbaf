//! Envelope field set and the acknowledgement sentinel.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::codec;

/// Reserved payload value marking an envelope as a protocol-level
/// acknowledgement rather than an application message.
pub const ACK_SENTINEL: &str = "__SUCCESS_CALLBACK__";

/// Wire field names.
pub mod key {
    /// Transaction id, unique per send call.
    pub const TID: &str = "tid";
    /// Optional routing tag.
    pub const EVENT_TYPE: &str = "eventType";
    /// Destination descriptor, echoed back in acknowledgements.
    pub const TARGET: &str = "target";
    /// Caller payload, or [`super::ACK_SENTINEL`] for acks.
    pub const MESSAGE: &str = "message";
    /// Sender's document domain.
    pub const DOMAIN: &str = "domain";
    /// Sender's full URL.
    pub const URL: &str = "url";
    /// Sender's context name (often empty for top windows).
    pub const SOURCE: &str = "source";
    /// Relay URL for the acknowledgement path back to the sender.
    pub const REVERSE_PROXY: &str = "reverseProxy";
    /// `1` when the receiver should acknowledge automatically.
    pub const AUTO_ACK: &str = "autoAck";
}

/// Keys a subscriber-supplied acknowledgement may not override; stripped
/// from ack field maps before they reach the sender's callback.
const RESERVED: [&str; 4] = [key::MESSAGE, key::TARGET, key::TID, key::URL];

/// Removes the reserved protocol keys from an acknowledgement field map.
pub fn strip_reserved(fields: &mut HashMap<String, String>) {
    for k in RESERVED {
        fields.remove(k);
    }
}

/// The unit of transmission: one message or one acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Caller-generated correlation id, unique within the sending process.
    pub tid: u64,
    /// Routing tag; `None` means untyped.
    pub event_type: Option<String>,
    /// Destination descriptor, opaque at this layer.
    pub target: String,
    /// Caller payload (or the ack sentinel).
    pub message: String,
    /// Sender's document domain.
    pub domain: String,
    /// Sender's full URL.
    pub url: String,
    /// Sender's context name.
    pub source: String,
    /// Relay URL the receiver should use for the acknowledgement path.
    pub reverse_proxy: Option<String>,
    /// Whether the receiving bridge should acknowledge automatically when
    /// no subscriber replies.
    pub auto_ack: bool,
}

impl Envelope {
    /// Whether the payload is the reserved acknowledgement sentinel.
    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.message == ACK_SENTINEL
    }

    /// Serializes the envelope into a wire string.
    #[must_use]
    pub fn encode(&self) -> String {
        let tid = self.tid.to_string();
        let mut pairs: Vec<(&str, &str)> = vec![
            (key::TID, &tid),
            (key::TARGET, &self.target),
            (key::MESSAGE, &self.message),
            (key::DOMAIN, &self.domain),
            (key::URL, &self.url),
            (key::SOURCE, &self.source),
        ];
        if let Some(et) = &self.event_type {
            pairs.push((key::EVENT_TYPE, et));
        }
        if let Some(rp) = &self.reverse_proxy {
            pairs.push((key::REVERSE_PROXY, rp));
        }
        if self.auto_ack {
            pairs.push((key::AUTO_ACK, "1"));
        }
        codec::encode(pairs)
    }

    /// Builds an envelope from a decoded field map.
    ///
    /// Returns `None` when `tid` is absent or not a number; everything
    /// else defaults to empty. Empty `eventType`/`reverseProxy` values are
    /// treated as absent.
    #[must_use]
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let tid = fields.get(key::TID)?.parse().ok()?;
        let non_empty = |k: &str| fields.get(k).filter(|v| !v.is_empty()).cloned();
        let or_empty = |k: &str| fields.get(k).cloned().unwrap_or_default();
        Some(Self {
            tid,
            event_type: non_empty(key::EVENT_TYPE),
            target: or_empty(key::TARGET),
            message: or_empty(key::MESSAGE),
            domain: or_empty(key::DOMAIN),
            url: or_empty(key::URL),
            source: or_empty(key::SOURCE),
            reverse_proxy: non_empty(key::REVERSE_PROXY),
            auto_ack: fields.get(key::AUTO_ACK).is_some_and(|v| v == "1"),
        })
    }

    /// Decodes a wire string into an envelope; `None` on noise.
    #[must_use]
    pub fn decode(wire: &str) -> Option<Self> {
        Self::from_fields(&codec::decode(wire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            tid: 1_700_000_000_001,
            event_type: Some("greet".into()),
            target: "frames['child']".into(),
            message: "hello".into(),
            domain: "example.com".into(),
            url: "https://example.com/app".into(),
            source: "main".into(),
            reverse_proxy: Some("https://example.com/relay.html".into()),
            auto_ack: false,
        }
    }

    #[test]
    fn roundtrip_full_envelope() {
        let env = sample();
        assert_eq!(Envelope::decode(&env.encode()), Some(env));
    }

    #[test]
    fn roundtrip_minimal_envelope() {
        let env = Envelope {
            tid: 7,
            event_type: None,
            target: "parent".into(),
            message: String::new(),
            domain: String::new(),
            url: String::new(),
            source: String::new(),
            reverse_proxy: None,
            auto_ack: true,
        };
        assert_eq!(Envelope::decode(&env.encode()), Some(env));
    }

    #[test]
    fn missing_tid_is_noise() {
        assert_eq!(Envelope::decode("message=hello&target=top"), None);
        assert_eq!(Envelope::decode("tid=notanumber&message=x"), None);
        assert_eq!(Envelope::decode(""), None);
    }

    #[test]
    fn sentinel_payload_is_ack() {
        let mut env = sample();
        assert!(!env.is_ack());
        env.message = ACK_SENTINEL.into();
        assert!(env.is_ack());
        assert!(Envelope::decode(&env.encode()).is_some_and(|e| e.is_ack()));
    }

    #[test]
    fn strip_reserved_removes_protocol_keys() {
        let mut fields: HashMap<String, String> = [
            ("tid", "9"),
            ("message", ACK_SENTINEL),
            ("target", "top"),
            ("url", "https://a"),
            ("verdict", "handled"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();

        strip_reserved(&mut fields);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("verdict").map(String::as_str), Some("handled"));
    }
}
