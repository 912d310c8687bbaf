//! Destination descriptors and their addressing grammar.

use std::fmt;
use std::str::FromStr;

/// A destination context.
///
/// Parsed from the string grammar `top | parent | opener |
/// frames['name'] | frames[0]`. Frame names accept ASCII alphanumerics,
/// `-` and `_`, and may be empty; either quote style works as long as the
/// quotes match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Target {
    /// The topmost window.
    Top,
    /// The immediate parent context.
    Parent,
    /// The context that opened this one.
    Opener,
    /// A frame addressed by name: `frames['sidebar']`.
    NamedFrame(String),
    /// A frame addressed by index: `frames[0]`.
    IndexedFrame(u32),
}

/// Error returned when a descriptor does not match the addressing grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized target descriptor: '{0}'")]
pub struct ParseTargetError(pub String);

impl FromStr for Target {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => return Ok(Self::Top),
            "parent" => return Ok(Self::Parent),
            "opener" => return Ok(Self::Opener),
            _ => {}
        }

        let err = || ParseTargetError(s.to_owned());
        let inner = s
            .strip_prefix("frames[")
            .and_then(|r| r.strip_suffix(']'))
            .ok_or_else(err)?;

        if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
            return inner.parse().map(Self::IndexedFrame).map_err(|_| err());
        }

        let name = ['\'', '"']
            .iter()
            .find_map(|&q| inner.strip_prefix(q).and_then(|r| r.strip_suffix(q)))
            .ok_or_else(err)?;
        if name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            Ok(Self::NamedFrame(name.to_owned()))
        } else {
            Err(err())
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => f.write_str("top"),
            Self::Parent => f.write_str("parent"),
            Self::Opener => f.write_str("opener"),
            Self::NamedFrame(name) => write!(f, "frames['{name}']"),
            Self::IndexedFrame(i) => write!(f, "frames[{i}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keywords() {
        assert_eq!("top".parse(), Ok(Target::Top));
        assert_eq!("parent".parse(), Ok(Target::Parent));
        assert_eq!("opener".parse(), Ok(Target::Opener));
    }

    #[test]
    fn parses_named_frames() {
        assert_eq!(
            "frames['child']".parse(),
            Ok(Target::NamedFrame("child".into()))
        );
        assert_eq!(
            "frames[\"side-bar_2\"]".parse(),
            Ok(Target::NamedFrame("side-bar_2".into()))
        );
        // Empty frame names are legal.
        assert_eq!("frames['']".parse(), Ok(Target::NamedFrame(String::new())));
    }

    #[test]
    fn parses_indexed_frames() {
        assert_eq!("frames[0]".parse(), Ok(Target::IndexedFrame(0)));
        assert_eq!("frames[12]".parse(), Ok(Target::IndexedFrame(12)));
    }

    #[test]
    fn rejects_bad_descriptors() {
        for bad in [
            "",
            "window",
            "frames[child]",
            "frames['child'",
            "frames['a b']",
            "frames['x\"]",
            "frames[-1]",
            "frames[1e3]",
            "opener.frames[0]",
        ] {
            assert!(bad.parse::<Target>().is_err(), "accepted: {bad}");
        }
    }

    #[test]
    fn display_roundtrips() {
        for desc in ["top", "parent", "opener", "frames['child']", "frames[3]"] {
            let target: Target = desc.parse().expect(desc);
            assert_eq!(target.to_string(), desc);
        }
    }
}
