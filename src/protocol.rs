//! Constants of the B / MAP / AIP stack.
//!
//! Each segment is namespaced by a Bitcoin address used as a plain text token. Markers are compared
//! by exact bytes; there's no versioning.
//!
//! A post output looks like:
//!
//! ```text
//! OP_FALSE OP_RETURN
//!   <B>   <content> <media-type> <encoding>
//!   <MAP> SET app <app> type post [context <key> <value>] [subcontext <key> <value>]
//!   <AIP> BITCOIN_ECDSA <address> <signature>
//! ```

/// B: content segment
pub const B_PREFIX: &str = "19HxigV4QyBv3tHpQVcUEQyq1pzZVdoAut";
/// MAP: key/value metadata segment
pub const MAP_PREFIX: &str = "1PuQa7K62MiKCtssSLKy1kh56WWU7MtUR5";
/// AIP: author identity segment
pub const AIP_PREFIX: &str = "15PciHG22SNLQJXMoSUaWVi7WSqc7hCfva";

pub const MARKERS: [&str; 3] = [B_PREFIX, MAP_PREFIX, AIP_PREFIX];

pub const DEFAULT_APP: &str = "treechat.ai";
pub const DEFAULT_MEDIA_TYPE: &str = "text/markdown";
pub const DEFAULT_ENCODING: &str = "utf-8";

pub const MAP_SET: &str = "SET";
pub const KEY_APP: &str = "app";
pub const KEY_TYPE: &str = "type";
pub const TYPE_POST: &str = "post";
pub const KEY_CONTEXT: &str = "context";
pub const KEY_SUBCONTEXT: &str = "subcontext";

pub const AIP_SCHEME_ECDSA: &str = "BITCOIN_ECDSA";

/// Protocol name the signing key is derived under.
pub const SIGNING_PROTOCOL: &str = "schema";
pub const SIGNING_SECURITY_LEVEL: u8 = 1;
pub const SIGNING_KEY_ID: &str = "1";

/// Which segment a marker token opens.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Segment {
    B,
    Map,
    Aip,
}

impl Segment {
    pub fn from_marker(token: &[u8]) -> Option<Self> {
        match token {
            x if x == B_PREFIX.as_bytes() => Some(Self::B),
            x if x == MAP_PREFIX.as_bytes() => Some(Self::Map),
            x if x == AIP_PREFIX.as_bytes() => Some(Self::Aip),
            _ => None,
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Segment::B => B_PREFIX,
            Segment::Map => MAP_PREFIX,
            Segment::Aip => AIP_PREFIX,
        }
    }
}

#[inline]
pub fn is_marker(token: &[u8]) -> bool {
    Segment::from_marker(token).is_some()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn markers_are_distinct() {
        assert_ne!(B_PREFIX, MAP_PREFIX);
        assert_ne!(MAP_PREFIX, AIP_PREFIX);
        assert_ne!(B_PREFIX, AIP_PREFIX);
        for x in MARKERS {
            assert_eq!(x.len(), 34);
            assert_eq!(Segment::from_marker(x.as_bytes()).unwrap().marker(), x);
        }
        assert!(!is_marker(b"SET"));
        assert!(!is_marker(b""));
    }
}
